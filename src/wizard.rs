use crate::listing::{Category, Listing, ListingStatus, Location, TransactionType};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_DESCRIPTION_LEN: usize = 10;

/// Outcome of a completed contract-signing flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub listing_id: String,
    pub owner_id: String,
    pub buyer_id: String,
    pub kind: TransactionType,
    pub signer_name: String,
    pub signed_at: DateTime<Utc>,
}

/// Three-step listing creation flow. Steps advance strictly forward and only
/// after the current step validates; `back` steps one position at most.
/// `finish` consumes the wizard, so publishing can happen once only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListingWizard {
    #[serde(skip)]
    step: u8,
    pub title: String,
    pub description: String,
    pub category: Option<Category>,
    pub transaction: Option<TransactionType>,
    pub price: Option<i64>,
    pub currency: String,
    pub city: String,
    pub neighborhood: String,
    pub images: Vec<String>,
    pub features: Vec<String>,
}

impl ListingWizard {
    pub fn new() -> Self {
        Self {
            step: 1,
            currency: "AOA".to_string(),
            ..Default::default()
        }
    }

    pub fn step(&self) -> u8 {
        self.step.max(1)
    }

    pub fn advance(&mut self) -> Result<u8> {
        match self.step() {
            1 => {
                if self.title.trim().is_empty() {
                    bail!("title is required");
                }
                if self.description.trim().len() < MIN_DESCRIPTION_LEN {
                    bail!(
                        "description must be at least {} characters",
                        MIN_DESCRIPTION_LEN
                    );
                }
            }
            2 => {
                if self.category.is_none() {
                    bail!("category is required");
                }
                if self.transaction.is_none() {
                    bail!("transaction type is required");
                }
                match self.price {
                    None => bail!("price is required"),
                    Some(p) if p < 0 => bail!("price must be non-negative"),
                    Some(_) => {}
                }
                if self.city.trim().is_empty() {
                    bail!("city is required");
                }
            }
            _ => bail!("already at the final step"),
        }
        self.step = self.step() + 1;
        Ok(self.step)
    }

    pub fn back(&mut self) -> u8 {
        if self.step() > 1 {
            self.step = self.step() - 1;
        }
        self.step
    }

    /// Terminal step: build the listing. New listings await admin review.
    pub fn finish(self, owner_id: &str) -> Result<Listing> {
        if self.step() != 3 {
            bail!("listing can only be published from the final step");
        }
        // Field validation already passed on the way to step 3.
        Ok(Listing {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: self.title,
            description: self.description,
            price: self.price.unwrap_or(0),
            currency: if self.currency.is_empty() {
                "AOA".to_string()
            } else {
                self.currency
            },
            category: self.category.expect("validated at step 2"),
            transaction: self.transaction.expect("validated at step 2"),
            status: ListingStatus::PendingReview,
            images: self.images,
            location: Location {
                city: self.city,
                neighborhood: self.neighborhood,
                latitude: None,
                longitude: None,
            },
            views: 0,
            created_at: Utc::now(),
            features: self.features,
        })
    }
}

/// Three-step contract-signing flow: parties, terms, signature.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractWizard {
    #[serde(skip)]
    step: u8,
    pub listing_id: String,
    pub owner_id: String,
    pub buyer_id: String,
    pub kind: Option<TransactionType>,
    pub terms_accepted: bool,
    pub signer_name: String,
    pub signature: String,
}

impl ContractWizard {
    pub fn new() -> Self {
        Self {
            step: 1,
            ..Default::default()
        }
    }

    pub fn step(&self) -> u8 {
        self.step.max(1)
    }

    pub fn advance(&mut self) -> Result<u8> {
        match self.step() {
            1 => {
                if self.listing_id.is_empty() {
                    bail!("contract needs a listing");
                }
                if self.owner_id.is_empty() || self.buyer_id.is_empty() {
                    bail!("contract needs both parties");
                }
                if self.owner_id == self.buyer_id {
                    bail!("owner and buyer must be different users");
                }
            }
            2 => {
                if !self.terms_accepted {
                    bail!("terms must be accepted");
                }
                if self.signer_name.trim().is_empty() {
                    bail!("full legal name is required");
                }
            }
            _ => bail!("already at the final step"),
        }
        self.step = self.step() + 1;
        Ok(self.step)
    }

    pub fn back(&mut self) -> u8 {
        if self.step() > 1 {
            self.step = self.step() - 1;
        }
        self.step
    }

    /// Terminal step: record the contract. Consumes the wizard.
    pub fn finish(self) -> Result<Contract> {
        if self.step() != 3 {
            bail!("contract can only be recorded from the final step");
        }
        if self.signature.trim().is_empty() {
            bail!("signature is required");
        }
        Ok(Contract {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: self.listing_id,
            owner_id: self.owner_id,
            buyer_id: self.buyer_id,
            kind: self.kind.unwrap_or(TransactionType::Rent),
            signer_name: self.signer_name,
            signed_at: Utc::now(),
        })
    }
}
