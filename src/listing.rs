use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    House,
    Apartment,
    Land,
    Office,
    Car,
    Motorcycle,
    Truck,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::House => "HOUSE",
            Category::Apartment => "APARTMENT",
            Category::Land => "LAND",
            Category::Office => "OFFICE",
            Category::Car => "CAR",
            Category::Motorcycle => "MOTORCYCLE",
            Category::Truck => "TRUCK",
        }
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOUSE" => Ok(Category::House),
            "APARTMENT" => Ok(Category::Apartment),
            "LAND" => Ok(Category::Land),
            "OFFICE" => Ok(Category::Office),
            "CAR" => Ok(Category::Car),
            "MOTORCYCLE" => Ok(Category::Motorcycle),
            "TRUCK" => Ok(Category::Truck),
            other => bail!("unknown category: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Rent,
    Buy,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Rent => "RENT",
            TransactionType::Buy => "BUY",
        }
    }
}

impl FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RENT" => Ok(TransactionType::Rent),
            "BUY" => Ok(TransactionType::Buy),
            other => bail!("unknown transaction type: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Available,
    Rented,
    Sold,
    Paused,
    PendingReview,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "AVAILABLE",
            ListingStatus::Rented => "RENTED",
            ListingStatus::Sold => "SOLD",
            ListingStatus::Paused => "PAUSED",
            ListingStatus::PendingReview => "PENDING_REVIEW",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(ListingStatus::Available),
            "RENTED" => Ok(ListingStatus::Rented),
            "SOLD" => Ok(ListingStatus::Sold),
            "PAUSED" => Ok(ListingStatus::Paused),
            "PENDING_REVIEW" => Ok(ListingStatus::PendingReview),
            other => bail!("unknown listing status: {}", other),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub neighborhood: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    /// Non-negative, in minor-unit-free whole amounts of `currency`.
    pub price: i64,
    pub currency: String,
    pub category: Category,
    pub transaction: TransactionType,
    pub status: ListingStatus,
    pub images: Vec<String>,
    pub location: Location,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub features: Vec<String>,
}

/// Optional predicates for narrowing a listing collection. An absent field
/// imposes no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub category: Option<Category>,
    pub transaction: Option<TransactionType>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub city: Option<String>,
}

impl SearchFilters {
    fn matches(&self, listing: &Listing) -> bool {
        if let Some(q) = &self.query {
            let q = q.to_lowercase();
            // Each field is tested on its own so a query never matches
            // across a field boundary.
            let hit = listing.title.to_lowercase().contains(&q)
                || listing.description.to_lowercase().contains(&q)
                || listing.location.city.to_lowercase().contains(&q)
                || listing.location.neighborhood.to_lowercase().contains(&q);
            if !hit {
                return false;
            }
        }
        if let Some(category) = self.category {
            if listing.category != category {
                return false;
            }
        }
        if let Some(transaction) = self.transaction {
            if listing.transaction != transaction {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if listing.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if listing.price > max {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if &listing.location.city != city {
                return false;
            }
        }
        true
    }
}

/// Apply the conjunction of all specified predicates in `filters` over
/// `listings`, preserving input order. Pure; the source slice is never
/// mutated, so this is safe to re-run on every keystroke.
pub fn filter_listings(listings: &[Listing], filters: &SearchFilters) -> Vec<Listing> {
    listings
        .iter()
        .filter(|l| filters.matches(l))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, title: &str, category: Category, price: i64, city: &str) -> Listing {
        Listing {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            title: title.to_string(),
            description: format!("{} in good condition", title),
            price,
            currency: "AOA".to_string(),
            category,
            transaction: TransactionType::Buy,
            status: ListingStatus::Available,
            images: vec![],
            location: Location {
                city: city.to_string(),
                neighborhood: "Talatona".to_string(),
                latitude: None,
                longitude: None,
            },
            views: 0,
            created_at: Utc::now(),
            features: vec![],
        }
    }

    fn ids(listings: &[Listing]) -> Vec<&str> {
        listings.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn empty_filters_keep_everything() {
        let input = vec![
            listing("a", "Vivenda T3", Category::House, 90_000_000, "Luanda"),
            listing("b", "Toyota Hilux", Category::Car, 12_000_000, "Benguela"),
        ];
        let out = filter_listings(&input, &SearchFilters::default());
        assert_eq!(out, input);
    }

    #[test]
    fn preserves_input_order() {
        let input = vec![
            listing("c", "Casa moderna", Category::House, 3, "Luanda"),
            listing("a", "Casa antiga", Category::House, 1, "Luanda"),
            listing("b", "Casa nova", Category::House, 2, "Luanda"),
        ];
        let out = filter_listings(
            &input,
            &SearchFilters {
                query: Some("casa".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(ids(&out), vec!["c", "a", "b"]);
    }

    #[test]
    fn predicates_are_conjoined() {
        let input = vec![
            listing("cheap-car", "Kia Picanto", Category::Car, 900_000, "Luanda"),
            listing("pricey-car", "Range Rover", Category::Car, 1_500_000, "Luanda"),
            listing("house", "Moradia", Category::House, 500_000, "Luanda"),
        ];
        let out = filter_listings(
            &input,
            &SearchFilters {
                category: Some(Category::Car),
                max_price: Some(1_000_000),
                ..Default::default()
            },
        );
        assert_eq!(ids(&out), vec!["cheap-car"]);
    }

    #[test]
    fn query_is_case_insensitive() {
        let input = vec![listing("a", "Apartamento T2", Category::Apartment, 100, "Luanda")];
        let out = filter_listings(
            &input,
            &SearchFilters {
                query: Some("TALATONA".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let input = vec![
            listing("low", "A", Category::Land, 100, "Luanda"),
            listing("mid", "B", Category::Land, 200, "Luanda"),
            listing("high", "C", Category::Land, 300, "Luanda"),
        ];
        let out = filter_listings(
            &input,
            &SearchFilters {
                min_price: Some(100),
                max_price: Some(200),
                ..Default::default()
            },
        );
        assert_eq!(ids(&out), vec!["low", "mid"]);
    }

    #[test]
    fn city_match_is_exact_and_case_sensitive() {
        let input = vec![listing("a", "Loja", Category::Office, 100, "Lubango")];
        let miss = filter_listings(
            &input,
            &SearchFilters {
                city: Some("lubango".to_string()),
                ..Default::default()
            },
        );
        assert!(miss.is_empty());

        let hit = filter_listings(
            &input,
            &SearchFilters {
                city: Some("Lubango".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(hit.len(), 1);
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let input = vec![
            listing("a", "Vivenda", Category::House, 500, "Luanda"),
            listing("b", "Jipe", Category::Car, 700, "Huambo"),
        ];
        let filters = SearchFilters {
            transaction: Some(TransactionType::Buy),
            min_price: Some(600),
            ..Default::default()
        };
        let first = filter_listings(&input, &filters);
        let second = filter_listings(&input, &filters);
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(input.len(), 2);
    }
}
