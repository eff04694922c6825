use crate::bus::{Event, EventBus, NotificationLevel};
use crate::chat::Message;
use crate::entity::{Role, User};
use crate::listing::{Category, Listing, ListingStatus, Location, TransactionType};
use crate::store::Store;
use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

/// Populate an empty store with a small Luanda-flavoured dataset so the
/// daemon is browsable right after first start.
pub async fn seed_if_empty(store: &Store, bus: &EventBus) -> Result<()> {
    if !store.is_empty().await? {
        return Ok(());
    }
    info!("Empty store detected, seeding demo data");

    let mut admin = User::new("Administração", "admin@kilamba.ao", Role::Admin);
    admin.is_verified = true;
    let mut joana = User::new("Joana Cassule", "joana@example.com", Role::Owner);
    joana.is_verified = true;
    joana.rating = 4.7;
    joana.review_count = 23;
    let mut paulo = User::new("Paulo Kiala", "paulo@example.com", Role::Owner);
    paulo.rating = 4.1;
    paulo.review_count = 8;
    let miguel = User::new("Miguel dos Santos", "miguel@example.com", Role::Client);

    for user in [&admin, &joana, &paulo, &miguel] {
        store.insert_user(user).await?;
    }

    let now = Utc::now();
    let listings = [
        Listing {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: joana.id.clone(),
            title: "Vivenda T4 no Condomínio Vida Pacífica".to_string(),
            description: "Quatro quartos, piscina partilhada, gerador e água do condomínio."
                .to_string(),
            price: 95_000_000,
            currency: "AOA".to_string(),
            category: Category::House,
            transaction: TransactionType::Buy,
            status: ListingStatus::Available,
            images: vec!["seed/vivenda-1.jpg".to_string()],
            location: Location {
                city: "Luanda".to_string(),
                neighborhood: "Talatona".to_string(),
                latitude: Some(-8.917),
                longitude: Some(13.184),
            },
            views: 0,
            created_at: now - Duration::days(12),
            features: vec![
                "piscina".to_string(),
                "gerador".to_string(),
                "garagem dupla".to_string(),
            ],
        },
        Listing {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: joana.id.clone(),
            title: "Apartamento T2 na Centralidade do Kilamba".to_string(),
            description: "Segundo andar, prédio com elevador, perto da escola primária."
                .to_string(),
            price: 450_000,
            currency: "AOA".to_string(),
            category: Category::Apartment,
            transaction: TransactionType::Rent,
            status: ListingStatus::Available,
            images: vec!["seed/kilamba-t2.jpg".to_string()],
            location: Location {
                city: "Luanda".to_string(),
                neighborhood: "Kilamba".to_string(),
                latitude: Some(-8.997),
                longitude: Some(13.271),
            },
            views: 0,
            created_at: now - Duration::days(5),
            features: vec!["elevador".to_string(), "varanda".to_string()],
        },
        Listing {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: paulo.id.clone(),
            title: "Toyota Hilux 2019".to_string(),
            description: "Cabine dupla, 85 mil km, revisões na concessionária.".to_string(),
            price: 28_500_000,
            currency: "AOA".to_string(),
            category: Category::Car,
            transaction: TransactionType::Buy,
            status: ListingStatus::Available,
            images: vec!["seed/hilux.jpg".to_string()],
            location: Location {
                city: "Benguela".to_string(),
                neighborhood: "Praia Morena".to_string(),
                latitude: None,
                longitude: None,
            },
            views: 0,
            created_at: now - Duration::days(2),
            features: vec!["4x4".to_string(), "ar condicionado".to_string()],
        },
    ];

    for listing in &listings {
        store.insert_listing(listing).await?;
    }

    let first_listing = &listings[0];
    let seed_messages = [
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: first_listing.id.clone(),
            sender_id: miguel.id.clone(),
            receiver_id: joana.id.clone(),
            content: "Boa tarde, a vivenda ainda está disponível?".to_string(),
            timestamp: now - Duration::hours(20),
        },
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: first_listing.id.clone(),
            sender_id: joana.id.clone(),
            receiver_id: miguel.id.clone(),
            content: "Boa tarde! Está sim, posso marcar visita para sábado.".to_string(),
            timestamp: now - Duration::hours(18),
        },
    ];
    for msg in &seed_messages {
        store.insert_message(msg).await?;
    }

    bus.publish(Event::SystemNotification {
        level: NotificationLevel::Info,
        message: "Demo dataset loaded".to_string(),
        target: None,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_is_skipped_on_non_empty_stores() {
        let store = Store::in_memory().await.unwrap();
        store.init().await.unwrap();
        let bus = EventBus::new();

        seed_if_empty(&store, &bus).await.unwrap();
        let users_after_first = store.list_users().await.unwrap().len();
        assert!(users_after_first > 0);

        seed_if_empty(&store, &bus).await.unwrap();
        assert_eq!(store.list_users().await.unwrap().len(), users_after_first);
    }
}
