use crate::{
    chat::Message,
    entity::{Role, User},
    listing::{Category, Listing, ListingStatus, Location, TransactionType},
    wizard::Contract,
};
use anyhow::{Context, Result};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqliteRow, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Ephemeral store, used by tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        Ok(Self { pool })
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                role TEXT NOT NULL,
                is_verified INTEGER NOT NULL DEFAULT 0,
                avatar TEXT,
                rating REAL NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                price INTEGER NOT NULL,
                currency TEXT NOT NULL,
                category TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                status TEXT NOT NULL,
                images TEXT NOT NULL,
                city TEXT NOT NULL,
                neighborhood TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                views INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                features TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_listings_city ON listings(city);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL DEFAULT '',
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

            CREATE TABLE IF NOT EXISTS contracts (
                id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                buyer_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                signer_name TEXT NOT NULL,
                signed_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, is_verified, avatar, rating, review_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_verified)
        .bind(&user.avatar)
        .bind(user.rating)
        .bind(user.review_count)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.iter().map(user_from_row).collect()
    }

    /// Admin-only mutation; no other code path touches the flag.
    pub async fn set_user_verified(&self, id: &str, verified: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_verified = ? WHERE id = ?")
            .bind(verified)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update user verification")?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Listings
    // -------------------------------------------------------------------------

    pub async fn insert_listing(&self, listing: &Listing) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings
                (id, owner_id, title, description, price, currency, category,
                 transaction_type, status, images, city, neighborhood,
                 latitude, longitude, views, created_at, features)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.owner_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price)
        .bind(&listing.currency)
        .bind(listing.category.as_str())
        .bind(listing.transaction.as_str())
        .bind(listing.status.as_str())
        .bind(serde_json::to_string(&listing.images)?)
        .bind(&listing.location.city)
        .bind(&listing.location.neighborhood)
        .bind(listing.location.latitude)
        .bind(listing.location.longitude)
        .bind(listing.views)
        .bind(listing.created_at)
        .bind(serde_json::to_string(&listing.features)?)
        .execute(&self.pool)
        .await
        .context("Failed to insert listing")?;

        Ok(())
    }

    pub async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch listing")?;

        row.map(|r| listing_from_row(&r)).transpose()
    }

    /// All listings, newest first.
    pub async fn list_listings(&self) -> Result<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list listings")?;

        rows.iter().map(listing_from_row).collect()
    }

    pub async fn set_listing_status(&self, id: &str, status: ListingStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE listings SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update listing status")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_views(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE listings SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to increment views")?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    pub async fn insert_message(&self, msg: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, listing_id, sender_id, receiver_id, content, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.listing_id)
        .bind(&msg.sender_id)
        .bind(&msg.receiver_id)
        .bind(&msg.content)
        .bind(msg.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        Ok(())
    }

    /// The full message log, chronological; insertion order breaks timestamp
    /// ties, which the conversation grouper relies on.
    pub async fn list_messages(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query("SELECT * FROM messages ORDER BY timestamp, rowid")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list messages")?;

        rows.iter().map(message_from_row).collect()
    }

    // -------------------------------------------------------------------------
    // Contracts
    // -------------------------------------------------------------------------

    pub async fn insert_contract(&self, contract: &Contract) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts (id, listing_id, owner_id, buyer_id, kind, signer_name, signed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contract.id)
        .bind(&contract.listing_id)
        .bind(&contract.owner_id)
        .bind(&contract.buyer_id)
        .bind(contract.kind.as_str())
        .bind(&contract.signer_name)
        .bind(contract.signed_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert contract")?;

        Ok(())
    }

    pub async fn list_contracts(&self) -> Result<Vec<Contract>> {
        let rows = sqlx::query("SELECT * FROM contracts ORDER BY signed_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list contracts")?;

        rows.iter().map(contract_from_row).collect()
    }

    pub async fn is_empty(&self) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        let n: i64 = row.try_get("n")?;
        Ok(n == 0)
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: role.parse::<Role>()?,
        is_verified: row.try_get("is_verified")?,
        avatar: row.try_get("avatar")?,
        rating: row.try_get("rating")?,
        review_count: row.try_get("review_count")?,
    })
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing> {
    let category: String = row.try_get("category")?;
    let transaction: String = row.try_get("transaction_type")?;
    let status: String = row.try_get("status")?;
    let images: String = row.try_get("images")?;
    let features: String = row.try_get("features")?;

    Ok(Listing {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        currency: row.try_get("currency")?,
        category: category.parse::<Category>()?,
        transaction: transaction.parse::<TransactionType>()?,
        status: status.parse::<ListingStatus>()?,
        images: serde_json::from_str(&images).context("Malformed images column")?,
        location: Location {
            city: row.try_get("city")?,
            neighborhood: row.try_get("neighborhood")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        },
        views: row.try_get("views")?,
        created_at: row.try_get("created_at")?,
        features: serde_json::from_str(&features).context("Malformed features column")?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        content: row.try_get("content")?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn contract_from_row(row: &SqliteRow) -> Result<Contract> {
    let kind: String = row.try_get("kind")?;
    Ok(Contract {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        owner_id: row.try_get("owner_id")?,
        buyer_id: row.try_get("buyer_id")?,
        kind: kind.parse::<TransactionType>()?,
        signer_name: row.try_get("signer_name")?,
        signed_at: row.try_get("signed_at")?,
    })
}
