use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::bus::{Event, EventBus};
use crate::chat::{group_conversations, Message};
use crate::entity::{Role, User};
use crate::listing::{filter_listings, Category, ListingStatus, SearchFilters, TransactionType};
use crate::store::Store;
use crate::wizard::{ContractWizard, ListingWizard};

// -----------------------------------------------------------------------------
// Server state
// -----------------------------------------------------------------------------

pub struct ApiState {
    pub store: Store,
    pub bus: Arc<EventBus>,
}

pub struct ApiServer {
    store: Store,
    bus: Arc<EventBus>,
}

impl ApiServer {
    pub fn new(store: Store, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(ApiState {
            store: self.store.clone(),
            bus: self.bus.clone(),
        });

        Router::new()
            .route("/api/listings", get(search_listings).post(publish_listing))
            .route("/api/listings/:id", get(get_listing))
            .route("/api/users", post(create_user))
            .route("/api/users/:id", get(get_user))
            .route("/api/messages", post(send_message))
            .route("/api/conversations/:user_id", get(inbox))
            .route("/api/contracts", post(sign_contract))
            .route("/api/admin/users/:id/verify", post(verify_user))
            .route("/api/admin/listings/:id/status", post(override_status))
            .route("/api/events/:user_id", get(events_stream))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

type ApiError = (StatusCode, String);

fn internal(err: anyhow::Error) -> ApiError {
    error!("request failed: {:#}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

fn not_found(what: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

// -----------------------------------------------------------------------------
// Listings
// -----------------------------------------------------------------------------

/// Raw query-string filters. Everything is a string here so a malformed
/// value (`min_price=abc`) degrades to "not specified" instead of a 400.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub transaction: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub city: Option<String>,
}

impl ListingQuery {
    pub fn into_filters(self) -> SearchFilters {
        SearchFilters {
            query: self.q.filter(|q| !q.is_empty()),
            category: self.category.and_then(|c| c.parse::<Category>().ok()),
            transaction: self
                .transaction
                .and_then(|t| t.parse::<TransactionType>().ok()),
            min_price: self.min_price.and_then(|p| p.parse::<i64>().ok()),
            max_price: self.max_price.and_then(|p| p.parse::<i64>().ok()),
            city: self.city.filter(|c| !c.is_empty()),
        }
    }
}

async fn search_listings(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let listings = state.store.list_listings().await.map_err(internal)?;
    let filtered = filter_listings(&listings, &query.into_filters());
    Ok(Json(filtered))
}

async fn get_listing(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.get_listing(&id).await.map_err(internal)? {
        Some(mut listing) => {
            state.store.increment_views(&id).await.map_err(internal)?;
            listing.views += 1;
            Ok(Json(listing))
        }
        None => Err(not_found("listing")),
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishListing {
    pub owner_id: String,
    #[serde(flatten)]
    pub draft: ListingWizard,
}

/// Walk the three-step wizard server-side; any step failure is the
/// validation error reported to the client.
async fn publish_listing(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<PublishListing>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = state
        .store
        .get_user(&payload.owner_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("owner"))?;

    let mut wizard = payload.draft;
    while wizard.step() < 3 {
        wizard
            .advance()
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    }
    let listing = wizard
        .finish(&owner.id)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    state.store.insert_listing(&listing).await.map_err(internal)?;
    info!("listing {} published by {}", listing.id, owner.id);
    state.bus.publish(Event::ListingPublished(listing.clone()));

    Ok((StatusCode::CREATED, Json(listing)))
}

// -----------------------------------------------------------------------------
// Users
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

async fn create_user(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<CreateUser>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.name.trim().is_empty() || payload.email.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "name and email are required".to_string(),
        ));
    }
    let user = User::new(payload.name, payload.email, payload.role);
    state.store.insert_user(&user).await.map_err(internal)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.get_user(&id).await.map_err(internal)? {
        Some(user) => Ok(Json(user)),
        None => Err(not_found("user")),
    }
}

// -----------------------------------------------------------------------------
// Messaging
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub listing_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
}

async fn send_message(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<SendMessage>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.sender_id == payload.receiver_id {
        return Err((
            StatusCode::BAD_REQUEST,
            "sender and receiver must differ".to_string(),
        ));
    }
    if payload.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "message content must not be empty".to_string(),
        ));
    }

    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        listing_id: payload.listing_id,
        sender_id: payload.sender_id,
        receiver_id: payload.receiver_id,
        content: payload.content,
        timestamp: Utc::now(),
    };
    state.store.insert_message(&message).await.map_err(internal)?;
    state.bus.publish(Event::MessageSent(message.clone()));

    Ok((StatusCode::CREATED, Json(message)))
}

/// Inbox view: the conversation grouper over fresh store snapshots.
async fn inbox(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.store.list_messages().await.map_err(internal)?;
    let users = state.store.list_users().await.map_err(internal)?;
    let listings = state.store.list_listings().await.map_err(internal)?;

    let conversations = group_conversations(&messages, &user_id, &users, &listings);
    Ok(Json(conversations))
}

// -----------------------------------------------------------------------------
// Contracts
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SignContract {
    pub listing_id: String,
    pub buyer_id: String,
    pub terms_accepted: bool,
    pub signer_name: String,
    pub signature: String,
}

async fn sign_contract(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<SignContract>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .store
        .get_listing(&payload.listing_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("listing"))?;

    let mut wizard = ContractWizard::new();
    wizard.listing_id = listing.id.clone();
    wizard.owner_id = listing.owner_id.clone();
    wizard.buyer_id = payload.buyer_id;
    wizard.kind = Some(listing.transaction);
    wizard.terms_accepted = payload.terms_accepted;
    wizard.signer_name = payload.signer_name;
    wizard.signature = payload.signature;

    while wizard.step() < 3 {
        wizard
            .advance()
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    }
    let contract = wizard
        .finish()
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let settled = match contract.kind {
        TransactionType::Rent => ListingStatus::Rented,
        TransactionType::Buy => ListingStatus::Sold,
    };
    state.store.insert_contract(&contract).await.map_err(internal)?;
    state
        .store
        .set_listing_status(&listing.id, settled)
        .await
        .map_err(internal)?;

    info!(
        "contract {} signed for listing {} ({})",
        contract.id, listing.id, settled
    );
    state.bus.publish(Event::ContractSigned(contract.clone()));

    Ok((StatusCode::CREATED, Json(contract)))
}

// -----------------------------------------------------------------------------
// Admin (god mode)
// -----------------------------------------------------------------------------

async fn verify_user(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.store.set_user_verified(&id, true).await.map_err(internal)?;
    if !updated {
        return Err(not_found("user"));
    }
    state.bus.publish(Event::UserVerified {
        user_id: id.clone(),
    });
    info!("user {} verified", id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StatusOverride {
    pub status: ListingStatus,
}

async fn override_status(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(payload): Json<StatusOverride>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .store
        .get_listing(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("listing"))?;

    state
        .store
        .set_listing_status(&id, payload.status)
        .await
        .map_err(internal)?;

    info!("listing {} forced to {}", id, payload.status);
    state.bus.publish(Event::ListingStatusChanged {
        listing_id: id,
        owner_id: listing.owner_id,
        status: payload.status,
    });
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Events (SSE)
// -----------------------------------------------------------------------------

async fn events_stream(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::BoxError>>> {
    info!("new event stream for user {}", user_id);

    let mut rx = state.bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event.concerns(&user_id) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(SseEvent::default().data(json)),
                        Err(e) => {
                            error!("failed to serialize event: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    error!("event stream for {} lagged, skipped {}", user_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_query_values_are_ignored() {
        let query = ListingQuery {
            q: Some(String::new()),
            category: Some("CASTLE".to_string()),
            transaction: Some("RENT".to_string()),
            min_price: Some("abc".to_string()),
            max_price: Some("1000".to_string()),
            city: None,
        };
        let filters = query.into_filters();
        assert!(filters.query.is_none());
        assert!(filters.category.is_none());
        assert_eq!(filters.transaction, Some(TransactionType::Rent));
        assert!(filters.min_price.is_none());
        assert_eq!(filters.max_price, Some(1000));
        assert!(filters.city.is_none());
    }
}
