use crate::chat::Message;
use crate::listing::{Listing, ListingStatus};
use crate::wizard::Contract;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A new message landed in someone's inbox
    MessageSent(Message),

    /// A listing cleared the wizard and entered the marketplace
    ListingPublished(Listing),

    /// An admin changed a listing's status (god mode)
    ListingStatusChanged {
        listing_id: String,
        owner_id: String,
        status: ListingStatus,
    },

    /// An admin verified a user's account
    UserVerified { user_id: String },

    /// A contract-signing flow completed
    ContractSigned(Contract),

    /// A free-form notification (e.g. welcome message, review feedback)
    SystemNotification {
        level: NotificationLevel,
        message: String,
        target: Option<String>, // If None, broadcast to everyone
    },
}

impl Event {
    /// Whether this event belongs in `user_id`'s notification stream.
    pub fn concerns(&self, user_id: &str) -> bool {
        match self {
            Event::MessageSent(msg) => msg.receiver_id == user_id,
            Event::ListingPublished(_) => true,
            Event::ListingStatusChanged { owner_id, .. } => owner_id == user_id,
            Event::UserVerified { user_id: target } => target == user_id,
            Event::ContractSigned(contract) => {
                contract.owner_id == user_id || contract.buyer_id == user_id
            }
            Event::SystemNotification { target, .. } => {
                target.as_deref().map_or(true, |t| t == user_id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn message_events_target_the_receiver() {
        let event = Event::MessageSent(Message {
            id: "m1".to_string(),
            listing_id: "l1".to_string(),
            sender_id: "ana".to_string(),
            receiver_id: "bruno".to_string(),
            content: "ola".to_string(),
            timestamp: Utc::now(),
        });
        assert!(event.concerns("bruno"));
        assert!(!event.concerns("ana"));
    }

    #[test]
    fn untargeted_notifications_reach_everyone() {
        let event = Event::SystemNotification {
            level: NotificationLevel::Info,
            message: "maintenance tonight".to_string(),
            target: None,
        };
        assert!(event.concerns("ana"));
        assert!(event.concerns("bruno"));
    }
}
