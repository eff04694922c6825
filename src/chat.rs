use crate::entity::User;
use crate::listing::Listing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A directed message between two users, optionally tied to a listing.
/// Messages are append-only; there is no edit or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Empty string for a thread that is not about any listing.
    #[serde(default)]
    pub listing_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// The other party, from the point of view of `viewer_id`.
    pub fn counterparty(&self, viewer_id: &str) -> &str {
        if self.sender_id == viewer_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// An inbox thread derived from the message collection. Never persisted;
/// recomputed from messages on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub counterparty_id: String,
    pub listing_id: String,
    /// Ascending by timestamp.
    pub messages: Vec<Message>,
    pub last_message: Message,
    /// Resolved records; `None` when the referenced user or listing is gone.
    pub counterparty: Option<User>,
    pub listing: Option<Listing>,
}

/// Partition the messages involving `viewer_id` into per-(counterparty,
/// listing) threads, most recently active first.
///
/// Messages inside a thread are sorted ascending by timestamp; the thread's
/// last message is the one with the greatest timestamp, with equal
/// timestamps resolved in favour of the later position in the input scan.
/// Unresolvable user or listing references degrade to `None`.
pub fn group_conversations(
    messages: &[Message],
    viewer_id: &str,
    users: &[User],
    listings: &[Listing],
) -> Vec<Conversation> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<((String, String), Vec<Message>)> = Vec::new();

    for msg in messages {
        if msg.sender_id != viewer_id && msg.receiver_id != viewer_id {
            continue;
        }
        let key = (
            msg.counterparty(viewer_id).to_string(),
            msg.listing_id.clone(),
        );
        match index.get(&key) {
            Some(&i) => groups[i].1.push(msg.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![msg.clone()]));
            }
        }
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .map(|((counterparty_id, listing_id), mut msgs)| {
            // Stable sort: equal timestamps keep their scan order, so the
            // last element is the normative "last message".
            msgs.sort_by_key(|m| m.timestamp);
            let last_message = msgs
                .last()
                .cloned()
                .expect("a group always holds at least one message");

            let counterparty = users.iter().find(|u| u.id == counterparty_id).cloned();
            let listing = if listing_id.is_empty() {
                None
            } else {
                listings.iter().find(|l| l.id == listing_id).cloned()
            };

            Conversation {
                counterparty_id,
                listing_id,
                messages: msgs,
                last_message,
                counterparty,
                listing,
            }
        })
        .collect();

    // Stable, so conversations with identical last activity keep their
    // first-appearance order.
    conversations.sort_by(|a, b| b.last_message.timestamp.cmp(&a.last_message.timestamp));
    conversations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Role;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn msg(id: &str, listing: &str, from: &str, to: &str, minute: u32) -> Message {
        Message {
            id: id.to_string(),
            listing_id: listing.to_string(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            content: format!("message {}", id),
            timestamp: at(minute),
        }
    }

    fn user(id: &str) -> User {
        let mut u = User::new(id.to_uppercase(), format!("{}@example.com", id), Role::Client);
        u.id = id.to_string();
        u
    }

    #[test]
    fn empty_input_yields_no_conversations() {
        assert!(group_conversations(&[], "ana", &[], &[]).is_empty());
    }

    #[test]
    fn single_message_yields_single_conversation() {
        let messages = vec![msg("m1", "l1", "ana", "bruno", 0)];
        let out = group_conversations(&messages, "ana", &[user("bruno")], &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].counterparty_id, "bruno");
        assert_eq!(out[0].messages.len(), 1);
        assert_eq!(out[0].last_message.id, "m1");
    }

    #[test]
    fn messages_not_involving_viewer_are_dropped() {
        let messages = vec![
            msg("m1", "l1", "bruno", "carla", 0),
            msg("m2", "l1", "ana", "bruno", 1),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].messages[0].id, "m2");
    }

    #[test]
    fn same_counterparty_different_listing_splits_threads() {
        let messages = vec![
            msg("m1", "l1", "ana", "bruno", 0),
            msg("m2", "l2", "ana", "bruno", 1),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn direction_does_not_split_threads() {
        let messages = vec![
            msg("m1", "l1", "ana", "bruno", 0),
            msg("m2", "l1", "bruno", "ana", 1),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].messages.len(), 2);
    }

    #[test]
    fn thread_messages_are_chronological() {
        let messages = vec![
            msg("late", "l1", "ana", "bruno", 30),
            msg("early", "l1", "bruno", "ana", 5),
            msg("mid", "l1", "ana", "bruno", 15),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        let ids: Vec<&str> = out[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);
        assert_eq!(out[0].last_message.id, "late");
    }

    #[test]
    fn equal_timestamps_resolve_to_later_scan_position() {
        let messages = vec![
            msg("first", "l1", "ana", "bruno", 10),
            msg("second", "l1", "bruno", "ana", 10),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        assert_eq!(out[0].last_message.id, "second");
    }

    #[test]
    fn conversations_order_most_recent_first() {
        let messages = vec![
            msg("m1", "l1", "ana", "bruno", 1),
            msg("m2", "l2", "ana", "carla", 3),
            msg("m3", "l3", "ana", "dario", 2),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        let parties: Vec<&str> = out.iter().map(|c| c.counterparty_id.as_str()).collect();
        assert_eq!(parties, vec!["carla", "dario", "bruno"]);
    }

    #[test]
    fn conversations_with_equal_last_activity_keep_first_appearance_order() {
        let messages = vec![
            msg("m1", "l1", "ana", "bruno", 10),
            msg("m2", "l2", "ana", "carla", 10),
            msg("m3", "l3", "ana", "dario", 10),
        ];
        let out = group_conversations(&messages, "ana", &[], &[]);
        let parties: Vec<&str> = out.iter().map(|c| c.counterparty_id.as_str()).collect();
        assert_eq!(parties, vec!["bruno", "carla", "dario"]);
    }

    #[test]
    fn missing_user_and_listing_degrade_to_none() {
        let messages = vec![msg("m1", "gone-listing", "ana", "ghost", 0)];
        let out = group_conversations(&messages, "ana", &[user("bruno")], &[]);
        assert_eq!(out.len(), 1);
        assert!(out[0].counterparty.is_none());
        assert!(out[0].listing.is_none());
    }

    #[test]
    fn empty_listing_id_resolves_to_no_listing() {
        let messages = vec![msg("m1", "", "ana", "bruno", 0)];
        let out = group_conversations(&messages, "ana", &[], &[]);
        assert_eq!(out.len(), 1);
        assert!(out[0].listing.is_none());
    }

    #[test]
    fn grouping_is_idempotent() {
        let messages = vec![
            msg("m1", "l1", "ana", "bruno", 0),
            msg("m2", "l1", "bruno", "ana", 1),
            msg("m3", "l2", "carla", "ana", 2),
        ];
        let users = vec![user("bruno"), user("carla")];
        let first = group_conversations(&messages, "ana", &users, &[]);
        let second = group_conversations(&messages, "ana", &users, &[]);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.messages, b.messages);
            assert_eq!(a.last_message, b.last_message);
        }
    }
}
