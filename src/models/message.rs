//! Chat message models

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text of the inline bubble shown when an empty message is submitted.
pub const EMPTY_MESSAGE_WARNING: &str = "Mensagem vazia não pode ser enviada";

/// Delivery status of a message.
///
/// Moves forward only: `Sending -> Sent -> Delivered -> Read`.
/// `Failed` is a terminal alternative reachable from `Sending` alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    fn rank(self) -> Option<u8> {
        match self {
            DeliveryStatus::Sending => Some(0),
            DeliveryStatus::Sent => Some(1),
            DeliveryStatus::Delivered => Some(2),
            DeliveryStatus::Read => Some(3),
            DeliveryStatus::Failed => None,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (Some(0), None) => true,
            _ => false,
        }
    }

    /// Apply `next` if legal. Returns whether the status changed.
    pub fn advance(&mut self, next: DeliveryStatus) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    /// The further-along of two statuses; a `Failed` side never wins over progress.
    pub fn most_advanced(self, other: DeliveryStatus) -> DeliveryStatus {
        let mut merged = self;
        merged.advance(other);
        merged
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Local UUID until the backend confirms, then the server id.
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// Marks the client-side validation bubble; never sent anywhere.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_empty: bool,
}

impl Message {
    /// Optimistic outgoing message, not yet confirmed by the backend.
    pub fn draft(sender_id: &str, receiver_id: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            status: DeliveryStatus::Sending,
            is_empty: false,
        }
    }

    /// Transient warning bubble for an empty submission.
    pub fn empty_warning(sender_id: &str, receiver_id: &str) -> Self {
        Self {
            content: EMPTY_MESSAGE_WARNING.to_string(),
            is_empty: true,
            status: DeliveryStatus::Failed,
            ..Self::draft(sender_id, receiver_id, "")
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    /// Whether this message belongs to the conversation between `a` and `b`.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

/// Sort ascending by creation time, keeping arrival order for ties.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.created_at);
}

/// Parse a backend timestamp: RFC 3339, or a naive date-time taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
