//! Backend JSON shapes shared by the REST endpoints and the socket payload.

use serde::de;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{parse_timestamp, DeliveryStatus, Message};

/// List responses come either bare or wrapped in a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Page<T> {
    Paged { content: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Page<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Page::Paged { content } => content,
            Page::Bare(items) => items,
        }
    }
}

/// Identifier that may arrive as a string or a number.
pub(crate) fn opt_id<'de, D: de::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<String>;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("string or integer id")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_some<D2: de::Deserializer<'de>>(
            self,
            d: D2,
        ) -> std::result::Result<Self::Value, D2::Error> {
            d.deserialize_any(Visitor)
        }
    }
    d.deserialize_option(Visitor)
}

/// A persisted chat message as the backend serializes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessage {
    #[serde(deserialize_with = "opt_id", default, alias = "_id")]
    id: Option<String>,
    #[serde(deserialize_with = "opt_id", default, alias = "sender", alias = "from")]
    sender_id: Option<String>,
    #[serde(deserialize_with = "opt_id", default, alias = "receiver", alias = "to")]
    receiver_id: Option<String>,
    #[serde(alias = "content", alias = "text")]
    message: Option<String>,
    #[serde(alias = "timestamp", alias = "date")]
    created_at: Option<String>,
}

impl WireMessage {
    /// Convert to a `Message`, filling gaps from the request context.
    ///
    /// Server-side messages are at least `Delivered`: the backend holds them.
    pub fn into_message(self, fallback_sender: &str, fallback_receiver: &str) -> Option<Message> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let created_at = match self.created_at.as_deref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => {
                tracing::debug!("Message {} has no parseable timestamp", id);
                chrono::Utc::now()
            }
        };
        Some(Message {
            id,
            sender_id: self
                .sender_id
                .unwrap_or_else(|| fallback_sender.to_string()),
            receiver_id: self
                .receiver_id
                .unwrap_or_else(|| fallback_receiver.to_string()),
            content: self.message.unwrap_or_default(),
            created_at,
            status: DeliveryStatus::Delivered,
            is_empty: false,
        })
    }
}

/// Payload emitted with the socket `sendMessage` event.
pub(crate) fn to_wire_json(message: &Message) -> Value {
    json!({
        "id": message.id,
        "senderId": message.sender_id,
        "receiverId": message.receiver_id,
        "message": message.content,
        "createdAt": message.created_at.to_rfc3339(),
    })
}

/// Parse a `sendMessage` payload pushed by the socket server.
///
/// Payloads must name both parties; there is no request context to fall back on.
pub(crate) fn message_from_payload(payload: Value) -> Option<Message> {
    let wire: WireMessage = match serde_json::from_value(payload) {
        Ok(w) => w,
        Err(e) => {
            tracing::debug!("Unrecognized socket payload: {}", e);
            return None;
        }
    };
    if wire.sender_id.is_none() || wire.receiver_id.is_none() {
        return None;
    }
    wire.into_message("", "")
}
