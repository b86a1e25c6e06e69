//! Contact (supervisor) models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reported presence of a contact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    #[default]
    Offline,
    Away,
    Busy,
}

impl Presence {
    /// Lenient parse of a backend status string; unknown values are offline.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "online" | "available" | "ativo" => Presence::Online,
            "away" | "ausente" => Presence::Away,
            "busy" | "ocupado" => Presence::Busy,
            _ => Presence::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Offline => "offline",
            Presence::Away => "away",
            Presence::Busy => "busy",
        }
    }
}

/// A supervisor reachable through the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub presence: Presence,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread: u32,
    /// Coordinator this contact reports to.
    pub coordinator_id: Option<String>,
}

impl Contact {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
            presence: Presence::default(),
            last_message: None,
            last_message_at: None,
            unread: 0,
            coordinator_id: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator_id: impl Into<String>) -> Self {
        self.coordinator_id = Some(coordinator_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_from_status() {
        assert_eq!(Presence::from_status("ONLINE"), Presence::Online);
        assert_eq!(Presence::from_status("away"), Presence::Away);
        assert_eq!(Presence::from_status("busy"), Presence::Busy);
        assert_eq!(Presence::from_status(""), Presence::Offline);
        assert_eq!(Presence::from_status("on-leave"), Presence::Offline);
    }

    #[test]
    fn test_presence_serde_lowercase() {
        let json = serde_json::to_string(&Presence::Busy).unwrap();
        assert_eq!(json, "\"busy\"");
        let back: Presence = serde_json::from_str("\"away\"").unwrap();
        assert_eq!(back, Presence::Away);
    }
}
