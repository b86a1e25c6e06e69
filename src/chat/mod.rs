//! Chat state controller
//!
//! Owns the contact roster, the active conversation and the send pipeline.
//! Data arrives from three independent sources (REST polling, the socket
//! fan-out and the pub/sub notification channel) and is folded into one
//! ordered view that the presentation layer receives as `ChatUpdate`s.

mod controller;
mod events;
mod poller;
mod reconcile;
pub mod roster;

#[cfg(test)]
pub(crate) mod fakes;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Contact, Message};

pub use controller::{ChatController, ChatSettings};
pub use events::run_events;
pub use reconcile::ReconcilePolicy;

/// The logged-in coordinator, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub coordinator_id: String,
}

/// REST operations the controller depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// All user accounts, unfiltered.
    async fn list_users(&self, size: u32) -> Result<Vec<Contact>>;

    /// Both directions between `me` and `other`, sorted by creation time.
    async fn fetch_conversation(&self, me: &str, other: &str, size: u32) -> Result<Vec<Message>>;

    /// Persist a message and return the stored copy.
    async fn send_message(&self, sender: &str, receiver: &str, text: &str) -> Result<Message>;
}

/// Real-time fan-out of sent messages to the recipient.
#[async_trait]
pub trait MessageFanout: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Resolves once the payload has been written to the transport.
    async fn emit_message(&self, message: &Message) -> Result<()>;
}

/// Why a send did not go through.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("empty message")]
    Empty,
    #[error("no contact selected")]
    NoContactSelected,
    #[error("real-time transport is not connected")]
    TransportDisconnected,
    #[error("backend rejected the message: {0:#}")]
    Api(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// Non-blocking notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub text: String,
}

impl Toast {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            text: text.into(),
        }
    }
}

/// State changes published to the presentation layer.
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    Contacts {
        contacts: Vec<Contact>,
        loading: bool,
    },
    Conversation {
        contact_id: Option<String>,
        messages: Vec<Message>,
        /// No fetch has completed yet for this contact.
        loading: bool,
    },
    Toast(Toast),
    Transport {
        socket_connected: bool,
    },
}
