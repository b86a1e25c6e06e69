//! Data models for contacts and chat messages

mod contact;
mod message;

pub use contact::*;
pub use message::*;
