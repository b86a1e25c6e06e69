//! REST API client for the chat backend, plus the CLI commands built on it

mod chat;
pub mod client;
mod users;
pub(crate) mod wire;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chat::{roster, ChatApi, ChatController, ChatSettings, SendError};
use crate::config::Config;
use crate::models::{Contact, Message, EMPTY_MESSAGE_WARNING};
use crate::realtime::SocketClient;
use client::ApiClient;

#[async_trait]
impl ChatApi for ApiClient {
    async fn list_users(&self, size: u32) -> Result<Vec<Contact>> {
        users::list_users_data(self, size).await
    }

    async fn fetch_conversation(&self, me: &str, other: &str, size: u32) -> Result<Vec<Message>> {
        chat::fetch_conversation_data(self, me, other, size).await
    }

    async fn send_message(&self, sender: &str, receiver: &str, text: &str) -> Result<Message> {
        chat::send_message_data(self, sender, receiver, text).await
    }
}

/// How long `send` waits for the socket before giving up.
const SOCKET_WAIT: Duration = Duration::from_secs(10);

/// Find a contact by exact id, then by case-insensitive name.
fn resolve_contact<'a>(contacts: &'a [Contact], query: &str) -> Result<&'a Contact> {
    if let Some(c) = contacts.iter().find(|c| c.id == query) {
        return Ok(c);
    }
    let needle = query.to_lowercase();
    let matches: Vec<&Contact> = contacts
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one),
        [] => bail!("No contact matching '{}'. Run 'supervisor-chat contacts'", query),
        many => bail!(
            "'{}' matches {} contacts; use the id instead",
            query,
            many.len()
        ),
    }
}

async fn coordinator_contacts(client: &ApiClient, config: &Config) -> Result<Vec<Contact>> {
    let session = config.session()?;
    let users = users::list_users_data(client, config.contacts_page_size).await?;
    Ok(roster::for_coordinator(users, &session.coordinator_id))
}

/// List the contacts linked to the configured coordinator
pub async fn list_contacts(config: &Config, limit: usize) -> Result<()> {
    let client = ApiClient::new(config)?;
    let contacts = coordinator_contacts(&client, config).await?;

    println!("\nContacts:");
    println!("{:-<60}", "");

    if contacts.is_empty() {
        println!("  (no contacts linked to this coordinator)");
    }

    for contact in contacts.iter().take(limit) {
        println!("{} [{}]", contact.name, contact.presence.as_str());
        println!("  ID: {}", contact.id);
    }

    Ok(())
}

/// Print the conversation with a contact, oldest first
pub async fn read_conversation(config: &Config, contact: &str, limit: usize) -> Result<()> {
    let client = ApiClient::new(config)?;
    let session = config.session()?;
    let contacts = coordinator_contacts(&client, config).await?;
    let contact = resolve_contact(&contacts, contact)?;

    let messages = chat::fetch_conversation_data(
        &client,
        &session.coordinator_id,
        &contact.id,
        config.messages_page_size,
    )
    .await?;

    if messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    let skip = messages.len().saturating_sub(limit);
    for msg in &messages[skip..] {
        let who = if msg.is_from(&session.coordinator_id) {
            "me"
        } else {
            contact.name.as_str()
        };
        println!(
            "[{}] {}: {}",
            msg.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            who,
            msg.content
        );
    }

    Ok(())
}

/// Send one message through the same pipeline the TUI uses.
///
/// The socket must be connected first: sends are blocked without it.
pub async fn send_message(config: &Config, to: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!(EMPTY_MESSAGE_WARNING);
    }

    let client = Arc::new(ApiClient::new(config)?);
    let session = config.session()?;
    let contacts = coordinator_contacts(&client, config).await?;
    let contact = resolve_contact(&contacts, to)?.clone();

    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let socket = Arc::new(SocketClient::spawn(&config.socket_url, events_tx)?);
    if !socket.wait_connected(SOCKET_WAIT).await {
        socket.close().await;
        bail!(
            "Could not connect to the socket at {}; message not sent",
            config.socket_url
        );
    }

    let (updates, _updates_rx) = mpsc::unbounded_channel();
    let controller = ChatController::new(
        client,
        socket.clone(),
        session,
        ChatSettings::from_config(config),
        updates,
    );
    controller.select_contact(&contact.id).await;
    let result = controller.send_message(text).await;
    controller.shutdown().await;
    socket.close().await;

    match result {
        Ok(message) => {
            println!("Message sent to {} ({}).", contact.name, message.status.as_str());
            Ok(())
        }
        Err(SendError::Api(e)) => Err(e).context("Message not sent"),
        Err(e) => bail!("Message not sent: {}", e),
    }
}

/// Show the configuration and probe the backend and the socket
pub async fn status(config: &Config) -> Result<()> {
    println!("Config:      {}", Config::config_path()?.display());
    println!("API:         {}", config.api_base_url);
    println!("Socket:      {}", config.socket_url);
    println!(
        "Coordinator: {}",
        config.coordinator_id.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Token:       {}",
        if config.auth_token.is_some() { "present" } else { "none" }
    );
    match config.pubsub.key {
        Some(_) => println!(
            "Pub/sub:     channel '{}' event '{}'",
            config.pubsub.channel, config.pubsub.event
        ),
        None => println!("Pub/sub:     disabled (no key)"),
    }
    println!("Reconcile:   {:?}", config.reconcile);

    let client = ApiClient::new(config)?;
    match coordinator_contacts(&client, config).await {
        Ok(contacts) => println!("Backend:     reachable ({} contacts)", contacts.len()),
        Err(e) => println!("Backend:     error: {:#}", e),
    }

    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let socket = SocketClient::spawn(&config.socket_url, events_tx)?;
    let up = socket.wait_connected(Duration::from_secs(5)).await;
    socket.close().await;
    println!("Socket:      {}", if up { "connected" } else { "unreachable" });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_contact() {
        let contacts = vec![
            Contact::new("10", "Ana Souza"),
            Contact::new("11", "Anabela Lima"),
            Contact::new("12", "Bruno"),
        ];
        assert_eq!(resolve_contact(&contacts, "12").unwrap().name, "Bruno");
        assert_eq!(resolve_contact(&contacts, "bruno").unwrap().id, "12");
        assert_eq!(resolve_contact(&contacts, "souza").unwrap().id, "10");
        assert!(resolve_contact(&contacts, "ana").is_err());
        assert!(resolve_contact(&contacts, "zé").is_err());
    }
}
