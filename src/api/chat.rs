//! Chat endpoints (/chat)

use anyhow::{Context, Result};

use super::client::ApiClient;
use super::wire::{Page, WireMessage};
use crate::models::{sort_chronologically, DeliveryStatus, Message};

/// Messages sent from `from` to `to`, oldest first.
pub async fn fetch_direction_data(
    client: &ApiClient,
    from: &str,
    to: &str,
    size: u32,
) -> Result<Vec<Message>> {
    let url = client.url(&["chat", from, to], &[("size", size.to_string())])?;
    let page: Page<WireMessage> = client.get_json(&url).await?;
    let mut messages: Vec<Message> = page
        .into_items()
        .into_iter()
        .filter_map(|w| w.into_message(from, to))
        .collect();
    sort_chronologically(&mut messages);
    Ok(messages)
}

/// Both directions between `me` and `other`, fetched concurrently and merged.
pub async fn fetch_conversation_data(
    client: &ApiClient,
    me: &str,
    other: &str,
    size: u32,
) -> Result<Vec<Message>> {
    let (outgoing, incoming) = tokio::try_join!(
        fetch_direction_data(client, me, other, size),
        fetch_direction_data(client, other, me, size),
    )?;
    Ok(merge_directions(outgoing, incoming))
}

/// Concatenate both directions and order by creation time.
pub fn merge_directions(outgoing: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    let mut all = outgoing;
    all.extend(incoming);
    sort_chronologically(&mut all);
    all
}

/// Persist a message; returns the stored copy with its server id.
pub async fn send_message_data(
    client: &ApiClient,
    sender: &str,
    receiver: &str,
    text: &str,
) -> Result<Message> {
    let url = client.url(&["chat", "send", sender, receiver], &[])?;
    let body = serde_json::json!({ "message": text });

    tracing::debug!("Sending message to {}", url);
    let stored: WireMessage = client
        .post_json(&url, &body)
        .await
        .context("Failed to send message")?;

    let mut message = match stored.into_message(sender, receiver) {
        Some(m) => m,
        None => {
            tracing::warn!("Send response carried no message id; using a local id");
            Message::draft(sender, receiver, text)
        }
    };
    if message.content.is_empty() {
        message.content = text.to_string();
    }
    message.status = DeliveryStatus::Sent;
    Ok(message)
}
