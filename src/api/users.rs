//! User accounts endpoint (/user)

use anyhow::Result;
use serde::Deserialize;

use super::client::ApiClient;
use super::wire::{opt_id, Page};
use crate::models::{Contact, Presence};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    #[serde(deserialize_with = "opt_id", default)]
    id: Option<String>,
    #[serde(alias = "nome", alias = "fullName")]
    name: Option<String>,
    #[serde(alias = "photo", alias = "foto", alias = "avatarUrl")]
    avatar: Option<String>,
    #[serde(alias = "presence")]
    status: Option<String>,
    #[serde(deserialize_with = "opt_id", default)]
    mec_coordinator: Option<String>,
}

impl UserRecord {
    fn into_contact(self) -> Option<Contact> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(Contact {
            name: self.name.unwrap_or_else(|| id.clone()),
            avatar: self.avatar.filter(|a| !a.is_empty()),
            presence: self
                .status
                .as_deref()
                .map(Presence::from_status)
                .unwrap_or_default(),
            last_message: None,
            last_message_at: None,
            unread: 0,
            coordinator_id: self.mec_coordinator,
            id,
        })
    }
}

/// Fetch one page of user accounts as contacts (unfiltered).
pub async fn list_users_data(client: &ApiClient, size: u32) -> Result<Vec<Contact>> {
    let url = client.url(&["user"], &[("size", size.to_string())])?;
    let page: Page<UserRecord> = client.get_json(&url).await?;
    let records = page.into_items();
    let total = records.len();
    let contacts: Vec<Contact> = records
        .into_iter()
        .filter_map(UserRecord::into_contact)
        .collect();
    if contacts.len() < total {
        tracing::debug!("Skipped {} user records without id", total - contacts.len());
    }
    Ok(contacts)
}
