//! Configuration storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::chat::{ReconcilePolicy, Session};

/// Pusher-protocol notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Application key. Without it the notification channel is disabled.
    pub key: Option<String>,
    /// Cluster name, used to build `ws-{cluster}.pusher.com`.
    pub cluster: Option<String>,
    /// Full WebSocket origin for self-hosted servers (overrides cluster).
    pub host: Option<String>,
    /// Channel subscribed to at startup.
    pub channel: String,
    /// Event name that signals a new message.
    pub event: String,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            key: None,
            cluster: None,
            host: None,
            channel: "chat".to_string(),
            event: "newMessage".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST backend base URL
    pub api_base_url: String,
    /// Socket.IO origin used for real-time fan-out
    pub socket_url: String,
    /// Identifier of the logged-in coordinator
    pub coordinator_id: Option<String>,
    /// Bearer token attached to REST calls
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Extra attempts for idempotent GET requests
    pub request_retries: u32,
    pub poll_interval_secs: u64,
    pub contacts_page_size: u32,
    pub messages_page_size: u32,
    /// How fetched conversations are folded into the local view
    pub reconcile: ReconcilePolicy,
    pub pubsub: PubSubConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            socket_url: "http://localhost:3001".to_string(),
            coordinator_id: None,
            auth_token: None,
            request_timeout_secs: 15,
            request_retries: 2,
            poll_interval_secs: 5,
            contacts_page_size: 1000,
            messages_page_size: 100,
            reconcile: ReconcilePolicy::default(),
            pubsub: PubSubConfig::default(),
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "supervisor-chat", "supervisor-chat")
            .context("Could not determine config directory")
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for the TUI log file
    pub fn data_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Contains the bearer token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Session for the logged-in coordinator.
    pub fn session(&self) -> Result<Session> {
        let coordinator_id = self
            .coordinator_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .context("No coordinator configured. Run 'supervisor-chat configure --coordinator <id>'.")?;
        Ok(Session { coordinator_id })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Apply the fields set in `update`. Returns whether anything changed.
    pub fn apply(&mut self, update: ConfigUpdate) -> bool {
        fn set<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
            match value {
                Some(v) if *slot != v => {
                    *slot = v;
                    true
                }
                _ => false,
            }
        }

        let mut changed = false;
        changed |= set(&mut self.api_base_url, update.api_url);
        changed |= set(&mut self.socket_url, update.socket_url);
        changed |= set(&mut self.coordinator_id, update.coordinator.map(Some));
        changed |= set(&mut self.auth_token, update.token.map(Some));
        changed |= set(&mut self.reconcile, update.reconcile);
        changed |= set(&mut self.pubsub.key, update.pusher_key.map(Some));
        changed |= set(&mut self.pubsub.cluster, update.pusher_cluster.map(Some));
        changed |= set(&mut self.pubsub.host, update.pusher_host.map(Some));
        changed |= set(&mut self.pubsub.channel, update.channel);
        changed
    }
}

/// Values given to `configure`; `None` leaves a setting untouched.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub api_url: Option<String>,
    pub socket_url: Option<String>,
    pub coordinator: Option<String>,
    pub token: Option<String>,
    pub reconcile: Option<ReconcilePolicy>,
    pub pusher_key: Option<String>,
    pub pusher_cluster: Option<String>,
    pub pusher_host: Option<String>,
    pub channel: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            coordinator_id = "C1"
            reconcile = "replace"

            [pubsub]
            key = "abc"
            cluster = "sa1"
            "#,
        )
        .unwrap();

        assert_eq!(config.coordinator_id.as_deref(), Some("C1"));
        assert_eq!(config.reconcile, ReconcilePolicy::Replace);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.pubsub.channel, "chat");
        assert_eq!(config.pubsub.event, "newMessage");
        assert_eq!(config.pubsub.key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_session_requires_coordinator() {
        let mut config = Config::default();
        assert!(config.session().is_err());

        config.coordinator_id = Some("  ".to_string());
        assert!(config.session().is_err());

        config.coordinator_id = Some("C1".to_string());
        assert_eq!(config.session().unwrap().coordinator_id, "C1");
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.auth_token = Some("tok".to_string());
        config.reconcile = ReconcilePolicy::Replace;
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.auth_token.as_deref(), Some("tok"));
        assert_eq!(back.reconcile, ReconcilePolicy::Replace);
    }

    #[test]
    fn test_apply_only_touches_given_fields() {
        let mut config = Config::default();
        let changed = config.apply(ConfigUpdate {
            coordinator: Some("C9".to_string()),
            pusher_key: Some("k".to_string()),
            ..ConfigUpdate::default()
        });
        assert!(changed);
        assert_eq!(config.coordinator_id.as_deref(), Some("C9"));
        assert_eq!(config.pubsub.key.as_deref(), Some("k"));
        assert_eq!(config.api_base_url, Config::default().api_base_url);

        let again = config.apply(ConfigUpdate {
            coordinator: Some("C9".to_string()),
            ..ConfigUpdate::default()
        });
        assert!(!again);
    }
}
