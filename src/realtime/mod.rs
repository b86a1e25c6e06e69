//! Push transports: the Socket.IO fan-out connection and the Pusher
//! notification channel.
//!
//! Both clients own a spawned connection task that reconnects with
//! exponential backoff (1s, 2s, 4s, ... capped at 64s). A transport that
//! cannot connect logs once and keeps retrying quietly; the rest of the
//! app sees it only as `connected() == false`.

pub mod pusher;
pub mod socket;
pub mod socketio;
pub mod websocket;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::models::Message;

pub use pusher::PubSubClient;
pub use socket::SocketClient;

/// Content-free "something changed" signal from the pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub event: String,
}

/// Event received on the Socket.IO connection.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A `sendMessage` fan-out carrying a persisted message.
    Message(Message),
    /// Any other event name.
    Other { name: String },
}

/// Reset backoff after a connection stayed up this long.
pub(crate) const STABLE_SESSION: Duration = Duration::from_secs(60);
const MAX_BACKOFF_SECS: u64 = 64;

/// Exponential reconnect delay.
#[derive(Debug)]
pub(crate) struct Backoff {
    secs: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self { secs: 1 }
    }

    /// Delay to wait now; doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.secs);
        self.secs = (self.secs * 2).min(MAX_BACKOFF_SECS);
        delay
    }

    /// Start over after a stable session.
    pub fn session_ended(&mut self, lasted: Duration) {
        if lasted >= STABLE_SESSION {
            self.secs = 1;
        }
    }
}

/// Resolve once `stop` carries `true` or its sender is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// How a single connection session ended.
pub(crate) enum SessionEnd {
    /// Shutdown requested; do not reconnect.
    Shutdown,
    /// The server went away; reconnect after backoff.
    Closed(String),
}

/// Print socket events and notifications until Ctrl-C.
pub async fn listen(config: &Config) -> Result<()> {
    let (socket_tx, mut socket_rx) = mpsc::unbounded_channel();
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();

    let socket = SocketClient::spawn(&config.socket_url, socket_tx)?;
    let pubsub = PubSubClient::spawn(&config.pubsub, notify_tx)?;
    let mut socket_up = socket.connected();
    let mut notify_open = true;

    println!("Listening for events... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            event = socket_rx.recv() => match event {
                Some(SocketEvent::Message(m)) => {
                    println!(
                        "[MSG] {} -> {} ({}): {}",
                        m.sender_id,
                        m.receiver_id,
                        m.created_at.with_timezone(&chrono::Local).format("%H:%M:%S"),
                        m.content
                    );
                }
                Some(SocketEvent::Other { name }) => println!("[EVENT] {}", name),
                None => break,
            },
            note = notify_rx.recv(), if notify_open => match note {
                Some(n) => println!("[NOTIFY] {} on '{}'", n.event, n.channel),
                // Pub/sub disabled or given up; keep listening on the socket.
                None => notify_open = false,
            },
            changed = socket_up.changed() => {
                if changed.is_err() {
                    break;
                }
                let up = *socket_up.borrow_and_update();
                println!("[SOCKET] {}", if up { "connected" } else { "disconnected" });
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    socket.close().await;
    if let Some(pubsub) = pubsub {
        pubsub.close().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new();
        let secs: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 64, 64, 64]);
    }

    #[test]
    fn test_backoff_resets_after_stable_session() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.session_ended(Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        backoff.session_ended(Duration::from_secs(90));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stop_requested_on_flag_or_drop() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        stop_requested(&mut rx).await;

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        stop_requested(&mut rx).await;
    }
}
