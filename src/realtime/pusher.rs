//! Pusher (protocol 7) subscriber for the "new message" notification channel.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::websocket::WsConnection;
use super::{stop_requested, Backoff, Notification, SessionEnd, STABLE_SESSION};
use crate::config::PubSubConfig;

const PROTOCOL_VERSION: u32 = 7;
const DEFAULT_CLUSTER: &str = "mt1";
const DEFAULT_ACTIVITY_TIMEOUT: u64 = 120;
const PONG_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_GRACE: Duration = Duration::from_secs(2);
/// Shortest wait before a server-requested reconnect.
const RECONNECT_NOW_FLOOR: Duration = Duration::from_millis(500);
/// Consecutive server-requested reconnects before backing off anyway.
const MAX_IMMEDIATE_RECONNECTS: u32 = 3;

/// A frame as sent by the Pusher server.
#[derive(Debug, Deserialize)]
pub struct PusherFrame {
    pub event: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl PusherFrame {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse Pusher frame")
    }

    /// `data` is usually a JSON document encoded as a string.
    pub fn data_json(&self) -> Value {
        match &self.data {
            Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::String(s.clone())),
            Some(other) => other.clone(),
            None => Value::Null,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
    #[serde(default)]
    activity_timeout: Option<u64>,
}

/// How the session should react to a `pusher:error` code.
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorAction {
    /// 4000-4099: configuration problem, retrying will not help.
    GiveUp,
    /// 4200-4299: reconnect right away.
    ReconnectNow,
    /// Anything else: reconnect with backoff.
    Backoff,
}

pub fn error_action(code: Option<u64>) -> ErrorAction {
    match code {
        Some(4000..=4099) => ErrorAction::GiveUp,
        Some(4200..=4299) => ErrorAction::ReconnectNow,
        _ => ErrorAction::Backoff,
    }
}

pub fn subscribe_frame(channel: &str) -> String {
    json!({"event": "pusher:subscribe", "data": {"channel": channel}}).to_string()
}

fn ping_frame() -> String {
    json!({"event": "pusher:ping", "data": {}}).to_string()
}

fn pong_frame() -> String {
    json!({"event": "pusher:pong", "data": {}}).to_string()
}

/// Build the connection URL from `host` (if set) or `cluster`.
pub fn endpoint(config: &PubSubConfig) -> Result<Option<String>> {
    let Some(key) = config.key.as_deref().filter(|k| !k.trim().is_empty()) else {
        return Ok(None);
    };
    let origin = match config.host.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(host) if host.contains("://") => host.trim_end_matches('/').to_string(),
        Some(host) => format!("wss://{}", host.trim_end_matches('/')),
        None => format!(
            "wss://ws-{}.pusher.com",
            config.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER)
        ),
    };
    let mut url = url::Url::parse(&origin)
        .with_context(|| format!("Invalid pub/sub host: {}", origin))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Pub/sub host cannot carry a path: {}", origin))?
        .pop_if_empty()
        .extend(["app", key]);
    url.query_pairs_mut()
        .append_pair("protocol", &PROTOCOL_VERSION.to_string())
        .append_pair("client", env!("CARGO_PKG_NAME"))
        .append_pair("version", env!("CARGO_PKG_VERSION"))
        .append_pair("flash", "false");
    Ok(Some(url.to_string()))
}

/// Handle to the spawned subscription task.
pub struct PubSubClient {
    connected: watch::Receiver<bool>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PubSubClient {
    /// Subscribe in the background. Returns `None` when no app key is configured.
    pub fn spawn(
        config: &PubSubConfig,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Result<Option<Self>> {
        let Some(url) = endpoint(config)? else {
            tracing::warn!("Pub/sub key not configured; new-message notifications disabled");
            return Ok(None);
        };
        let (connected_tx, connected) = watch::channel(false);
        let (stop, stop_rx) = watch::channel(false);
        let target = Target {
            channel: config.channel.clone(),
            event: config.event.clone(),
        };
        let task = tokio::spawn(run(url, target, connected_tx, notifications, stop_rx));
        Ok(Some(Self {
            connected,
            stop,
            task: Mutex::new(Some(task)),
        }))
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Unsubscribe and wait for the task to finish. Later calls are no-ops.
    pub async fn close(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut task) = task else {
            return;
        };
        let _ = self.stop.send(true);
        tokio::select! {
            _ = &mut task => {}
            _ = time::sleep(CLOSE_GRACE) => task.abort(),
        }
        tracing::info!("Pub/sub subscription released");
    }
}

impl Drop for PubSubClient {
    fn drop(&mut self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

struct Target {
    channel: String,
    event: String,
}

/// Session outcome beyond the shared ones.
enum Ended {
    Session(SessionEnd),
    GiveUp(String),
    ReconnectNow(String),
}

async fn run(
    url: String,
    target: Target,
    connected_tx: watch::Sender<bool>,
    notifications: mpsc::UnboundedSender<Notification>,
    mut stop: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new();
    let mut immediate = 0u32;
    let mut warned = false;

    loop {
        let started = Instant::now();
        let outcome = session(&url, &target, &connected_tx, &notifications, &mut stop).await;
        if connected_tx.send_replace(false) {
            warned = false;
        }
        let lasted = started.elapsed();
        backoff.session_ended(lasted);
        if lasted >= STABLE_SESSION {
            immediate = 0;
        }

        let (reason, delay) = match outcome {
            Ok(Ended::Session(SessionEnd::Shutdown)) => return,
            Ok(Ended::GiveUp(reason)) => {
                tracing::error!("Pub/sub rejected the connection: {}. Giving up", reason);
                return;
            }
            Ok(Ended::ReconnectNow(reason)) => {
                (reason, reconnect_now_delay(&mut immediate, &mut backoff))
            }
            Ok(Ended::Session(SessionEnd::Closed(reason))) => {
                immediate = 0;
                (reason, backoff.next_delay())
            }
            Err(e) => {
                immediate = 0;
                (format!("{:#}", e), backoff.next_delay())
            }
        };

        if warned {
            tracing::debug!("Pub/sub unavailable: {}. Retrying in {:?}", reason, delay);
        } else {
            tracing::warn!("Pub/sub unavailable: {}. Retrying in {:?}", reason, delay);
            warned = true;
        }

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = stop_requested(&mut stop) => return,
        }
    }
}

/// Honour a 4200-4299 close quickly, but fall back to the backoff when the
/// server keeps asking.
fn reconnect_now_delay(streak: &mut u32, backoff: &mut Backoff) -> Duration {
    *streak += 1;
    if *streak > MAX_IMMEDIATE_RECONNECTS {
        backoff.next_delay().max(RECONNECT_NOW_FLOOR)
    } else {
        RECONNECT_NOW_FLOOR
    }
}

async fn session(
    url: &str,
    target: &Target,
    connected_tx: &watch::Sender<bool>,
    notifications: &mpsc::UnboundedSender<Notification>,
    stop: &mut watch::Receiver<bool>,
) -> Result<Ended> {
    let mut ws = tokio::select! {
        ws = WsConnection::connect(url) => ws?,
        _ = stop_requested(stop) => return Ok(Ended::Session(SessionEnd::Shutdown)),
    };

    let mut activity = Duration::from_secs(DEFAULT_ACTIVITY_TIMEOUT);
    let mut idle = Box::pin(time::sleep(activity));
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            frame = ws.recv_text() => {
                let Some(text) = frame? else {
                    return Ok(Ended::Session(SessionEnd::Closed("closed by server".to_string())));
                };
                awaiting_pong = false;
                idle.as_mut().reset(Instant::now() + activity);

                let frame = match PusherFrame::parse(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::debug!("{:#}: {}", e, text);
                        continue;
                    }
                };
                match frame.event.as_str() {
                    "pusher:connection_established" => {
                        let info: ConnectionEstablished = serde_json::from_value(frame.data_json())
                            .context("Malformed connection_established")?;
                        if let Some(secs) = info.activity_timeout.filter(|s| *s > 0) {
                            activity = Duration::from_secs(secs);
                            idle.as_mut().reset(Instant::now() + activity);
                        }
                        tracing::debug!("Pub/sub socket {} established", info.socket_id);
                        ws.send_text(&subscribe_frame(&target.channel)).await?;
                    }
                    "pusher_internal:subscription_succeeded" => {
                        tracing::info!("Subscribed to pub/sub channel '{}'", target.channel);
                        let _ = connected_tx.send(true);
                    }
                    "pusher:ping" => ws.send_text(&pong_frame()).await?,
                    "pusher:pong" => {}
                    "pusher:error" => {
                        let data = frame.data_json();
                        let code = data.get("code").and_then(|c| c.as_u64());
                        let message = data
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown error");
                        let reason = format!("{} (code {:?})", message, code);
                        match error_action(code) {
                            ErrorAction::GiveUp => return Ok(Ended::GiveUp(reason)),
                            ErrorAction::ReconnectNow => return Ok(Ended::ReconnectNow(reason)),
                            ErrorAction::Backoff => {
                                return Ok(Ended::Session(SessionEnd::Closed(reason)));
                            }
                        }
                    }
                    _ => {
                        if let Some(note) = notification_for(&frame, target) {
                            if notifications.send(note).is_err() {
                                tracing::debug!("Notification dropped: no listener");
                            }
                        } else {
                            tracing::trace!("Pub/sub event {} ignored", frame.event);
                        }
                    }
                }
            }
            _ = &mut idle => {
                if awaiting_pong {
                    bail!("No pong within {:?}", PONG_TIMEOUT);
                }
                ws.send_text(&ping_frame()).await?;
                awaiting_pong = true;
                idle.as_mut().reset(Instant::now() + PONG_TIMEOUT);
            }
            _ = stop_requested(stop) => {
                ws.close().await;
                return Ok(Ended::Session(SessionEnd::Shutdown));
            }
        }
    }
}

fn notification_for(frame: &PusherFrame, target: &Target) -> Option<Notification> {
    let channel = frame.channel.as_deref()?;
    (channel == target.channel && frame.event == target.event).then(|| Notification {
        channel: channel.to_string(),
        event: frame.event.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubsub(key: Option<&str>, host: Option<&str>) -> PubSubConfig {
        PubSubConfig {
            key: key.map(String::from),
            host: host.map(String::from),
            cluster: Some("sa1".to_string()),
            ..PubSubConfig::default()
        }
    }

    #[test]
    fn test_endpoint_from_cluster_and_host() {
        assert_eq!(endpoint(&pubsub(None, None)).unwrap(), None);
        assert_eq!(endpoint(&pubsub(Some(" "), None)).unwrap(), None);

        let url = endpoint(&pubsub(Some("abc123"), None)).unwrap().unwrap();
        assert!(url.starts_with("wss://ws-sa1.pusher.com/app/abc123?protocol=7&client="));
        assert!(url.ends_with("&flash=false"));

        let url = endpoint(&pubsub(Some("k"), Some("ws://localhost:6001")))
            .unwrap()
            .unwrap();
        assert!(url.starts_with("ws://localhost:6001/app/k?protocol=7"));
    }

    #[test]
    fn test_connection_established_data_is_string_encoded() {
        let frame = PusherFrame::parse(
            r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"123.456\",\"activity_timeout\":30}"}"#,
        )
        .unwrap();
        let info: ConnectionEstablished = serde_json::from_value(frame.data_json()).unwrap();
        assert_eq!(info.socket_id, "123.456");
        assert_eq!(info.activity_timeout, Some(30));
    }

    #[test]
    fn test_only_configured_event_notifies() {
        let target = Target {
            channel: "chat".to_string(),
            event: "newMessage".to_string(),
        };
        let hit = PusherFrame::parse(r#"{"event":"newMessage","channel":"chat","data":"{}"}"#)
            .unwrap();
        let other_channel =
            PusherFrame::parse(r#"{"event":"newMessage","channel":"map","data":"{}"}"#).unwrap();
        let other_event =
            PusherFrame::parse(r#"{"event":"typing","channel":"chat"}"#).unwrap();

        assert_eq!(
            notification_for(&hit, &target),
            Some(Notification {
                channel: "chat".to_string(),
                event: "newMessage".to_string(),
            })
        );
        assert!(notification_for(&other_channel, &target).is_none());
        assert!(notification_for(&other_event, &target).is_none());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(error_action(Some(4001)), ErrorAction::GiveUp);
        assert_eq!(error_action(Some(4201)), ErrorAction::ReconnectNow);
        assert_eq!(error_action(Some(4100)), ErrorAction::Backoff);
        assert_eq!(error_action(None), ErrorAction::Backoff);
    }

    #[test]
    fn test_repeated_reconnect_requests_back_off() {
        let mut streak = 0;
        let mut backoff = Backoff::new();
        for _ in 0..MAX_IMMEDIATE_RECONNECTS {
            assert_eq!(
                reconnect_now_delay(&mut streak, &mut backoff),
                RECONNECT_NOW_FLOOR
            );
        }
        assert_eq!(
            reconnect_now_delay(&mut streak, &mut backoff),
            Duration::from_secs(1)
        );
        assert_eq!(
            reconnect_now_delay(&mut streak, &mut backoff),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_subscribe_frame() {
        let v: Value = serde_json::from_str(&subscribe_frame("chat")).unwrap();
        assert_eq!(v["event"], "pusher:subscribe");
        assert_eq!(v["data"]["channel"], "chat");
    }
}
