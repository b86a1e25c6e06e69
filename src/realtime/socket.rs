//! Socket.IO client used for real-time message fan-out.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::socketio::{self, Packet};
use super::websocket::{to_ws_scheme, WsConnection};
use super::{stop_requested, Backoff, SessionEnd, SocketEvent};
use crate::api::wire;
use crate::chat::MessageFanout;
use crate::models::Message;

/// Event name used for message fan-out in both directions.
pub const SEND_MESSAGE_EVENT: &str = "sendMessage";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

struct Outgoing {
    frame: String,
    written: oneshot::Sender<Result<()>>,
}

/// Handle to the spawned Socket.IO connection task.
pub struct SocketClient {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    connected: watch::Receiver<bool>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketClient {
    /// Start connecting to `origin` in the background.
    ///
    /// Incoming events are forwarded on `events`.
    pub fn spawn(origin: &str, events: mpsc::UnboundedSender<SocketEvent>) -> Result<Self> {
        let url = endpoint(origin)?;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);
        let (stop, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run(url, outgoing_rx, connected_tx, events, stop_rx));

        Ok(Self {
            outgoing,
            connected,
            stop,
            task: Mutex::new(Some(task)),
        })
    }

    /// Connectivity updates.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Wait until the namespace is connected, up to `limit`.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut rx = self.connected.clone();
        let wait = async {
            loop {
                if *rx.borrow_and_update() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        time::timeout(limit, wait).await.unwrap_or(false)
    }

    /// Emit an event; resolves once the frame was written to the socket.
    pub async fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        if !*self.connected.borrow() {
            bail!("Socket is not connected");
        }
        let (written, done) = oneshot::channel();
        self.outgoing
            .send(Outgoing {
                frame: socketio::encode_event(event, payload),
                written,
            })
            .map_err(|_| anyhow!("Socket task has stopped"))?;
        done.await.map_err(|_| anyhow!("Socket task has stopped"))?
    }

    /// Disconnect and wait for the connection task to finish.
    ///
    /// Later calls are no-ops.
    pub async fn close(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut task) = task else {
            return;
        };
        let _ = self.stop.send(true);
        tokio::select! {
            _ = &mut task => {}
            _ = time::sleep(CLOSE_GRACE) => {
                tracing::debug!("Socket task did not stop in time, aborting");
                task.abort();
            }
        }
        tracing::info!("Socket closed");
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

#[async_trait]
impl MessageFanout for SocketClient {
    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn emit_message(&self, message: &Message) -> Result<()> {
        self.emit(SEND_MESSAGE_EVENT, &wire::to_wire_json(message))
            .await
    }
}

/// Build the WebSocket transport URL for a Socket.IO origin.
pub fn endpoint(origin: &str) -> Result<String> {
    let mut url = url::Url::parse(&to_ws_scheme(origin.trim()))
        .with_context(|| format!("Invalid socket URL: {}", origin))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("Unsupported socket URL scheme: {}", url.scheme());
    }
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url.to_string())
}

async fn run(
    url: String,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    connected_tx: watch::Sender<bool>,
    events: mpsc::UnboundedSender<SocketEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new();
    let mut warned = false;

    loop {
        let started = Instant::now();
        let outcome = session(&url, &mut outgoing_rx, &connected_tx, &events, &mut stop).await;
        let was_connected = connected_tx.send_replace(false);

        // Frames queued while the session died will never be written.
        while let Ok(pending) = outgoing_rx.try_recv() {
            let _ = pending.written.send(Err(anyhow!("Socket disconnected")));
        }

        let reason = match outcome {
            Ok(SessionEnd::Shutdown) => return,
            Ok(SessionEnd::Closed(reason)) => reason,
            Err(e) => format!("{:#}", e),
        };
        if was_connected {
            warned = false;
        }
        backoff.session_ended(started.elapsed());
        let delay = backoff.next_delay();

        if warned {
            tracing::debug!("Socket unavailable: {}. Retrying in {:?}", reason, delay);
        } else {
            tracing::warn!("Socket unavailable: {}. Retrying in {:?}", reason, delay);
            warned = true;
        }

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = stop_requested(&mut stop) => return,
        }
    }
}

/// One connection: handshake, namespace connect, then the event loop.
async fn session(
    url: &str,
    outgoing_rx: &mut mpsc::UnboundedReceiver<Outgoing>,
    connected_tx: &watch::Sender<bool>,
    events: &mpsc::UnboundedSender<SocketEvent>,
    stop: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let mut ws = tokio::select! {
        ws = WsConnection::connect(url) => ws?,
        _ = stop_requested(stop) => return Ok(SessionEnd::Shutdown),
    };

    let handshake = time::timeout(CONNECT_TIMEOUT, handshake(&mut ws))
        .await
        .context("Socket.IO handshake timed out")??;

    tracing::info!("Socket connected (sid={})", handshake.sid);
    let _ = connected_tx.send(true);

    let liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut ping_deadline = Box::pin(time::sleep(liveness));

    loop {
        tokio::select! {
            frame = ws.recv_text() => {
                let Some(text) = frame? else {
                    return Ok(SessionEnd::Closed("closed by server".to_string()));
                };
                match socketio::decode(&text) {
                    Ok(Packet::Ping) => {
                        ws.send_text(socketio::PONG).await?;
                        ping_deadline.as_mut().reset(Instant::now() + liveness);
                    }
                    Ok(Packet::Event { name, payload, .. }) => forward_event(events, name, payload),
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        return Ok(SessionEnd::Closed("disconnected by server".to_string()));
                    }
                    Ok(other) => tracing::trace!("Socket packet: {:?}", other),
                    Err(e) => tracing::debug!("Undecodable socket frame: {:#}", e),
                }
            }
            out = outgoing_rx.recv() => {
                let Some(out) = out else {
                    ws.close().await;
                    return Ok(SessionEnd::Shutdown);
                };
                match ws.send_text(&out.frame).await {
                    Ok(()) => {
                        let _ = out.written.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = out.written.send(Err(anyhow!("{:#}", e)));
                        return Err(e);
                    }
                }
            }
            _ = &mut ping_deadline => {
                bail!("No ping from server within {:?}", liveness);
            }
            _ = stop_requested(stop) => {
                ws.close().await;
                return Ok(SessionEnd::Shutdown);
            }
        }
    }
}

/// Read the open packet and join the default namespace.
async fn handshake(ws: &mut WsConnection) -> Result<socketio::Handshake> {
    let open = ws
        .recv_text()
        .await?
        .context("Connection closed before open packet")?;
    let Packet::Open(handshake) = socketio::decode(&open)? else {
        bail!("Expected open packet, got: {}", open);
    };

    ws.send_text(socketio::CONNECT).await?;

    loop {
        let frame = ws
            .recv_text()
            .await?
            .context("Connection closed before namespace connect")?;
        match socketio::decode(&frame)? {
            Packet::Connect => return Ok(handshake),
            Packet::ConnectError(message) => bail!("Socket.IO connect refused: {}", message),
            Packet::Ping => ws.send_text(socketio::PONG).await?,
            other => tracing::trace!("Ignoring {:?} before connect", other),
        }
    }
}

fn forward_event(events: &mpsc::UnboundedSender<SocketEvent>, name: String, payload: Value) {
    let event = if name == SEND_MESSAGE_EVENT {
        match wire::message_from_payload(payload) {
            Some(message) => SocketEvent::Message(message),
            None => return,
        }
    } else {
        SocketEvent::Other { name }
    };
    if events.send(event).is_err() {
        tracing::debug!("Socket event dropped: no listener");
    }
}
