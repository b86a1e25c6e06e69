//! WebSocket connection and text frame handling

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WsConnection {
    stream: WsStream,
}

impl WsConnection {
    /// Connect to a `ws://` or `wss://` endpoint.
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::debug!("Connecting WebSocket to {}", url);

        let (stream, response) = connect_async(url)
            .await
            .with_context(|| format!("WebSocket connection to {} failed", url))?;

        tracing::debug!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::trace!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next text frame, answering pings along the way.
    ///
    /// Returns `None` once the peer closes the connection.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::trace!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    /// Close the connection, ignoring errors from an already-dead peer.
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close: {:#}", e);
        }
    }
}

/// Rewrite an `http(s)://` origin into its `ws(s)://` form.
pub fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}
