//! Transport abstraction and the WebSocket implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use pickr_core::error::{AppError, ErrorKind};
use pickr_core::result::AppResult;

/// One open, text-framed duplex stream.
#[async_trait]
pub trait TransportStream: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> AppResult<()>;

    /// Read the next text frame. `Ok(None)` means the peer closed the stream.
    async fn recv(&mut self) -> AppResult<Option<String>>;

    /// Close the stream. Errors are ignored.
    async fn close(&mut self);
}

/// Opens transport streams. One call per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream to `url`.
    async fn connect(&self, url: &Url) -> AppResult<Box<dyn TransportStream>>;
}

/// [`Connector`] over plain WebSockets.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// Upper bound for the TCP + upgrade handshake.
    handshake_timeout: Duration,
}

impl WsConnector {
    /// Create a new connector.
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> AppResult<Box<dyn TransportStream>> {
        let attempt = tokio::time::timeout(self.handshake_timeout, connect_async(url.as_str()));
        let (ws, response) = attempt
            .await
            .map_err(|_| AppError::timeout(format!("WebSocket handshake to {url} timed out")))?
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Transport,
                    format!("WebSocket connect to {url} failed: {e}"),
                    e,
                )
            })?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket upgraded");
        Ok(Box::new(WsStream { ws }))
    }
}

/// [`TransportStream`] over a tungstenite socket.
struct WsStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportStream for WsStream {
    async fn send(&mut self, text: String) -> AppResult<()> {
        self.ws
            .send(Message::text(text))
            .await
            .map_err(|e| AppError::transport(format!("WebSocket send failed: {e}")))
    }

    async fn recv(&mut self) -> AppResult<Option<String>> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return Ok(None),
                // Control frames are answered by tungstenite; binary frames are not used.
                Ok(_) => continue,
                Err(e) => {
                    return Err(AppError::transport(format!("WebSocket receive failed: {e}")));
                }
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
