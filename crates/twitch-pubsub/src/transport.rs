//! Transport seam between the connection actor and the socket.
//!
//! The actor only needs three things from a connection: send a text message,
//! receive the next complete text message, and close. Fragmented frames are
//! reassembled below this boundary; [`Transport::recv`] always yields whole
//! logical messages.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::debug;

use crate::error::{PubSubError, PubSubResult};

/// An established connection carrying whole text messages.
#[async_trait]
pub trait Transport: Send {
    /// Send one text message.
    async fn send(&mut self, text: String) -> PubSubResult<()>;

    /// Receive the next text message. `None` means the peer closed the
    /// stream; `Some(Err(_))` is a hard transport failure.
    async fn recv(&mut self) -> Option<PubSubResult<String>>;

    /// Close the connection. Errors during close are ignored.
    async fn close(&mut self);
}

/// Opens [`Transport`] connections. The connection actor calls this on every
/// (re)connect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    async fn connect(&self, url: &str) -> PubSubResult<Box<dyn Transport>>;
}

/// Default connector: a TLS WebSocket via `tokio-tungstenite`.
#[derive(Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> PubSubResult<Box<dyn Transport>> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| PubSubError::transport(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> PubSubResult<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PubSubError::transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<PubSubResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "server closed the connection");
                    return None;
                }
                // Protocol-level pings are answered by tungstenite itself;
                // the PubSub keepalive is an application-level envelope.
                Ok(_) => continue,
                Err(e) => return Some(Err(PubSubError::transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
