//! In-memory transport for driving the client without a socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use twitch_pubsub::{Connector, PubSubClient, PubSubConfig, PubSubError, PubSubResult, Transport};

/// Server side of one mock connection. Dropping it kills the link, which the
/// client observes as a lost connection.
pub struct ServerHandle {
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub to_client: mpsc::UnboundedSender<String>,
}

impl ServerHandle {
    /// Next frame sent by the client, parsed as JSON.
    pub async fn expect_frame(&mut self) -> serde_json::Value {
        let text = timeout(Duration::from_secs(3), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side of the link closed");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Expect a LISTEN/UNLISTEN frame; returns `(nonce, topic, auth_token)`.
    pub async fn expect_topic_request(&mut self, kind: &str) -> (String, String, String) {
        let frame = self.expect_frame().await;
        assert_eq!(frame["type"], kind, "unexpected frame: {frame}");
        let nonce = frame["nonce"].as_str().expect("nonce").to_owned();
        let topic = frame["data"]["topics"][0].as_str().expect("topic").to_owned();
        let auth = frame["data"]["auth_token"].as_str().expect("auth").to_owned();
        (nonce, topic, auth)
    }

    /// Send a RESPONSE envelope; empty `error` confirms the request.
    pub fn respond(&self, nonce: &str, error: &str) {
        self.send_raw(&format!(
            r#"{{"type":"RESPONSE","nonce":"{nonce}","error":"{error}"}}"#
        ));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.send(text.to_owned());
    }

    /// Assert the client sends nothing for `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(Some(frame)) = timeout(window, self.from_client.recv()).await {
            panic!("unexpected frame during silence window: {frame}");
        }
    }
}

/// Hands a fresh in-memory link to the client on every connect attempt and
/// the matching [`ServerHandle`] to the test.
#[derive(Clone)]
pub struct MockConnector {
    handles: mpsc::UnboundedSender<ServerHandle>,
    fail_remaining: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Make the next `n` connection attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }
}

/// Route client logs through the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn mock_link() -> (MockConnector, mpsc::UnboundedReceiver<ServerHandle>) {
    init_tracing();
    let (handles, handle_rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            handles,
            fail_remaining: Arc::new(AtomicUsize::new(0)),
        },
        handle_rx,
    )
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> PubSubResult<Box<dyn Transport>> {
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PubSubError::transport("connection refused"));
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        self.handles
            .send(ServerHandle {
                from_client: from_client_rx,
                to_client: to_client_tx,
            })
            .map_err(|_| PubSubError::transport("test dropped the handle channel"))?;
        Ok(Box::new(MockTransport {
            inbound: to_client_rx,
            outbound: from_client_tx,
        }))
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> PubSubResult<()> {
        self.outbound
            .send(text)
            .map_err(|_| PubSubError::transport("send on closed link"))
    }

    async fn recv(&mut self) -> Option<PubSubResult<String>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

/// Fast timings so reconnect-path tests finish quickly.
pub fn test_config() -> PubSubConfig {
    PubSubConfig::new()
        .url("wss://pubsub.test.invalid")
        .reconnect_floor(Duration::from_millis(10))
        .reconnect_ceiling(Duration::from_millis(40))
        .reconnect_jitter(Duration::ZERO)
        .ping_interval(Duration::from_secs(60))
        .ping_jitter(Duration::ZERO)
}

/// A connected client plus the server side of its first connection.
pub async fn connected_client(
    config: PubSubConfig,
) -> (
    PubSubClient,
    ServerHandle,
    MockConnector,
    mpsc::UnboundedReceiver<ServerHandle>,
) {
    let (connector, mut handle_rx) = mock_link();
    let client = PubSubClient::with_connector(config, connector.clone()).expect("valid config");
    client.add_channel("c1", "tok1").expect("valid channel");
    client.connect().await.expect("mock connect");
    let server = timeout(Duration::from_secs(3), handle_rx.recv())
        .await
        .expect("timed out waiting for the connection")
        .expect("connector dropped");
    (client, server, connector, handle_rx)
}

/// Await the next [`ServerHandle`], failing the test after a timeout.
pub async fn next_connection(
    handle_rx: &mut mpsc::UnboundedReceiver<ServerHandle>,
) -> ServerHandle {
    timeout(Duration::from_secs(3), handle_rx.recv())
        .await
        .expect("timed out waiting for a reconnection")
        .expect("connector dropped")
}
