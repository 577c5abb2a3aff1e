//! User-facing client API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::actor::{Command, ConnectionActor, ConnectionStatus};
use crate::auth::TokenRefresher;
use crate::config::PubSubConfig;
use crate::dispatch::TopicRouter;
use crate::error::{PubSubError, PubSubResult};
use crate::events::{ClientEvent, EventBus, Warning};
use crate::points::{self, PayloadEnvelope, RedemptionEvent, RewardRedeemed};
use crate::session::{Channel, SessionState, TopicEntry};
use crate::transport::{Connector, WsConnector};

/// Client for a PubSub edge server.
///
/// The client maintains one long-lived WebSocket connection in a background
/// task, keeps it alive with PING/PONG, reconnects with backoff, and
/// re-establishes confirmed topics after every reconnect. Handles are cheap
/// to clone and share; the background task stops when the last handle is
/// dropped.
///
/// # Example
///
/// ```rust,ignore
/// let client = PubSubClient::new(PubSubConfig::new())?;
/// client.add_channel("30515034", "oauth-token")?;
/// client.connect().await?;
///
/// let mut redemptions = client.redemptions();
/// client.listen_channel_points("30515034").await?;
///
/// while let Ok(event) = redemptions.recv().await {
///     println!("{} redeemed {}", event.redemption.redemption.user.login,
///         event.redemption.redemption.reward.title);
/// }
/// ```
#[derive(Clone)]
pub struct PubSubClient {
    cmd_tx: mpsc::Sender<Command>,
    session: Arc<SessionState>,
    events: EventBus,
    router: Arc<TopicRouter>,
    refresher: Arc<RwLock<Option<Arc<dyn TokenRefresher>>>>,
    should_connect: Arc<AtomicBool>,
    status_rx: watch::Receiver<ConnectionStatus>,
    redemption_tx: broadcast::Sender<RedemptionEvent>,
}

impl PubSubClient {
    /// Create a client for the configured endpoint and spawn its background
    /// task. Must be called within a Tokio runtime.
    pub fn new(config: PubSubConfig) -> PubSubResult<Self> {
        Self::with_connector(config, WsConnector)
    }

    /// Create a client with a custom [`Connector`]. Used to drive the client
    /// over transports other than the default TLS WebSocket, e.g. in tests.
    pub fn with_connector(
        config: PubSubConfig,
        connector: impl Connector,
    ) -> PubSubResult<Self> {
        config.validate().map_err(PubSubError::config)?;
        let config = Arc::new(config);

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Idle);
        let (redemption_tx, _) = broadcast::channel(config.event_channel_capacity);
        let session = Arc::new(SessionState::new());
        let events = EventBus::new(config.event_channel_capacity);
        let router = Arc::new(TopicRouter::new());
        let refresher: Arc<RwLock<Option<Arc<dyn TokenRefresher>>>> =
            Arc::new(RwLock::new(None));
        let should_connect = Arc::new(AtomicBool::new(false));

        register_channel_points_route(&router, &events, &redemption_tx);

        let actor = ConnectionActor::new(
            Arc::clone(&config),
            Arc::new(connector),
            Arc::clone(&session),
            events.clone(),
            Arc::clone(&router),
            Arc::clone(&refresher),
            Arc::clone(&should_connect),
            status_tx,
            cmd_tx.clone(),
            cmd_rx,
        );
        tokio::spawn(actor.run());

        Ok(Self {
            cmd_tx,
            session,
            events,
            router,
            refresher,
            should_connect,
            status_rx,
            redemption_tx,
        })
    }

    // -- channels ------------------------------------------------------------

    /// Add a channel, or update its auth token if it is already registered.
    pub fn add_channel(&self, channel_id: &str, auth: &str) -> PubSubResult<()> {
        if channel_id.is_empty() {
            return Err(PubSubError::InvalidArgument("channel_id must be non-empty"));
        }
        if auth.is_empty() {
            return Err(PubSubError::InvalidArgument("auth token must be non-empty"));
        }
        if self.session.upsert_channel(channel_id, auth) {
            debug!(channel = channel_id, "channel added");
        } else {
            debug!(channel = channel_id, "channel auth updated");
        }
        Ok(())
    }

    /// Remove a channel's bookkeeping. Returns whether it existed. Topics
    /// already confirmed on the server keep streaming until unlistened.
    pub fn remove_channel(&self, channel_id: &str) -> bool {
        let removed = self.session.remove_channel(channel_id);
        if removed {
            debug!(channel = channel_id, "channel removed");
        }
        removed
    }

    /// Channels currently registered with the client.
    pub fn channels(&self) -> Vec<Channel> {
        self.session.channels()
    }

    /// Topics the server has confirmed as active.
    pub fn topics(&self) -> Vec<TopicEntry> {
        self.session.topics()
    }

    // -- lifecycle -----------------------------------------------------------

    /// Mark the client as wanting a connection without opening one yet; the
    /// first `listen` call connects.
    pub fn delayed_connect(&self) {
        self.should_connect.store(true, Ordering::SeqCst);
    }

    /// Connect to the server, waiting for the first successful connection.
    ///
    /// Fails with [`PubSubError::Cancelled`] if [`disconnect`](Self::disconnect)
    /// is called before a connection is established.
    pub async fn connect(&self) -> PubSubResult<()> {
        self.should_connect.store(true, Ordering::SeqCst);
        self.cmd_tx
            .send(Command::Connect)
            .await
            .map_err(|_| PubSubError::Closed)?;
        self.await_connected().await
    }

    /// Disconnect and stop reconnecting. Pending listen/unlisten futures
    /// resolve as cancelled. The client can connect again afterwards.
    pub async fn disconnect(&self) {
        self.should_connect.store(false, Ordering::SeqCst);
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        if self.cmd_tx.send(Command::Disconnect { ack: ack_tx }).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        *self.status_rx.borrow() == ConnectionStatus::Connected
    }

    async fn await_connected(&self) -> PubSubResult<()> {
        let mut status_rx = self.status_rx.clone();
        loop {
            if *status_rx.borrow_and_update() == ConnectionStatus::Connected {
                return Ok(());
            }
            if !self.should_connect.load(Ordering::SeqCst) {
                return Err(PubSubError::Cancelled);
            }
            if status_rx.changed().await.is_err() {
                return Err(PubSubError::Closed);
            }
        }
    }

    // -- topics --------------------------------------------------------------

    /// Subscribe to a topic on a channel.
    ///
    /// Requires [`connect`](Self::connect) or
    /// [`delayed_connect`](Self::delayed_connect) to have been called and the
    /// channel to be registered; connects first if no connection is up yet.
    /// Resolves once the server confirms, or fails with the server's
    /// rejection. Dropping the future abandons the wait without un-sending
    /// the request.
    pub async fn listen(&self, channel_id: &str, topic: &str) -> PubSubResult<()> {
        self.edit_topic(channel_id, topic, true).await
    }

    /// Unsubscribe from a topic on a channel. Same preconditions as
    /// [`listen`](Self::listen).
    pub async fn unlisten(&self, channel_id: &str, topic: &str) -> PubSubResult<()> {
        self.edit_topic(channel_id, topic, false).await
    }

    /// Subscribe to the channel points topic of a channel.
    pub async fn listen_channel_points(&self, channel_id: &str) -> PubSubResult<()> {
        self.listen(channel_id, &points::channel_points_topic(channel_id))
            .await
    }

    /// Unsubscribe from the channel points topic of a channel.
    pub async fn unlisten_channel_points(&self, channel_id: &str) -> PubSubResult<()> {
        self.unlisten(channel_id, &points::channel_points_topic(channel_id))
            .await
    }

    async fn edit_topic(&self, channel_id: &str, topic: &str, is_listen: bool) -> PubSubResult<()> {
        if topic.is_empty() {
            return Err(PubSubError::InvalidArgument("topic must be non-empty"));
        }
        if !self.should_connect.load(Ordering::SeqCst) {
            return Err(PubSubError::NotStarted);
        }
        if self.session.channel_auth(channel_id).is_none() {
            return Err(PubSubError::UnknownChannel {
                channel_id: channel_id.to_owned(),
            });
        }
        if !self.is_connected() {
            self.cmd_tx
                .send(Command::Connect)
                .await
                .map_err(|_| PubSubError::Closed)?;
            self.await_connected().await?;
        }

        // Snapshot the auth after the connection is up; a refresh may have
        // landed while we waited.
        let auth = self
            .session
            .channel_auth(channel_id)
            .ok_or_else(|| PubSubError::UnknownChannel {
                channel_id: channel_id.to_owned(),
            })?;
        let (nonce, completion) = self.session.add_pending(channel_id, &auth, topic, is_listen);
        self.cmd_tx
            .send(Command::Dispatch { nonce })
            .await
            .map_err(|_| PubSubError::Closed)?;

        match completion.await {
            Ok(result) => result,
            Err(_) => Err(PubSubError::Cancelled),
        }
    }

    // -- hooks and events ----------------------------------------------------

    /// Register the handler invoked after an `ERR_BADAUTH` response to obtain
    /// a new token and retry the request once.
    pub fn set_token_refresher(&self, refresher: impl TokenRefresher + 'static) {
        *self.refresher.write() = Some(Arc::new(refresher));
    }

    /// Subscribe to lifecycle, message, and warning events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Subscribe to decoded channel points redemptions.
    pub fn redemptions(&self) -> broadcast::Receiver<RedemptionEvent> {
        self.redemption_tx.subscribe()
    }

    /// Register a payload handler for a topic prefix. The handler receives
    /// the full topic line and the raw payload of every matching MESSAGE.
    pub fn on_topic_prefix(
        &self,
        prefix: impl Into<String>,
        handler: impl Fn(&str, &str) + Send + Sync + 'static,
    ) {
        self.router.register(prefix, Box::new(handler));
    }
}

/// Built-in decoder for the channel points topic family.
fn register_channel_points_route(
    router: &TopicRouter,
    events: &EventBus,
    redemption_tx: &broadcast::Sender<RedemptionEvent>,
) {
    let events = events.clone();
    let redemption_tx = redemption_tx.clone();
    router.register(
        points::CHANNEL_POINTS_PREFIX,
        Box::new(move |topic, payload| {
            match serde_json::from_str::<PayloadEnvelope<RewardRedeemed>>(payload) {
                Ok(envelope) => {
                    let _ = redemption_tx.send(RedemptionEvent {
                        topic: topic.to_owned(),
                        redemption: envelope.data,
                    });
                }
                Err(e) => {
                    events.emit(ClientEvent::Warning(Warning::Decode {
                        detail: format!("channel points payload: {e}"),
                    }));
                }
            }
        }),
    );
}
