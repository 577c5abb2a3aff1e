//! Connection actor.
//!
//! A single background task owns the transport and every long-running
//! activity tied to it: the connect/reconnect loop with backoff, the
//! keepalive schedule, the receive loop, and response handling. The client
//! handle talks to it over an mpsc command channel; connection status is
//! published on a watch channel.
//!
//! Exactly one reconnect attempt is ever in flight because the actor is the
//! only task that connects; concurrent `connect()` callers all wait on the
//! same status watch. Failure-driven reconnects and explicit disconnects
//! cannot race for the same reason.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::auth::TokenRefresher;
use crate::backoff::Backoff;
use crate::config::PubSubConfig;
use crate::dispatch::TopicRouter;
use crate::error::{PubSubError, RejectCode};
use crate::events::{ClientEvent, EventBus, Warning};
use crate::session::{PendingRequest, SessionState};
use crate::transport::{Connector, Transport};
use crate::wire::{ClientFrame, ServerFrame};

/// Commands from the client handle to the actor.
pub(crate) enum Command {
    /// Start connecting (the should-be-connected flag is already set).
    Connect,
    /// Send the pending request registered under this nonce.
    Dispatch { nonce: String },
    /// Tear down the connection and stop reconnecting.
    Disconnect { ack: oneshot::Sender<()> },
}

/// Connection status published on the watch channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected and not trying to be.
    Idle,
    /// Establishing (or re-establishing) a connection.
    Connecting,
    /// A connection is up.
    Connected,
}

/// Why the connected loop ended.
enum ConnectedExit {
    /// The connection failed; reconnect if still wanted.
    Lost(String),
    /// Explicit disconnect; acknowledge after teardown.
    Disconnect(oneshot::Sender<()>),
    /// Every client handle is gone; shut down.
    ClientGone,
}

/// What to do after processing one inbound frame.
enum FrameOutcome {
    Continue,
    Reconnect,
    SendFailed(String),
}

pub(crate) struct ConnectionActor {
    config: Arc<PubSubConfig>,
    connector: Arc<dyn Connector>,
    session: Arc<SessionState>,
    events: EventBus,
    router: Arc<TopicRouter>,
    refresher: Arc<RwLock<Option<Arc<dyn TokenRefresher>>>>,
    should_connect: Arc<AtomicBool>,
    status_tx: watch::Sender<ConnectionStatus>,
    /// Kept so spawned refresh tasks can feed resends back through the
    /// command channel.
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: mpsc::Receiver<Command>,
    backoff: Backoff,
    pong_seen: bool,
}

impl ConnectionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<PubSubConfig>,
        connector: Arc<dyn Connector>,
        session: Arc<SessionState>,
        events: EventBus,
        router: Arc<TopicRouter>,
        refresher: Arc<RwLock<Option<Arc<dyn TokenRefresher>>>>,
        should_connect: Arc<AtomicBool>,
        status_tx: watch::Sender<ConnectionStatus>,
        cmd_tx: mpsc::Sender<Command>,
        cmd_rx: mpsc::Receiver<Command>,
    ) -> Self {
        let backoff = Backoff::new(
            config.reconnect_floor,
            config.reconnect_ceiling,
            config.reconnect_jitter,
        );
        Self {
            config,
            connector,
            session,
            events,
            router,
            refresher,
            should_connect,
            status_tx,
            cmd_tx,
            cmd_rx,
            backoff,
            pong_seen: false,
        }
    }

    fn wants_connection(&self) -> bool {
        self.should_connect.load(Ordering::SeqCst)
    }

    fn status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }

    /// Resolve every pending request as cancelled. Runs on disconnect and
    /// shutdown so no completion is left dangling.
    fn cancel_pending(&self) {
        for request in self.session.drain_pending() {
            request.resolve(Err(PubSubError::Cancelled));
        }
    }

    fn shutdown(&mut self) {
        debug!("all client handles dropped; actor shutting down");
        self.status(ConnectionStatus::Idle);
        self.cancel_pending();
    }

    /// Main entry point; runs until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        info!(url = %self.config.url, "starting pubsub connection actor");

        loop {
            if !self.wants_connection() {
                match self.cmd_rx.recv().await {
                    None => {
                        self.shutdown();
                        return;
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect { ack }) => {
                        self.cancel_pending();
                        let _ = ack.send(());
                    }
                    Some(Command::Dispatch { nonce }) => {
                        // Raced with a disconnect; nothing will answer it.
                        if let Some(request) = self.session.take_pending(&nonce) {
                            request.resolve(Err(PubSubError::Cancelled));
                        }
                    }
                }
                continue;
            }

            self.status(ConnectionStatus::Connecting);
            match self.connector.connect(&self.config.url).await {
                Ok(mut transport) => {
                    info!("connected");
                    self.status(ConnectionStatus::Connected);
                    self.events.emit(ClientEvent::Connected);
                    self.backoff.reset();

                    let exit = self.run_connected(&mut transport).await;
                    transport.close().await;
                    self.events.emit(ClientEvent::Disconnected);

                    match exit {
                        ConnectedExit::Lost(reason) => {
                            warn!(reason = %reason, "connection lost");
                            self.status(ConnectionStatus::Connecting);
                            self.events.emit(ClientEvent::Reconnecting);
                        }
                        ConnectedExit::Disconnect(ack) => {
                            info!("disconnected");
                            self.status(ConnectionStatus::Idle);
                            self.cancel_pending();
                            let _ = ack.send(());
                        }
                        ConnectedExit::ClientGone => {
                            self.shutdown();
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                    let delay = self.backoff.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
                    if !self.sleep_or_command(delay).await {
                        return;
                    }
                    if self.wants_connection() {
                        self.events.emit(ClientEvent::Reconnecting);
                    }
                }
            }
        }
    }

    /// Back off between attempts while staying responsive to commands.
    /// Returns `false` when the actor should exit entirely.
    async fn sleep_or_command(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    None => {
                        self.shutdown();
                        return false;
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect { ack }) => {
                        self.status(ConnectionStatus::Idle);
                        self.cancel_pending();
                        let _ = ack.send(());
                        return true;
                    }
                    // Left pending: it is resent (listen) or cancelled
                    // (unlisten) once a connection is re-established.
                    Some(Command::Dispatch { .. }) => {}
                }
            }
        }
    }

    /// The event loop while a connection is up.
    async fn run_connected(&mut self, transport: &mut Box<dyn Transport>) -> ConnectedExit {
        // Re-establish the server-side subscription state: confirmed topics
        // and still-pending listens go out again, pending unlistens are
        // resolved as cancelled.
        let plan = self.session.resubscribe_reset();
        for request in plan.cancelled {
            debug!(
                kind = request.kind(),
                channel = %request.channel_id,
                topic = %request.topic,
                "pending request dropped by reconnect"
            );
            request.resolve(Err(PubSubError::Cancelled));
        }
        for nonce in plan.resend {
            if let Err(reason) = self.send_pending(transport, &nonce).await {
                return ConnectedExit::Lost(reason);
            }
        }

        let mut keepalive = Keepalive::new(&self.config);
        self.pong_seen = false;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return ConnectedExit::ClientGone,
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect { ack }) => return ConnectedExit::Disconnect(ack),
                    Some(Command::Dispatch { nonce }) => {
                        if let Err(reason) = self.send_pending(transport, &nonce).await {
                            return ConnectedExit::Lost(reason);
                        }
                    }
                },
                received = transport.recv() => match received {
                    None => return ConnectedExit::Lost("connection closed by server".to_owned()),
                    Some(Err(e)) => return ConnectedExit::Lost(e.to_string()),
                    Some(Ok(text)) => match self.handle_frame(transport, &text).await {
                        FrameOutcome::Continue => {}
                        FrameOutcome::Reconnect => {
                            return ConnectedExit::Lost("server requested reconnect".to_owned());
                        }
                        FrameOutcome::SendFailed(reason) => return ConnectedExit::Lost(reason),
                    },
                },
                _ = tokio::time::sleep_until(keepalive.deadline) => match keepalive.phase {
                    PingPhase::Idle => {
                        self.pong_seen = false;
                        trace!("sending keepalive ping");
                        if let Err(e) = transport.send(ClientFrame::Ping.to_json()).await {
                            return ConnectedExit::Lost(e.to_string());
                        }
                        keepalive.await_pong();
                    }
                    PingPhase::AwaitingPong => {
                        if !self.pong_seen {
                            return ConnectedExit::Lost("no pong within the grace window".to_owned());
                        }
                        keepalive.schedule_next();
                    }
                },
            }
        }
    }

    /// Serialize and send the pending request registered under `nonce`.
    async fn send_pending(
        &mut self,
        transport: &mut Box<dyn Transport>,
        nonce: &str,
    ) -> Result<(), String> {
        let Some(out) = self.session.outbound(nonce) else {
            // Already resolved or cancelled; nothing to send.
            return Ok(());
        };
        let frame = ClientFrame::topic_request(out.is_listen, out.nonce, out.topic.clone(), out.auth);
        transport
            .send(frame.to_json())
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            kind = if out.is_listen { "LISTEN" } else { "UNLISTEN" },
            topic = %out.topic,
            "topic request sent"
        );
        Ok(())
    }

    async fn handle_frame(
        &mut self,
        transport: &mut Box<dyn Transport>,
        text: &str,
    ) -> FrameOutcome {
        trace!(message = text, "frame received");
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "undecodable frame");
                self.events.emit(ClientEvent::Warning(Warning::Decode {
                    detail: e.to_string(),
                }));
                return FrameOutcome::Continue;
            }
        };

        match frame {
            ServerFrame::Pong => {
                self.pong_seen = true;
                FrameOutcome::Continue
            }
            ServerFrame::Reconnect => {
                info!("server requested reconnect");
                FrameOutcome::Reconnect
            }
            ServerFrame::Response { nonce, error } => {
                self.handle_response(transport, nonce, error).await
            }
            ServerFrame::Message { data } => {
                if data.topic.is_empty() || data.message.is_empty() {
                    self.events.emit(ClientEvent::Warning(Warning::Decode {
                        detail: "MESSAGE frame missing topic or payload".to_owned(),
                    }));
                    return FrameOutcome::Continue;
                }
                self.events.emit(ClientEvent::Message {
                    topic: data.topic.clone(),
                    payload: data.message.clone(),
                });
                self.router.dispatch(&data.topic, &data.message);
                FrameOutcome::Continue
            }
            ServerFrame::Unknown => {
                warn!(message = text, "unknown message type");
                self.events.emit(ClientEvent::Warning(Warning::UnknownMessage {
                    raw: text.to_owned(),
                }));
                FrameOutcome::Continue
            }
        }
    }

    /// Correlate a RESPONSE to its pending request and apply the protocol's
    /// success / terminal-failure / refresh-retry rules.
    async fn handle_response(
        &mut self,
        transport: &mut Box<dyn Transport>,
        nonce: String,
        error: String,
    ) -> FrameOutcome {
        if error.is_empty() {
            match self.session.resolve_ok(&nonce) {
                Some(request) => {
                    debug!(
                        kind = request.kind(),
                        channel = %request.channel_id,
                        topic = %request.topic,
                        "topic request confirmed"
                    );
                    request.resolve(Ok(()));
                }
                None => self.orphan_response(&nonce),
            }
            return FrameOutcome::Continue;
        }

        let Some(mut request) = self.session.take_pending(&nonce) else {
            self.orphan_response(&nonce);
            return FrameOutcome::Continue;
        };

        // ERR_BADAUTH gets one refresh-and-resend cycle per request; the
        // retried flag makes a second rejection terminal.
        if error == "ERR_BADAUTH" && !request.retried {
            let refresher = self.refresher.read().clone();
            if let Some(refresher) = refresher {
                if let Some(current) = self.session.channel_auth(&request.channel_id) {
                    if current != request.auth {
                        // The token was refreshed while this request was in
                        // flight; retry with the newer one, no refresh call.
                        debug!(
                            channel = %request.channel_id,
                            "retrying with concurrently refreshed auth"
                        );
                        request.auth = current;
                        request.retried = true;
                        return self.resend(transport, request).await;
                    }
                    self.spawn_refresh(refresher, request);
                    return FrameOutcome::Continue;
                }
            }
        }

        debug!(
            kind = request.kind(),
            channel = %request.channel_id,
            topic = %request.topic,
            error = %error,
            "topic request failed"
        );
        let code = RejectCode::from_wire(&error);
        let (channel_id, topic) = (request.channel_id.clone(), request.topic.clone());
        request.resolve(Err(PubSubError::Rejected {
            channel_id,
            topic,
            code,
        }));
        FrameOutcome::Continue
    }

    fn orphan_response(&self, nonce: &str) {
        // Legitimate after a reconnect dropped the request.
        debug!(nonce, "response for unknown nonce ignored");
        self.events.emit(ClientEvent::Warning(Warning::UnknownNonce {
            nonce: nonce.to_owned(),
        }));
    }

    /// Put a retried request back on the wire under its original nonce and
    /// completion.
    async fn resend(
        &mut self,
        transport: &mut Box<dyn Transport>,
        request: PendingRequest,
    ) -> FrameOutcome {
        if request.is_abandoned() {
            debug!(topic = %request.topic, "caller gone; dropping retried request");
            return FrameOutcome::Continue;
        }
        let nonce = request.nonce.clone();
        self.session.reinsert_pending(request);
        match self.send_pending(transport, &nonce).await {
            Ok(()) => FrameOutcome::Continue,
            Err(reason) => FrameOutcome::SendFailed(reason),
        }
    }

    /// Run the refresh handler off the actor loop so keepalive never stalls
    /// behind a slow handler; the resend comes back as a Dispatch command.
    fn spawn_refresh(&self, refresher: Arc<dyn TokenRefresher>, mut request: PendingRequest) {
        let session = Arc::clone(&self.session);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            match refresher.refresh(&request.channel_id, &request.auth).await {
                Err(source) => {
                    error!(
                        channel = %request.channel_id,
                        error = %source,
                        "token refresh handler failed"
                    );
                    let channel_id = request.channel_id.clone();
                    request.resolve(Err(PubSubError::TokenRefresh { channel_id, source }));
                }
                Ok(token) => match token.filter(|t| !t.is_empty()) {
                    None => {
                        debug!(channel = %request.channel_id, "token refresh handler returned no token");
                        let channel_id = request.channel_id.clone();
                        request.resolve(Err(PubSubError::TokenNotRefreshed { channel_id }));
                    }
                    Some(auth) => {
                        session.set_channel_auth(&request.channel_id, &auth);
                        debug!(channel = %request.channel_id, "auth token refreshed");
                        request.auth = auth;
                        request.retried = true;
                        if request.is_abandoned() {
                            debug!(topic = %request.topic, "caller gone; dropping refreshed request");
                            return;
                        }
                        let nonce = request.nonce.clone();
                        session.reinsert_pending(request);
                        let _ = cmd_tx.send(Command::Dispatch { nonce }).await;
                    }
                },
            }
        });
    }
}

// -- keepalive schedule ------------------------------------------------------

enum PingPhase {
    /// Sleeping until the next ping is due.
    Idle,
    /// Ping sent; waiting out the pong grace window.
    AwaitingPong,
}

/// Keepalive timing. The next ping is computed from a rolling anchor rather
/// than from "now", so per-ping jitter never drifts the schedule.
struct Keepalive {
    interval: Duration,
    jitter: Duration,
    grace: Duration,
    anchor: Instant,
    deadline: Instant,
    phase: PingPhase,
}

impl Keepalive {
    fn new(config: &PubSubConfig) -> Self {
        let now = Instant::now();
        let mut keepalive = Self {
            interval: config.ping_interval,
            jitter: config.ping_jitter,
            grace: config.pong_grace,
            anchor: now,
            deadline: now,
            phase: PingPhase::Idle,
        };
        keepalive.schedule_next();
        keepalive
    }

    /// Arm the next ping: anchor advances by the interval minus up to
    /// `jitter`, pinging slightly early rather than late.
    fn schedule_next(&mut self) {
        let gap = if self.jitter.is_zero() {
            self.interval
        } else {
            let micros = self.jitter.as_micros() as u64;
            self.interval - Duration::from_micros(rand::rng().random_range(0..micros))
        };
        self.anchor += gap;
        self.deadline = self.anchor;
        self.phase = PingPhase::Idle;
    }

    /// Arm the pong grace window.
    fn await_pong(&mut self) {
        self.deadline = Instant::now() + self.grace;
        self.phase = PingPhase::AwaitingPong;
    }
}
