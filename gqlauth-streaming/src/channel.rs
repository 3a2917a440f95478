//! Lazily connected, self-healing subscription channel.
//!
//! One driver task owns the socket. [`SubscriptionChannel`] handles and
//! [`Subscription`] streams talk to it over a command queue, and lifecycle
//! changes are published as [`ChannelEvent`]s on a broadcast channel.
//!
//! Every connection attempt fetches a fresh access token and sends it in the
//! `connection_init` payload. Attempts are bounded: after
//! `reconnection_attempts` consecutive failures the channel closes for good
//! and every active subscription receives
//! [`ChannelError::ReconnectLimitExceeded`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use gqlauth_core::{AccessTokenSource, GraphqlResponse, Operation, DEFAULT_ROLE};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::connector::{Connector, FrameSocket};
use crate::error::{ChannelError, ChannelResult};
use crate::protocol::{init_payload, ClientMessage, ServerMessage, SubscribePayload};

/// Default number of connection attempts before giving up.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;

/// Default bound for socket open plus `connection_ack`.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(8_000);

/// Default time a session may stay open without subscriptions.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Subscription channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Reconnect after a lost session.
    pub reconnect: bool,
    /// Consecutive failed attempts tolerated, the first attempt included.
    pub reconnection_attempts: u32,
    /// Defer connecting until the first subscription.
    pub lazy: bool,
    /// Bound for socket open plus `connection_ack`.
    pub connection_timeout: Duration,
    /// Close the session after this long without subscriptions.
    pub inactivity_timeout: Duration,
    /// Role sent next to the bearer token.
    pub role: Option<String>,
    /// Delay between attempts.
    pub backoff: ReconnectPolicy,
    /// Capacity of the event broadcast.
    pub event_capacity: usize,
}

impl ChannelConfig {
    /// Create a config with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            lazy: true,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            role: Some(DEFAULT_ROLE.to_string()),
            backoff: ReconnectPolicy::default(),
            event_capacity: 64,
        }
    }

    /// Enable or disable reconnecting.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the attempt budget.
    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    /// Enable or disable lazy connecting.
    #[must_use]
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the inactivity timeout.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the role header value.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Send no role header.
    #[must_use]
    pub fn without_role(mut self) -> Self {
        self.role = None;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: ReconnectPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    fn attempt_budget(&self) -> u32 {
        if self.reconnect {
            self.reconnection_attempts.max(1)
        } else {
            1
        }
    }
}

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No session is open.
    Disconnected,
    /// First attempt of a connection cycle in progress.
    Connecting,
    /// Session acknowledged.
    Connected,
    /// Retrying after a failure.
    Reconnecting,
    /// Terminal.
    Closed,
}

/// Lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A session was acknowledged on the first attempt of a cycle.
    Connected,
    /// A session ended.
    Disconnected,
    /// A retry attempt is starting.
    Reconnecting {
        /// Attempt number within the current budget (1-based).
        attempt: u32,
    },
    /// A session was acknowledged after one or more retries or a lost session.
    Reconnected,
    /// Something failed. Does not close the channel by itself.
    Error(ChannelError),
}

type Delivery = ChannelResult<GraphqlResponse>;

enum Command {
    Subscribe {
        id: String,
        operation: Operation,
        sink: mpsc::UnboundedSender<Delivery>,
    },
    Unsubscribe {
        id: String,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

struct Shared {
    state: RwLock<ChannelState>,
    next_id: AtomicU64,
    events: broadcast::Sender<ChannelEvent>,
}

/// Handle to a subscription channel.
///
/// Cloning yields another handle to the same driver. Construction spawns
/// the driver, so a tokio runtime must be running.
#[derive(Clone)]
pub struct SubscriptionChannel {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SubscriptionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionChannel")
            .field("state", &self.state())
            .finish()
    }
}

impl SubscriptionChannel {
    /// Create a channel and spawn its driver.
    pub fn new<T, C>(config: ChannelConfig, tokens: T, connector: C) -> Self
    where
        T: AccessTokenSource + 'static,
        C: Connector,
    {
        Self::from_parts(config, Arc::new(tokens), Arc::new(connector))
    }

    /// Create a channel from shared token source and connector.
    pub fn from_parts(
        config: ChannelConfig,
        tokens: Arc<dyn AccessTokenSource>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            state: RwLock::new(ChannelState::Disconnected),
            next_id: AtomicU64::new(1),
            events,
        });

        let driver = Driver {
            config,
            tokens,
            connector,
            commands: receiver,
            shared: shared.clone(),
            active: HashMap::new(),
            close_waiters: Vec::new(),
        };
        tokio::spawn(driver.run());

        Self { commands, shared }
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        *self.shared.state.read()
    }

    /// Whether the channel is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    /// Observe lifecycle events from now on.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    /// Start an operation. Connects first when no session is open.
    pub fn subscribe(&self, operation: Operation) -> ChannelResult<Subscription> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (sink, receiver) = mpsc::unbounded_channel();
        self.commands
            .send(Command::Subscribe {
                id: id.clone(),
                operation,
                sink,
            })
            .map_err(|_| ChannelError::Closed)?;

        Ok(Subscription {
            id,
            receiver,
            commands: self.commands.clone(),
            finished: false,
        })
    }

    /// Close the channel for good.
    ///
    /// Active operations are completed, the socket is closed and every
    /// subscription stream ends.
    pub async fn close(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::Close { done }).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Results of one operation.
///
/// Dropping the stream completes the operation on the server.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    commands: mpsc::UnboundedSender<Command>,
    finished: bool,
}

impl Subscription {
    /// Operation id on the wire.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for Subscription {
    type Item = ChannelResult<GraphqlResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.receiver.poll_recv(cx);
        if let Poll::Ready(None) = poll {
            self.finished = true;
        }
        poll
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.commands.send(Command::Unsubscribe {
                id: std::mem::take(&mut self.id),
            });
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe { id, .. } => f.debug_struct("Subscribe").field("id", id).finish(),
            Self::Unsubscribe { id } => f.debug_struct("Unsubscribe").field("id", id).finish(),
            Self::Close { .. } => f.write_str("Close"),
        }
    }
}

struct Active {
    operation: Operation,
    sink: mpsc::UnboundedSender<Delivery>,
}

enum Flow {
    Continue,
    Stop,
}

enum SessionEnd {
    Idle,
    Lost(ChannelError),
    Shutdown,
}

struct Driver {
    config: ChannelConfig,
    tokens: Arc<dyn AccessTokenSource>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    active: HashMap<String, Active>,
    close_waiters: Vec<oneshot::Sender<()>>,
}

impl Driver {
    async fn run(mut self) {
        let mut connect_now = !self.config.lazy;
        let mut after_loss = false;

        loop {
            if !connect_now && self.active.is_empty() {
                self.set_state(ChannelState::Disconnected);
                let command = self.commands.recv().await;
                match self.handle_offline(command) {
                    Flow::Continue => continue,
                    Flow::Stop => break,
                }
            }
            connect_now = false;

            let Some(socket) = self.establish(after_loss).await else {
                break;
            };

            match self.serve(socket).await {
                SessionEnd::Idle => {
                    info!(
                        timeout_ms = self.config.inactivity_timeout.as_millis() as u64,
                        "Closing idle subscription session"
                    );
                    self.disconnected();
                    after_loss = false;
                }
                SessionEnd::Lost(err) => {
                    warn!(error = %err, "Subscription session lost");
                    self.emit(ChannelEvent::Error(err));
                    self.disconnected();
                    if !self.config.reconnect {
                        self.give_up(0);
                        break;
                    }
                    after_loss = true;
                    connect_now = true;
                }
                SessionEnd::Shutdown => {
                    self.disconnected();
                    break;
                }
            }
        }

        self.finish();
    }

    /// Run one connection cycle. `None` means the channel is done.
    async fn establish(&mut self, after_loss: bool) -> Option<Box<dyn FrameSocket>> {
        let budget = self.config.attempt_budget();

        for attempt in 1..=budget {
            let retrying = after_loss || attempt > 1;
            if attempt > 1 {
                let delay = self.config.backoff.delay_for(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
                if let Flow::Stop = self.pause(delay).await {
                    return None;
                }
            }

            if retrying {
                self.set_state(ChannelState::Reconnecting);
                self.emit(ChannelEvent::Reconnecting { attempt });
            } else {
                self.set_state(ChannelState::Connecting);
            }

            match self.attempt().await? {
                Ok(socket) => {
                    info!(attempt, url = %self.config.url, "Subscription session acknowledged");
                    self.set_state(ChannelState::Connected);
                    self.emit(if retrying {
                        ChannelEvent::Reconnected
                    } else {
                        ChannelEvent::Connected
                    });
                    return Some(socket);
                }
                Err(err) => {
                    warn!(attempt, budget, error = %err, "Connection attempt failed");
                    self.emit(ChannelEvent::Error(err));
                }
            }
        }

        self.give_up(budget);
        None
    }

    /// One attempt, processing commands meanwhile. `None` on close.
    async fn attempt(&mut self) -> Option<ChannelResult<Box<dyn FrameSocket>>> {
        let open = open_session(
            self.tokens.clone(),
            self.connector.clone(),
            self.config.clone(),
        );
        tokio::pin!(open);

        loop {
            tokio::select! {
                result = &mut open => return Some(result),
                command = self.commands.recv() => {
                    if let Flow::Stop = self.handle_offline(command) {
                        return None;
                    }
                }
            }
        }
    }

    async fn pause(&mut self, delay: Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Continue,
                command = self.commands.recv() => {
                    if let Flow::Stop = self.handle_offline(command) {
                        return Flow::Stop;
                    }
                }
            }
        }
    }

    fn handle_offline(&mut self, command: Option<Command>) -> Flow {
        match command {
            Some(Command::Subscribe {
                id,
                operation,
                sink,
            }) => {
                debug!(id = %id, "Queued subscription until connected");
                self.active.insert(id, Active { operation, sink });
                Flow::Continue
            }
            Some(Command::Unsubscribe { id }) => {
                self.active.remove(&id);
                Flow::Continue
            }
            Some(Command::Close { done }) => {
                self.close_waiters.push(done);
                Flow::Stop
            }
            None => Flow::Stop,
        }
    }

    async fn serve(&mut self, mut socket: Box<dyn FrameSocket>) -> SessionEnd {
        let ids: Vec<String> = self.active.keys().cloned().collect();
        for id in ids {
            if let Err(err) = self.send_subscribe(socket.as_mut(), &id).await {
                return SessionEnd::Lost(err);
            }
        }

        let mut idle_since = self.active.is_empty().then(Instant::now);

        loop {
            let deadline = idle_since.map(|since| since + self.config.inactivity_timeout);

            tokio::select! {
                frame = socket.recv() => match frame {
                    Some(Ok(text)) => {
                        if let Err(err) = self.handle_frame(socket.as_mut(), &text).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    Some(Err(err)) => return SessionEnd::Lost(err),
                    None => return SessionEnd::Lost(ChannelError::ConnectionLost),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe { id, operation, sink }) => {
                        self.active.insert(id.clone(), Active { operation, sink });
                        if let Err(err) = self.send_subscribe(socket.as_mut(), &id).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    Some(Command::Unsubscribe { id }) => {
                        if self.active.remove(&id).is_some() {
                            debug!(id = %id, "Completing dropped subscription");
                            let complete = ClientMessage::Complete { id };
                            if let Err(err) = send_message(socket.as_mut(), &complete).await {
                                return SessionEnd::Lost(err);
                            }
                        }
                    }
                    Some(Command::Close { done }) => {
                        self.close_waiters.push(done);
                        self.shutdown_session(socket.as_mut()).await;
                        return SessionEnd::Shutdown;
                    }
                    None => {
                        self.shutdown_session(socket.as_mut()).await;
                        return SessionEnd::Shutdown;
                    }
                },
                _ = idle_deadline(deadline) => {
                    let _ = socket.close().await;
                    return SessionEnd::Idle;
                }
            }

            if self.active.is_empty() {
                idle_since.get_or_insert_with(Instant::now);
            } else {
                idle_since = None;
            }
        }
    }

    async fn handle_frame(&mut self, socket: &mut dyn FrameSocket, text: &str) -> ChannelResult<()> {
        match ServerMessage::from_text(text)? {
            ServerMessage::Next { id, payload } => match self.active.get(&id) {
                Some(active) => {
                    let _ = active.sink.send(Ok(payload));
                }
                None => debug!(id = %id, "Result for unknown subscription"),
            },
            ServerMessage::Error { id, payload } => {
                if let Some(active) = self.active.remove(&id) {
                    warn!(id = %id, "Server rejected subscription");
                    let _ = active
                        .sink
                        .send(Err(ChannelError::Subscription { errors: payload }));
                }
            }
            ServerMessage::Complete { id } => {
                debug!(id = %id, "Server completed subscription");
                self.active.remove(&id);
            }
            ServerMessage::Ping { payload } => {
                send_message(socket, &ClientMessage::Pong { payload }).await?;
            }
            ServerMessage::Pong { .. } => {}
            ServerMessage::ConnectionAck { .. } => {
                return Err(ChannelError::Protocol("duplicate connection_ack".into()));
            }
        }
        Ok(())
    }

    async fn send_subscribe(&self, socket: &mut dyn FrameSocket, id: &str) -> ChannelResult<()> {
        let Some(active) = self.active.get(id) else {
            return Ok(());
        };
        let message = ClientMessage::Subscribe {
            id: id.to_string(),
            payload: SubscribePayload::from(&active.operation),
        };
        send_message(socket, &message).await
    }

    async fn shutdown_session(&mut self, socket: &mut dyn FrameSocket) {
        for id in self.active.keys().cloned().collect::<Vec<_>>() {
            let _ = send_message(socket, &ClientMessage::Complete { id }).await;
        }
        self.active.clear();
        let _ = socket.close().await;
    }

    fn give_up(&mut self, attempts: u32) {
        let err = ChannelError::ReconnectLimitExceeded { attempts };
        warn!(attempts, url = %self.config.url, "Subscription channel closed");
        self.set_state(ChannelState::Closed);
        self.emit(ChannelEvent::Error(err.clone()));
        for (_, active) in self.active.drain() {
            let _ = active.sink.send(Err(err.clone()));
        }
    }

    fn finish(mut self) {
        self.set_state(ChannelState::Closed);
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Subscribe { sink, .. } => {
                    let _ = sink.send(Err(ChannelError::Closed));
                }
                Command::Close { done } => self.close_waiters.push(done),
                Command::Unsubscribe { .. } => {}
            }
        }
        self.active.clear();
        for done in self.close_waiters.drain(..) {
            let _ = done.send(());
        }
        debug!("Subscription channel driver stopped");
    }

    fn disconnected(&self) {
        self.set_state(ChannelState::Disconnected);
        self.emit(ChannelEvent::Disconnected);
    }

    fn set_state(&self, state: ChannelState) {
        *self.shared.state.write() = state;
    }

    fn emit(&self, event: ChannelEvent) {
        let _ = self.shared.events.send(event);
    }
}

async fn idle_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn send_message(socket: &mut dyn FrameSocket, message: &ClientMessage) -> ChannelResult<()> {
    socket.send(message.to_text()?).await
}

/// Fetch a token, open the socket and wait for `connection_ack`.
async fn open_session(
    tokens: Arc<dyn AccessTokenSource>,
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
) -> ChannelResult<Box<dyn FrameSocket>> {
    let token = tokens.access_token().await.map_err(ChannelError::Token)?;
    let init = ClientMessage::ConnectionInit {
        payload: Some(init_payload(&token, config.role.as_deref())),
    };

    tokio::time::timeout(
        config.connection_timeout,
        handshake(connector.as_ref(), &config.url, init),
    )
    .await
    .map_err(|_| ChannelError::HandshakeTimeout)?
}

async fn handshake(
    connector: &dyn Connector,
    url: &str,
    init: ClientMessage,
) -> ChannelResult<Box<dyn FrameSocket>> {
    let mut socket = connector.connect(url).await?;
    send_message(socket.as_mut(), &init).await?;

    loop {
        let text = match socket.recv().await {
            Some(Ok(text)) => text,
            Some(Err(err)) => return Err(err),
            None => {
                return Err(ChannelError::Rejected(
                    "socket closed before connection_ack".into(),
                ))
            }
        };
        match ServerMessage::from_text(&text)? {
            ServerMessage::ConnectionAck { .. } => return Ok(socket),
            ServerMessage::Ping { payload } => {
                send_message(socket.as_mut(), &ClientMessage::Pong { payload }).await?;
            }
            ServerMessage::Pong { .. } => {}
            other => {
                return Err(ChannelError::Protocol(format!(
                    "unexpected frame before connection_ack: {:?}",
                    other
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ChannelConfig::new("wss://api.example.com/v1/graphql");
        assert!(config.reconnect);
        assert!(config.lazy);
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.connection_timeout, Duration::from_secs(8));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(10));
        assert_eq!(config.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_attempt_budget() {
        let config = ChannelConfig::new("ws://localhost").with_reconnection_attempts(3);
        assert_eq!(config.attempt_budget(), 3);
        assert_eq!(config.clone().with_reconnect(false).attempt_budget(), 1);
        assert_eq!(config.with_reconnection_attempts(0).attempt_budget(), 1);
    }

    struct NeverConnect;

    #[async_trait::async_trait]
    impl Connector for NeverConnect {
        async fn connect(&self, _url: &str) -> ChannelResult<Box<dyn FrameSocket>> {
            Err(ChannelError::Connect("refused".into()))
        }
    }

    #[tokio::test]
    async fn test_subscription_wakes_on_give_up() {
        let channel = SubscriptionChannel::new(
            ChannelConfig::new("ws://localhost").with_reconnect(false),
            gqlauth_core::StaticToken("A1".into()),
            NeverConnect,
        );
        let subscription = channel.subscribe(Operation::new("subscription { x }")).unwrap();
        let mut stream = tokio_test::task::spawn(subscription);
        tokio_test::assert_pending!(stream.poll_next());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(stream.is_woken());
        assert_eq!(
            tokio_test::assert_ready!(stream.poll_next()),
            Some(Err(ChannelError::ReconnectLimitExceeded { attempts: 1 }))
        );
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_subscribe() {
        let channel = SubscriptionChannel::new(
            ChannelConfig::new("ws://localhost"),
            gqlauth_core::StaticToken("A1".into()),
            NeverConnect,
        );
        assert_eq!(channel.state(), ChannelState::Disconnected);

        channel.close().await;

        assert!(channel.is_closed());
        assert_eq!(
            channel.subscribe(Operation::new("subscription { x }")).unwrap_err(),
            ChannelError::Closed
        );
    }
}
