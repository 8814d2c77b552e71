//! Multiplexed WebSocket sessions with automatic reconnection.
//!
//! A [`StreamSession`] owns one socket per venue stream endpoint. Subscribers
//! register sinks keyed by [`Topic`]; the session task decodes every frame
//! through the venue's [`StreamProtocol`] and fans events out to the sinks of
//! the matching topic.
//!
//! On socket closure the session reconnects with capped exponential backoff
//! and resubscribes every active topic. Receiving market or account data
//! resets the failure count; acknowledgements and heartbeats do not. When consecutive failures exceed the configured maximum, each
//! subscriber receives a single [`StreamUpdate::Failed`](crate::port::StreamUpdate)
//! and the session ends; the owning connector starts a fresh session on the
//! next subscribe.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::domain::VenueId;
use crate::error::VenueError;
use crate::port::stream::{open_subscription, Delivery, EventSink, StreamPayload};
use crate::port::{StreamEvent, Subscription, Topic};

/// An open socket yielding text frames.
#[async_trait]
pub trait WsConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), VenueError>;

    /// Next text frame, or `None` once the peer closed the socket.
    /// Control frames are handled internally.
    async fn next_text(&mut self) -> Option<Result<String, VenueError>>;

    async fn close(&mut self);
}

/// Opens sockets. Swapped for a scripted transport in tests.
#[async_trait]
pub trait WsTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, VenueError>;
}

/// Venue-specific framing: how to subscribe and how to decode.
pub trait StreamProtocol: Send + 'static {
    /// Endpoint for the next connection attempt.
    fn url(&self) -> String;

    fn subscribe_messages(&mut self, topics: &[Topic]) -> Result<Vec<String>, VenueError>;

    fn unsubscribe_messages(&mut self, topics: &[Topic]) -> Result<Vec<String>, VenueError>;

    /// Decode one frame into zero or more events. Control and
    /// acknowledgement frames decode to nothing.
    fn decode(&mut self, frame: &str) -> Result<Vec<(Topic, StreamEvent)>, VenueError>;

    /// Reset per-connection state before resubscribing.
    fn on_connect(&mut self) {}

    /// Application-level heartbeat, sent every ping interval.
    fn heartbeat(&self) -> Option<String> {
        None
    }
}

/// Reconnect and delivery settings for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Consecutive failures tolerated before the session gives up.
    pub max_reconnect_attempts: u32,
    pub channel_capacity: usize,
    pub ping_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            max_reconnect_attempts: 5,
            channel_capacity: 1024,
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Base delay before reconnect attempt `attempt` (1-based), capped.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1).min(32) as i32);
        let ms = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(ms).min(self.max_delay)
    }

    /// Base delay plus up to 20% random jitter.
    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let range_ms = (base.as_millis() as u64) / 5;
        if range_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=range_ms))
    }
}

enum Command {
    Subscribe { topic: Topic, sink: EventSink },
    Unsubscribe { topic: Topic },
    Shutdown,
}

/// Handle to a running session task.
pub struct StreamSession {
    venue: VenueId,
    capacity: usize,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl StreamSession {
    pub fn spawn<P: StreamProtocol>(
        venue: VenueId,
        protocol: P,
        transport: std::sync::Arc<dyn WsTransport>,
        config: SessionConfig,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let worker = SessionWorker {
            venue,
            protocol,
            transport,
            config,
            commands: rx,
            topics: BTreeMap::new(),
            failures: 0,
            last_error: None,
        };
        let task = tokio::spawn(worker.run());
        Self {
            venue,
            capacity: config.channel_capacity,
            commands,
            task,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished() && !self.commands.is_closed()
    }

    pub fn subscribe<T: StreamPayload>(&self, topic: Topic) -> Result<Subscription<T>, VenueError> {
        let (sink, subscription) = open_subscription::<T>(topic.clone(), self.capacity);
        self.commands
            .send(Command::Subscribe {
                topic: topic.clone(),
                sink,
            })
            .map_err(|_| VenueError::StreamUnavailable {
                channel: topic.to_string(),
                reason: format!("{} session has stopped", self.venue),
            })?;
        Ok(subscription)
    }

    pub fn unsubscribe(&self, topic: Topic) {
        let _ = self.commands.send(Command::Unsubscribe { topic });
    }

    /// Close the socket and stop reconnecting.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let mut task = self.task;
        if timeout(Duration::from_secs(5), &mut task).await.is_err() {
            warn!(venue = %self.venue, "Stream session did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Lazily started session shared by a connector's subscribe calls.
pub struct SessionSlot {
    venue: VenueId,
    transport: std::sync::Arc<dyn WsTransport>,
    config: SessionConfig,
    session: Mutex<Option<StreamSession>>,
}

impl SessionSlot {
    #[must_use]
    pub fn new(venue: VenueId, transport: std::sync::Arc<dyn WsTransport>, config: SessionConfig) -> Self {
        Self {
            venue,
            transport,
            config,
            session: Mutex::new(None),
        }
    }

    /// Subscribe on the running session, starting one from `make` if none
    /// is running (first use, or after a terminal failure).
    pub fn subscribe<T, P, F>(&self, topic: Topic, make: F) -> Result<Subscription<T>, VenueError>
    where
        T: StreamPayload,
        P: StreamProtocol,
        F: FnOnce() -> P,
    {
        let mut slot = self.session.lock();
        if !slot.as_ref().is_some_and(StreamSession::is_running) {
            info!(venue = %self.venue, "Starting stream session");
            *slot = Some(StreamSession::spawn(
                self.venue,
                make(),
                std::sync::Arc::clone(&self.transport),
                self.config,
            ));
        }
        match slot.as_ref() {
            Some(session) => session.subscribe(topic),
            None => Err(VenueError::NotConnected),
        }
    }

    pub fn unsubscribe(&self, topic: Topic) {
        if let Some(session) = self.session.lock().as_ref() {
            session.unsubscribe(topic);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.lock().as_ref().is_some_and(StreamSession::is_running)
    }

    pub async fn shutdown(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }
}

enum Exit {
    Shutdown,
    Disconnected(VenueError),
}

struct SessionWorker<P> {
    venue: VenueId,
    protocol: P,
    transport: std::sync::Arc<dyn WsTransport>,
    config: SessionConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    topics: BTreeMap<Topic, Vec<EventSink>>,
    failures: u32,
    last_error: Option<VenueError>,
}

impl<P: StreamProtocol> SessionWorker<P> {
    async fn run(mut self) {
        loop {
            let url = self.protocol.url();
            debug!(venue = %self.venue, url = %url, "Connecting stream");
            let exit = match self.transport.connect(&url).await {
                Ok(conn) => {
                    info!(venue = %self.venue, topics = self.topics.len(), "Stream connected");
                    self.serve(conn).await
                }
                Err(err) => Exit::Disconnected(err),
            };

            let err = match exit {
                Exit::Shutdown => {
                    info!(venue = %self.venue, "Stream session stopped");
                    return;
                }
                Exit::Disconnected(err) => err,
            };

            self.failures += 1;
            self.last_error = Some(err.clone());
            if self.failures > self.config.max_reconnect_attempts {
                self.give_up(err);
                return;
            }

            let delay = self.config.delay_with_jitter(self.failures);
            warn!(
                venue = %self.venue,
                attempt = self.failures,
                max_attempts = self.config.max_reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Stream disconnected, reconnecting"
            );
            if !self.wait_backoff(delay).await {
                info!(venue = %self.venue, "Stream session stopped during backoff");
                return;
            }
        }
    }

    /// Pump one connection until it closes or the session is shut down.
    async fn serve(&mut self, mut conn: Box<dyn WsConnection>) -> Exit {
        self.protocol.on_connect();
        let active: Vec<Topic> = self.topics.keys().cloned().collect();
        if !active.is_empty() {
            if let Err(err) = self.send_subscribe(conn.as_mut(), &active).await {
                conn.close().await;
                return Exit::Disconnected(err);
            }
        }

        let period = self.config.ping_interval.max(Duration::from_millis(1));
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Subscribe { topic, sink }) => {
                        let is_new = !self.topics.contains_key(&topic);
                        self.topics.entry(topic.clone()).or_default().push(sink);
                        if is_new {
                            if let Err(err) = self.send_subscribe(conn.as_mut(), &[topic]).await {
                                conn.close().await;
                                return Exit::Disconnected(err);
                            }
                        }
                    }
                    Some(Command::Unsubscribe { topic }) => {
                        if self.topics.remove(&topic).is_some() {
                            self.send_unsubscribe(conn.as_mut(), &[topic]).await;
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        conn.close().await;
                        return Exit::Shutdown;
                    }
                },
                frame = conn.next_text() => match frame {
                    Some(Ok(text)) => {
                        let emptied = self.dispatch(&text);
                        if !emptied.is_empty() {
                            self.send_unsubscribe(conn.as_mut(), &emptied).await;
                        }
                    }
                    Some(Err(err)) => return Exit::Disconnected(err),
                    None => return Exit::Disconnected(VenueError::Network("socket closed".into())),
                },
                _ = heartbeat.tick() => {
                    if let Some(message) = self.protocol.heartbeat() {
                        if let Err(err) = conn.send_text(message).await {
                            return Exit::Disconnected(err);
                        }
                    }
                }
            }
        }
    }

    /// Decode and deliver one frame. Returns topics left without subscribers.
    fn dispatch(&mut self, frame: &str) -> Vec<Topic> {
        let events = match self.protocol.decode(frame) {
            Ok(events) => events,
            Err(err) => {
                warn!(venue = %self.venue, error = %err, "Dropping undecodable stream frame");
                return Vec::new();
            }
        };
        // Acks, status and heartbeat frames decode to nothing and prove no
        // data is flowing.
        if self.failures > 0 && !events.is_empty() {
            debug!(venue = %self.venue, "Stream data received, resetting failure count");
            self.failures = 0;
        }

        let mut emptied = Vec::new();
        for (topic, event) in events {
            let Some(sinks) = self.topics.get_mut(&topic) else {
                trace!(venue = %self.venue, topic = %topic, "No subscribers for stream event");
                continue;
            };
            sinks.retain(|sink| match sink.deliver(&event) {
                Delivery::Closed => false,
                Delivery::Lagging => {
                    warn!(topic = %topic, "Subscriber lagging, dropping event");
                    true
                }
                Delivery::Delivered | Delivery::Ignored => true,
            });
            if sinks.is_empty() {
                self.topics.remove(&topic);
                emptied.push(topic);
            }
        }
        emptied
    }

    async fn send_subscribe(&mut self, conn: &mut dyn WsConnection, topics: &[Topic]) -> Result<(), VenueError> {
        let messages = match self.protocol.subscribe_messages(topics) {
            Ok(messages) => messages,
            Err(err) => {
                // Topics the protocol cannot express are failed individually.
                for topic in topics {
                    if let Some(sinks) = self.topics.remove(topic) {
                        for sink in sinks {
                            sink.fail(err.clone());
                        }
                    }
                }
                warn!(venue = %self.venue, error = %err, "Subscription rejected");
                return Ok(());
            }
        };
        for message in messages {
            trace!(venue = %self.venue, message = %message, "Sending subscribe");
            conn.send_text(message).await?;
        }
        Ok(())
    }

    async fn send_unsubscribe(&mut self, conn: &mut dyn WsConnection, topics: &[Topic]) {
        let messages = match self.protocol.unsubscribe_messages(topics) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(venue = %self.venue, error = %err, "Failed to build unsubscribe");
                return;
            }
        };
        for message in messages {
            if let Err(err) = conn.send_text(message).await {
                warn!(venue = %self.venue, error = %err, "Failed to send unsubscribe");
                return;
            }
        }
    }

    /// Sleep out the backoff while still honouring commands.
    /// Returns `false` if shut down meanwhile.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let pause = sleep(delay);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                () = &mut pause => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe { topic, sink }) => {
                        self.topics.entry(topic).or_default().push(sink);
                    }
                    Some(Command::Unsubscribe { topic }) => {
                        self.topics.remove(&topic);
                    }
                    Some(Command::Shutdown) | None => return false,
                },
            }
        }
    }

    fn give_up(&mut self, err: VenueError) {
        error!(
            venue = %self.venue,
            failures = self.failures,
            error = %err,
            "Stream reconnect attempts exhausted, marking channels unavailable"
        );
        for (topic, sinks) in std::mem::take(&mut self.topics) {
            let failure = VenueError::StreamUnavailable {
                channel: topic.to_string(),
                reason: err.to_string(),
            };
            for sink in sinks {
                sink.fail(failure.clone());
            }
        }
        // Late subscribers racing the shutdown get the same failure.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Subscribe { topic, sink } = command {
                sink.fail(VenueError::StreamUnavailable {
                    channel: topic.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Production transport over tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

#[async_trait]
impl WsTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, VenueError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| VenueError::Network(e.to_string()))?;
        debug!(status = %response.status(), "WebSocket connected");
        Ok(Box::new(TungsteniteConnection { ws }))
    }
}

struct TungsteniteConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WsConnection for TungsteniteConnection {
    async fn send_text(&mut self, text: String) -> Result<(), VenueError> {
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| VenueError::Network(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, VenueError>> {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes).map_err(|e| VenueError::Decode(e.to_string())),
                    )
                }
                Ok(Message::Ping(payload)) => {
                    if let Err(err) = self.ws.send(Message::Pong(payload)).await {
                        return Some(Err(VenueError::Network(err.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "WebSocket closed by peer");
                    return None;
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => {}
                Err(err) => return Some(Err(VenueError::Network(err.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
