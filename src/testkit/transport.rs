//! Scripted WebSocket transport.
//!
//! [`ScriptedTransport`] hands out pre-loaded [`ScriptedConnection`]s, one
//! per `connect()` call. When the queue is empty, connecting fails with a
//! network error, which drives the session's reconnect path.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::adapter::outbound::shared::{WsConnection, WsTransport};
use crate::error::VenueError;

// ---------------------------------------------------------------------------
// ScriptedConnection
// ---------------------------------------------------------------------------

/// One scripted socket: a fixed list of frames, then either closure or silence.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    frames: VecDeque<String>,
    hold_open: bool,
    fail_with: Option<VenueError>,
}

impl ScriptedConnection {
    /// Deliver `frames` in order, then close.
    pub fn frames(frames: Vec<String>) -> Self {
        Self {
            frames: frames.into(),
            ..Self::default()
        }
    }

    /// Stay open, silently, after the last frame instead of closing.
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// End with a read error instead of a clean close.
    #[must_use]
    pub fn then_fail(mut self, err: VenueError) -> Self {
        self.fail_with = Some(err);
        self
    }
}

struct Socket {
    script: ScriptedConnection,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WsConnection for Socket {
    async fn send_text(&mut self, text: String) -> Result<(), VenueError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, VenueError>> {
        if let Some(frame) = self.script.frames.pop_front() {
            return Some(Ok(frame));
        }
        if let Some(err) = self.script.fail_with.take() {
            return Some(Err(err));
        }
        if self.script.hold_open {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn close(&mut self) {}
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    queue: VecDeque<ScriptedConnection>,
    connects: usize,
    urls: Vec<String>,
    sent: Vec<Arc<Mutex<Vec<String>>>>,
}

/// Transport whose connections are scripted up front. Clones share state,
/// so a test keeps one handle for assertions while the session owns another.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    pub fn new(connections: Vec<ScriptedConnection>) -> Self {
        let transport = Self::default();
        transport.state.lock().queue = connections.into();
        transport
    }

    /// Every connection attempt fails.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Queue another connection for a later attempt.
    pub fn push(&self, connection: ScriptedConnection) {
        self.state.lock().queue.push_back(connection);
    }

    /// Connection attempts so far, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// URLs of every attempt, in order.
    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    /// Messages sent on the `index`th successful connection.
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.state
            .lock()
            .sent
            .get(index)
            .map(|sent| sent.lock().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WsTransport for ScriptedTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, VenueError> {
        let mut state = self.state.lock();
        state.connects += 1;
        state.urls.push(url.to_string());
        let script = state
            .queue
            .pop_front()
            .ok_or_else(|| VenueError::Network(format!("scripted refusal for {url}")))?;
        let sent = Arc::new(Mutex::new(Vec::new()));
        state.sent.push(Arc::clone(&sent));
        Ok(Box::new(Socket { script, sent }))
    }
}
