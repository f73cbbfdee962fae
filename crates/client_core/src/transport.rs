use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{error::BusError, lock, types::ListenerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Errored(String),
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Errored(_) => "errored",
            Self::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errored(reason) => write!(f, "errored: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Failed(String),
}

const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Ordered transport output. Dropping the stream shuts the socket down.
#[derive(Debug)]
pub struct FrameStream {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FrameStream {
    pub fn new(events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self {
            events,
            shutdown: None,
        }
    }

    pub fn with_shutdown(
        events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
        }
    }

    /// `None` once the bus has closed the connection.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.events.close();
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<FrameStream, BusError>;
}

pub struct WebSocketConnector;

#[async_trait]
impl BusConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, BusError> {
        let parsed = Url::parse(url)
            .map_err(|err| BusError::Transport(format!("invalid bus url '{url}': {err}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(BusError::Transport(format!(
                "bus url must use ws:// or wss://, got '{url}'"
            )));
        }

        let (mut ws_stream, _) = connect_async(url)
            .await
            .map_err(|err| BusError::Transport(format!("failed to connect websocket {url}: {err}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let ws_url = url.to_string();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = &mut shutdown_rx => {
                        match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, ws_stream.close(None)).await {
                            Ok(Ok(())) => debug!(url = %ws_url, "bus: websocket closed"),
                            Ok(Err(err)) => warn!(url = %ws_url, error = %err, "bus: websocket close failed"),
                            Err(_) => warn!(url = %ws_url, "bus: websocket close timed out"),
                        }
                        return;
                    }
                    msg = ws_stream.next() => msg,
                };
                let event = match msg {
                    Some(Ok(Message::Text(text))) => TransportEvent::Frame(text),
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        TransportEvent::Failed(format!("websocket receive failed: {err}"))
                    }
                };
                let failed = matches!(event, TransportEvent::Failed(_));
                if tx.send(event).is_err() || failed {
                    return;
                }
            }
        });

        Ok(FrameStream::with_shutdown(rx, shutdown_tx))
    }
}

/// Hands out its stream once.
pub struct MemoryConnector {
    stream: Mutex<Option<FrameStream>>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                stream: Mutex::new(Some(FrameStream::new(rx))),
            },
            MemoryFeed { tx },
        )
    }
}

#[async_trait]
impl BusConnector for MemoryConnector {
    async fn connect(&self, _url: &str) -> Result<FrameStream, BusError> {
        lock(&self.stream)
            .take()
            .ok_or_else(|| BusError::Transport("memory bus stream already consumed".into()))
    }
}

#[derive(Clone)]
pub struct MemoryFeed {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryFeed {
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.tx.send(TransportEvent::Frame(frame.into())).is_ok()
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx.send(TransportEvent::Failed(reason.into())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

type RawListener = dyn FnMut(&str) + Send;

struct ListenerEntry {
    id: ListenerId,
    callback: Arc<Mutex<Box<RawListener>>>,
}

pub struct Connection {
    url: String,
    state: watch::Sender<ConnectionState>,
    frames: Mutex<Option<FrameStream>>,
    closed: Notify,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
}

impl Connection {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            url: url.into(),
            state,
            frames: Mutex::new(None),
            closed: Notify::new(),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub async fn open(&self, connector: &dyn BusConnector) -> Result<(), BusError> {
        match self.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Closed | ConnectionState::Errored(_) => {
                return Err(BusError::ConnectionClosed)
            }
            other => return Err(BusError::AlreadyOpen(other.as_str())),
        }

        self.transition(ConnectionState::Connecting);
        match connector.connect(&self.url).await {
            Ok(stream) => {
                if !self.transition(ConnectionState::Open) {
                    return Err(BusError::ConnectionClosed);
                }
                *lock(&self.frames) = Some(stream);
                Ok(())
            }
            Err(err) => {
                error!(url = %self.url, error = %err, "bus: connect failed");
                self.transition(ConnectionState::Errored(err.to_string()));
                Err(err)
            }
        }
    }

    /// Only a transport failure is an error.
    pub async fn run(&self) -> Result<(), BusError> {
        let Some(mut frames) = lock(&self.frames).take() else {
            return match self.state() {
                ConnectionState::Closed => Err(BusError::ConnectionClosed),
                ConnectionState::Errored(reason) => Err(BusError::Transport(reason)),
                _ => Err(BusError::Transport(format!(
                    "connection to {} has no frame stream (not opened or already running)",
                    self.url
                ))),
            };
        };

        loop {
            tokio::select! {
                biased;
                _ = self.closed.notified() => return Ok(()),
                event = frames.recv() => match event {
                    Some(TransportEvent::Frame(frame)) => self.deliver(&frame),
                    Some(TransportEvent::Failed(reason)) => {
                        error!(url = %self.url, reason = %reason, "bus: transport failed");
                        self.transition(ConnectionState::Errored(reason.clone()));
                        return Err(BusError::Transport(reason));
                    }
                    None => {
                        info!(url = %self.url, "bus: stream ended");
                        self.transition(ConnectionState::Closed);
                        return Ok(());
                    }
                },
            }
        }
    }

    pub fn close(&self) {
        if let Some(mut frames) = lock(&self.frames).take() {
            frames.shutdown();
        }
        self.transition(ConnectionState::Closed);
        self.closed.notify_one();
    }

    pub fn on_message<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&str) + Send + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let callback: Box<RawListener> = Box::new(listener);
        lock(&self.listeners).push(ListenerEntry {
            id,
            callback: Arc::new(Mutex::new(callback)),
        });
        debug!(listener_id = %id, url = %self.url, "bus: raw listener attached");
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(listener_id = %id, url = %self.url, "bus: raw listener released");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn deliver(&self, frame: &str) {
        let snapshot: Vec<(ListenerId, Arc<Mutex<Box<RawListener>>>)> = lock(&self.listeners)
            .iter()
            .map(|entry| (entry.id, Arc::clone(&entry.callback)))
            .collect();

        for (id, callback) in snapshot {
            if !self.has_listener(id) {
                continue;
            }
            let mut guard = lock(&callback);
            let listener = &mut **guard;
            listener(frame);
        }
    }

    fn has_listener(&self, id: ListenerId) -> bool {
        lock(&self.listeners).iter().any(|entry| entry.id == id)
    }

    /// `Closed` is terminal.
    fn transition(&self, next: ConnectionState) -> bool {
        let url = &self.url;
        let mut accepted = false;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                accepted = next == ConnectionState::Closed;
                return false;
            }
            accepted = true;
            if *state == next {
                return false;
            }
            info!(url = %url, from = %state, to = %next, "bus: connection state changed");
            *state = next;
            true
        });
        accepted
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
