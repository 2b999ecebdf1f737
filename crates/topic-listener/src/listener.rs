//! Inbound push listener
//!
//! The game server opens a new connection for every push, writes a single
//! HTTP-ish request line (or a topic frame) carrying a query string, and
//! hangs up. Each connection is handled as:
//!
//! ```text
//! accept -> read once -> extract query -> authenticate -> classify -> dispatch -> close
//! ```
//!
//! Nothing is ever written back to the peer.

use crate::config::ListenerConfig;
use crate::event::{EventKind, classify};
use crate::sink::NotificationSink;
use crate::spam::SpamGuard;
use byond_topic_core::frame;
use byond_topic_core::{Result, TopicError, TopicResponse, parse_query_string};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// What became of one inbound connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Event handed to the sink
    Dispatched(EventKind),
    /// Missing or wrong comms key; dropped
    Unauthenticated,
    /// Authenticated but not recognised; dropped
    Unclassified,
    /// Peer closed without sending anything
    Empty,
    /// Read failed or timed out
    ReadFailed(String),
    /// Sink refused the event
    SinkFailed(String),
}

/// Listener state shared by every connection task
struct Shared {
    config: ListenerConfig,
    sink: Arc<dyn NotificationSink>,
    spam: SpamGuard,
}

impl Shared {
    async fn handle_push(&self, raw: &[u8]) -> ConnectionOutcome {
        if raw.is_empty() {
            return ConnectionOutcome::Empty;
        }

        let fields = parse_query_string(&extract_query(raw));

        if let Err(e) = authenticate(&fields, &self.config.comms_key) {
            debug!("Dropping push: {}", e);
            return ConnectionOutcome::Unauthenticated;
        }

        let mut event = classify(&fields);
        if event.kind == EventKind::Unclassified {
            let keys: Vec<&str> = fields
                .iter()
                .map(|(k, _)| k)
                .filter(|k| *k != "key")
                .collect();
            info!("Dropping unclassified push with fields {:?}", keys);
            return ConnectionOutcome::Unclassified;
        }

        event.channel = self
            .config
            .channels
            .for_kind(event.kind)
            .map(str::to_string);

        if event.urgent {
            if self.spam.try_fire() {
                event.mention = Some(self.config.urgent_mention.clone());
            } else {
                debug!(
                    "Urgent mention suppressed (fired within the last {}s)",
                    self.config.mention_window_secs
                );
            }
        }

        let kind = event.kind;
        match self.sink.dispatch(event).await {
            Ok(()) => ConnectionOutcome::Dispatched(kind),
            Err(e) => ConnectionOutcome::SinkFailed(e.to_string()),
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> ConnectionOutcome {
        let mut buf = vec![0u8; self.config.max_read_bytes];

        let outcome = match timeout(self.config.read_timeout(), stream.read(&mut buf)).await {
            Ok(Ok(n)) => self.handle_push(&buf[..n]).await,
            Ok(Err(e)) => ConnectionOutcome::ReadFailed(e.to_string()),
            Err(_) => ConnectionOutcome::ReadFailed("timed out waiting for push".to_string()),
        };

        let _ = stream.shutdown().await;
        outcome
    }
}

/// Pull the query string out of a raw push.
///
/// Accepts `GET ?a=b HTTP/1.0`-style lines, bare `?a=b` text, and topic
/// frames wrapping either.
pub fn extract_query(raw: &[u8]) -> String {
    let text = if raw.starts_with(&frame::MAGIC) {
        frame::decode(raw).unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned())
    } else {
        String::from_utf8_lossy(raw).into_owned()
    };

    let line = text.lines().next().unwrap_or_default();
    let mut tokens = line.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    let target = tokens.next().unwrap_or(first);

    match target.find('?') {
        Some(start) => target[start + 1..].to_string(),
        None => target.to_string(),
    }
}

/// Check the push carries the shared secret
pub fn authenticate(fields: &TopicResponse, comms_key: &str) -> Result<()> {
    match fields.get("key") {
        Some(key) if !comms_key.is_empty() && key == comms_key => Ok(()),
        _ => Err(TopicError::AuthenticationFailure),
    }
}

/// Push listener, not yet bound
pub struct EventListener {
    shared: Arc<Shared>,
}

impl EventListener {
    pub fn new(config: ListenerConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let spam = SpamGuard::new(config.mention_window());
        Self {
            shared: Arc::new(Shared { config, sink, spam }),
        }
    }

    /// Process one raw push without a socket
    pub async fn handle_push(&self, raw: &[u8]) -> ConnectionOutcome {
        self.shared.handle_push(raw).await
    }

    /// Bind the configured port and start accepting pushes
    pub async fn start(self) -> Result<ListenerHandle> {
        let port = self.shared.config.port;
        let (stop, task, local_addr) = spawn_accept_loop(self.shared.clone(), port).await?;
        Ok(ListenerHandle {
            shared: self.shared,
            local_addr,
            stop: Some(stop),
            task: Some(task),
        })
    }
}

/// Owned handle to a running listener.
///
/// Dropping the handle stops accepting new connections.
pub struct ListenerHandle {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Address of the most recent successful bind
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether an accept loop is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Move the listener to another port.
    ///
    /// The current accept loop is cancelled and awaited before binding, so
    /// the same port can be reused. Connections already accepted run to
    /// completion. On bind failure the listener stays stopped.
    pub async fn reconfigure_port(&mut self, port: u16) -> Result<()> {
        self.cancel().await;

        let (stop, task, local_addr) = spawn_accept_loop(self.shared.clone(), port).await?;
        self.stop = Some(stop);
        self.task = Some(task);
        self.local_addr = local_addr;
        Ok(())
    }

    /// Stop accepting and wait for the accept loop to exit
    pub async fn stop(mut self) {
        self.cancel().await;
    }

    async fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn spawn_accept_loop(
    shared: Arc<Shared>,
    port: u16,
) -> Result<(oneshot::Sender<()>, JoinHandle<()>, SocketAddr)> {
    let addr = format!("{}:{}", shared.config.bind_host, port);
    let bind_error = |e: std::io::Error| TopicError::Bind {
        addr: addr.clone(),
        reason: e.to_string(),
    };

    let listener = TcpListener::bind(&addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    info!("Listening for topic pushes on {}", local_addr);

    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(accept_loop(listener, shared, stop_rx));

    Ok((stop_tx, task, local_addr))
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut stop: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        let outcome = shared.handle_connection(stream).await;
                        log_outcome(peer, &outcome);
                    });
                }
                Err(e) => warn!("Failed to accept push connection: {}", e),
            }
        }
    }

    if let Ok(addr) = listener.local_addr() {
        info!("Stopped listening on {}", addr);
    }
}

fn log_outcome(peer: SocketAddr, outcome: &ConnectionOutcome) {
    match outcome {
        ConnectionOutcome::Dispatched(kind) => debug!("Push from {}: dispatched {:?}", peer, kind),
        ConnectionOutcome::Unauthenticated => warn!("Push from {} rejected: bad comms key", peer),
        ConnectionOutcome::Unclassified => debug!("Push from {} unclassified", peer),
        ConnectionOutcome::Empty => debug!("Push from {} was empty", peer),
        ConnectionOutcome::ReadFailed(reason) => {
            debug!("Push from {} unreadable: {}", peer, reason)
        }
        ConnectionOutcome::SinkFailed(reason) => {
            warn!("Push from {} not delivered: {}", peer, reason)
        }
    }
}
