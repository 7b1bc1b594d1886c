//! WebSocket sync server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                     ┌── Room "R1" ── FileTree + ParticipantSet
//!            ├── Session ── Engine ┤
//! Client B ──┘      ▲              └── Dispatcher ── BroadcastGroup("R1")
//!                   │                                   │
//!                   └────────── outbox (mpsc) ◄─────────┘
//! ```
//!
//! One task per connection. The task owns the WebSocket and a [`Session`];
//! it multiplexes inbound frames, frames queued on its outbox by any room it
//! is subscribed to, and the heartbeat timer.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::config::{ConfigError, ServerConfig};
use crate::engine::SyncEngine;
use crate::protocol::ProtocolError;
use crate::session::Session;

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub malformed_messages: u64,
    pub active_rooms: usize,
}

#[derive(Default)]
struct AtomicServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    total_messages: AtomicU64,
    total_bytes: AtomicU64,
    malformed_messages: AtomicU64,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("websocket handshake with {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: ProtocolError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    engine: SyncEngine,
    stats: Arc<AtomicServerStats>,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            engine: SyncEngine::new(),
            stats: Arc::new(AtomicServerStats::default()),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind and serve forever.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_addr.clone(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    /// resolves. Open connections keep running after that.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        match listener.local_addr() {
            Ok(addr) => log::info!("Sync server listening on {addr}"),
            Err(_) => log::info!("Sync server listening on {}", self.config.bind_addr),
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Sync server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            log::error!("{}", ServerError::Accept(e));
                            continue;
                        }
                    };
                    log::debug!("New TCP connection from {addr}");

                    let engine = self.engine.clone();
                    let stats = Arc::clone(&self.stats);
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, addr, engine, stats, config).await {
                            log::error!("Connection error from {addr}: {e}");
                        }
                    });
                }
            }
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: SyncEngine,
        stats: Arc<AtomicServerStats>,
        config: ServerConfig,
    ) -> Result<(), ServerError> {
        let ws_config = WebSocketConfig::default().max_message_size(Some(config.max_message_bytes));
        let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
            .await
            .map_err(|e| ServerError::Handshake {
                addr,
                source: e.into(),
            })?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outbox, mut outbox_rx) = mpsc::unbounded_channel();
        let mut session = Session::new(engine, outbox);
        log::info!("WebSocket connection {} established from {addr}", session.id());

        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);

        let heartbeat = config.heartbeat_interval();
        let mut ticker = heartbeat.map(|period| tokio::time::interval_at(tokio::time::Instant::now() + period, period));

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            stats.total_messages.fetch_add(1, Ordering::Relaxed);
                            stats.total_bytes.fetch_add(text.len() as u64, Ordering::Relaxed);
                            if let Err(e) = session.handle_text(text.as_str()).await {
                                stats.malformed_messages.fetch_add(1, Ordering::Relaxed);
                                log::warn!("Dropping message from {addr}: {e}");
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            stats.malformed_messages.fetch_add(1, Ordering::Relaxed);
                            log::warn!("Dropping message from {addr}: {}", ProtocolError::UnsupportedFrame("binary"));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                                log::error!("WebSocket error to {addr}: {e}");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                // Outgoing room events
                Some(frame) = outbox_rx.recv() => {
                    if let Err(e) = ws_sender.send(Message::text(frame.to_string())).await {
                        log::error!("WebSocket error to {addr}: {e}");
                        break;
                    }
                }

                _ = async {
                    match ticker.as_mut() {
                        Some(t) => { t.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Err(e) = ws_sender.send(Message::Ping(Vec::new().into())).await {
                        log::error!("Heartbeat to {addr} failed: {e}");
                        break;
                    }
                }
            }
        }

        session.close().await;
        stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    /// Shared engine, for inspecting room state.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            total_messages: self.stats.total_messages.load(Ordering::Relaxed),
            total_bytes: self.stats.total_bytes.load(Ordering::Relaxed),
            malformed_messages: self.stats.malformed_messages.load(Ordering::Relaxed),
            active_rooms: self.engine.room_count().await,
        }
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let server = SyncServer::with_defaults();
        assert_eq!(server.bind_addr(), "0.0.0.0:4000");
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:8080".to_string(),
            heartbeat_interval_secs: 0,
            max_message_bytes: 1024,
        };
        let server = SyncServer::new(config);
        assert_eq!(server.bind_addr(), "127.0.0.1:8080");
        assert_eq!(server.config().heartbeat_interval(), None);
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SyncServer::with_defaults();
        assert_eq!(server.stats().await, ServerStats::default());
    }

    #[tokio::test]
    async fn test_bind_error_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            bind_addr: taken.local_addr().unwrap().to_string(),
            ..ServerConfig::default()
        };
        let server = SyncServer::new(config);
        let err = server.run_until(async {}).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_serve_returns_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = SyncServer::with_defaults();
        server.serve(listener, async {}).await.unwrap();
    }
}
