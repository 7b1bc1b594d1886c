//! WebSocket client for the sync server.
//!
//! Provides:
//! - Connection with a bounded number of attempts and a fixed delay between them
//! - Typed senders for every client event
//! - A channel of decoded server events
//! - Offline queue: messages sent while disconnected are replayed on connect

use std::collections::VecDeque;
use std::sync::Arc;

use coedit_core::NodeKind;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::config::ClientConfig;
use crate::protocol::{
    CodeChange, FileCreate, FileDelete, FileMove, FileRename, GetParticipants, JoinRoom, LeaveRoom,
    ClientMessage, ProtocolError, ServerMessage,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
}

/// Messages sent while disconnected, oldest first.
pub struct OfflineQueue {
    queue: VecDeque<ClientMessage>,
    max_size: usize,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Returns `false` when full; the message is not queued then.
    pub fn enqueue(&mut self, msg: ClientMessage) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(msg);
        true
    }

    pub fn drain(&mut self) -> Vec<ClientMessage> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// The collaboration client.
pub struct CollabClient {
    config: ClientConfig,

    state: Arc<RwLock<ConnectionState>>,

    offline_queue: Arc<Mutex<OfflineQueue>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::UnboundedSender<String>>,

    event_rx: Option<mpsc::Receiver<ClientEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<ClientEvent>,
}

impl CollabClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let offline_queue = OfflineQueue::new(config.offline_queue_capacity);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            offline_queue: Arc::new(Mutex::new(offline_queue)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Client for `url` with default retry settings.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(ClientConfig::new(url))
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Connect, retrying up to `reconnect_attempts` times.
    ///
    /// On success, spawns the reader and writer tasks and replays the offline
    /// queue.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let attempts = self.config.reconnect_attempts.max(1);
        let mut last_error = None;
        let mut ws_stream = None;
        for attempt in 1..=attempts {
            match tokio_tungstenite::connect_async(self.config.url.as_str()).await {
                Ok((stream, _)) => {
                    ws_stream = Some(stream);
                    break;
                }
                Err(e) => {
                    log::warn!("Connection attempt {attempt}/{attempts} to {} failed: {e}", self.config.url);
                    last_error = Some(e);
                    if attempt < attempts {
                        *self.state.write().await = ConnectionState::Reconnecting;
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        }

        let Some(ws_stream) = ws_stream else {
            *self.state.write().await = ConnectionState::Disconnected;
            return Err(last_error.map_or(ProtocolError::ConnectionClosed, ProtocolError::from));
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Replay before anything else can be sent on the new connection
        {
            let mut queue = self.offline_queue.lock().await;
            let queued = queue.drain();
            if !queued.is_empty() {
                log::info!("Replaying {} queued messages", queued.len());
            }
            for msg in queued {
                out_tx.send(msg.encode()?).map_err(|_| ProtocolError::ConnectionClosed)?;
            }
        }
        self.outgoing_tx = Some(out_tx);

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(ClientEvent::Connected).await;

        // Reader task: decode incoming frames into events
        let event_tx = self.event_tx.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerMessage::decode(text.as_str()) {
                        Ok(server_msg) => {
                            let _ = event_tx.send(ClientEvent::Message(server_msg)).await;
                        }
                        Err(e) => log::warn!("Ignoring server message: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ClientEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Close the connection. Later sends are queued.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Send a message, or queue it while disconnected.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ProtocolError> {
        let state = *self.state.read().await;
        if state == ConnectionState::Connected {
            if let Some(tx) = &self.outgoing_tx {
                let text = msg.encode()?;
                if tx.send(text).is_ok() {
                    return Ok(());
                }
            }
        }

        let mut queue = self.offline_queue.lock().await;
        if queue.enqueue(msg) {
            Ok(())
        } else {
            Err(ProtocolError::ConnectionClosed)
        }
    }

    pub async fn join_room(&self, room_id: &str, user_id: &str, name: Option<&str>) -> Result<(), ProtocolError> {
        self.send(ClientMessage::JoinRoom(JoinRoom {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            name: name.map(str::to_string),
        }))
        .await
    }

    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<(), ProtocolError> {
        self.send(ClientMessage::LeaveRoom(LeaveRoom {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        }))
        .await
    }

    pub async fn get_participants(&self, room_id: &str) -> Result<(), ProtocolError> {
        self.send(ClientMessage::GetParticipants(GetParticipants {
            room_id: room_id.to_string(),
        }))
        .await
    }

    pub async fn create_file(
        &self,
        room_id: &str,
        file_id: &str,
        name: &str,
        kind: NodeKind,
        parent_id: Option<&str>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::FileCreate(FileCreate {
            room_id: room_id.to_string(),
            file_id: file_id.to_string(),
            name: name.to_string(),
            kind,
            parent_id: parent_id.map(str::to_string),
        }))
        .await
    }

    pub async fn rename_file(&self, room_id: &str, file_id: &str, name: &str) -> Result<(), ProtocolError> {
        self.send(ClientMessage::FileRename(FileRename {
            room_id: room_id.to_string(),
            file_id: file_id.to_string(),
            name: name.to_string(),
        }))
        .await
    }

    pub async fn delete_file(&self, room_id: &str, file_id: &str) -> Result<(), ProtocolError> {
        self.send(ClientMessage::FileDelete(FileDelete {
            room_id: room_id.to_string(),
            file_id: file_id.to_string(),
        }))
        .await
    }

    pub async fn move_file(
        &self,
        room_id: &str,
        file_id: &str,
        target_folder_id: Option<&str>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::FileMove(FileMove {
            room_id: room_id.to_string(),
            file_id: file_id.to_string(),
            target_folder_id: target_folder_id.map(str::to_string),
        }))
        .await
    }

    pub async fn code_change(&self, room_id: &str, file_id: &str, code: &str) -> Result<(), ProtocolError> {
        self.send(ClientMessage::CodeChange(CodeChange {
            room_id: room_id.to_string(),
            file_id: file_id.to_string(),
            code: code.to_string(),
        }))
        .await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().await.len()
    }
}
