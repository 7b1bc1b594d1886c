//! Per-connection session state and inbound event dispatch.

use indexmap::IndexSet;

use crate::broadcast::Outbox;
use crate::engine::SyncEngine;
use crate::protocol::{ClientMessage, ConnectionId, ProtocolError};

/// One live client connection.
///
/// Owns the connection's outbox sender and remembers which rooms it joined,
/// so that closing the session can leave all of them.
pub struct Session {
    id: ConnectionId,
    outbox: Outbox,
    engine: SyncEngine,
    rooms: IndexSet<String>,
}

impl Session {
    pub fn new(engine: SyncEngine, outbox: Outbox) -> Self {
        Self::with_id(ConnectionId::new(), engine, outbox)
    }

    pub fn with_id(id: ConnectionId, engine: SyncEngine, outbox: Outbox) -> Self {
        Self {
            id,
            outbox,
            engine,
            rooms: IndexSet::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Rooms joined and not yet left, in join order.
    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    pub fn has_joined(&self, room_id: &str) -> bool {
        self.rooms.contains(room_id)
    }

    /// Decode one text frame and dispatch it.
    ///
    /// A frame that fails to decode is returned as an error and has no effect.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let msg = ClientMessage::decode(text)?;
        self.handle(msg).await;
        Ok(())
    }

    pub async fn handle(&mut self, msg: ClientMessage) {
        log::debug!("{} {} in room {}", self.id, msg.event_name(), msg.room_id());
        match msg {
            ClientMessage::JoinRoom(req) => {
                let room_id = req.room_id.clone();
                self.engine.join_room(self.id, &self.outbox, req).await;
                self.rooms.insert(room_id);
            }
            ClientMessage::LeaveRoom(req) => {
                let room_id = req.room_id.clone();
                let outcome = self.engine.leave_room(self.id, req).await;
                // Another user joined from this connection keeps it a member.
                if !outcome.still_bound(self.id) {
                    self.rooms.shift_remove(&room_id);
                }
            }
            ClientMessage::GetParticipants(req) => {
                self.engine.get_participants(&self.outbox, req).await;
            }
            ClientMessage::FileCreate(req) => {
                self.engine.file_create(req).await;
            }
            ClientMessage::FileRename(req) => {
                self.engine.file_rename(req).await;
            }
            ClientMessage::FileDelete(req) => {
                self.engine.file_delete(req).await;
            }
            ClientMessage::FileMove(req) => {
                self.engine.file_move(req).await;
            }
            ClientMessage::CodeChange(req) => {
                self.engine.code_change(self.id, req).await;
            }
        }
    }

    /// Leave every joined room as if the connection dropped.
    pub async fn close(self) {
        let Session { id, engine, rooms, .. } = self;
        log::debug!("{id} closing, leaving {} rooms", rooms.len());
        engine.disconnect(id, rooms).await;
    }
}
