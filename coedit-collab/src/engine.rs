//! The sync engine: room store plus dispatcher, one handle per server.
//!
//! Every operation here follows the same shape: mutate the room inside the
//! store's exclusive section and, from within that section, hand the
//! resulting events to the dispatcher. Direct replies (the joiner's private
//! `files-update`, `get-participants`) go straight to the caller's outbox.

use std::sync::Arc;

use coedit_core::{FileNode, FileOp};

use crate::broadcast::{Audience, Dispatcher, Outbox};
use crate::presence::{leave_events, JoinEvents};
use crate::protocol::{
    CodeChange, ConnectionId, FileCreate, FileDelete, FileMove, FileRename, GetParticipants, JoinRoom,
    LeaveRoom, Participant, ServerMessage,
};
use crate::store::{LeaveKey, LeaveOutcome, RoomSnapshot, RoomStore};

/// Cheaply clonable handle shared by all connections.
#[derive(Clone, Default)]
pub struct SyncEngine {
    store: Arc<RoomStore>,
    dispatcher: Arc<Dispatcher>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn broadcast(&self, room_id: &str, msg: &ServerMessage, audience: Audience) {
        match self.dispatcher.emit(room_id, msg, audience) {
            Ok(n) => log::trace!("{} to {n} subscribers of {room_id}", msg.event_name()),
            Err(e) => log::error!("failed to broadcast {}: {e}", msg.event_name()),
        }
    }

    fn reply(outbox: &Outbox, msg: &ServerMessage) {
        match msg.encode() {
            Ok(text) => {
                // The session may already be gone; nothing to do then.
                let _ = outbox.send(Arc::from(text));
            }
            Err(e) => log::error!("failed to encode {}: {e}", msg.event_name()),
        }
    }

    /// Subscribe the connection, upsert the participant and emit
    /// `user-joined`, the joiner's `files-update` and `participants-update`.
    pub async fn join_room(&self, conn: ConnectionId, outbox: &Outbox, req: JoinRoom) -> Vec<Participant> {
        let JoinRoom { room_id, user_id, name } = req;
        self.dispatcher.subscribe(&room_id, conn, outbox.clone());

        let participant = Participant::new(user_id, name, conn);
        let users = self
            .store
            .join(&room_id, participant, |room, joined, _| {
                let events = JoinEvents::new(&room_id, joined, room.files().roots(), room.participants());
                self.broadcast(&room_id, &events.user_joined, Audience::Everyone);
                Self::reply(outbox, &events.files_reply);
                self.broadcast(&room_id, &events.participants_update, Audience::Everyone);
            })
            .await;

        log::info!("{conn} joined room {room_id} ({} participants)", users.len());
        users
    }

    /// Remove `user_id` from the room and emit `participants-update` then
    /// `user-left`.
    ///
    /// The connection's subscription ends unless another participant in the
    /// room is still bound to it; callers use [`LeaveOutcome::still_bound`]
    /// to tell whether the connection is still a member.
    pub async fn leave_room(&self, conn: ConnectionId, req: LeaveRoom) -> LeaveOutcome {
        let LeaveRoom { room_id, user_id } = req;
        let outcome = self
            .store
            .leave(&room_id, LeaveKey::User(user_id.clone()), |room, removed| {
                for msg in leave_events(&room_id, &user_id, removed.first(), room.participants()) {
                    self.broadcast(&room_id, &msg, Audience::Everyone);
                }
            })
            .await;
        if !outcome.still_bound(conn) {
            self.dispatcher.unsubscribe(&room_id, &conn);
        }

        log::info!("{user_id} left room {room_id}");
        outcome
    }

    /// Reply with the room's participants; unknown rooms yield an empty list.
    pub async fn get_participants(&self, outbox: &Outbox, req: GetParticipants) {
        let users = self.store.participants(&req.room_id).await;
        Self::reply(outbox, &ServerMessage::participants_update(&req.room_id, users));
    }

    async fn apply_and_broadcast(&self, room_id: &str, op: FileOp) -> Vec<FileNode> {
        self.store
            .apply_file_op(room_id, op, |room, _| {
                let msg = ServerMessage::files_update(room_id, room.files().roots());
                self.broadcast(room_id, &msg, Audience::Everyone);
            })
            .await
    }

    pub async fn file_create(&self, req: FileCreate) -> Vec<FileNode> {
        let op = FileOp::Create {
            node: FileNode::new(req.file_id, req.name, req.kind),
            parent_id: req.parent_id,
        };
        self.apply_and_broadcast(&req.room_id, op).await
    }

    pub async fn file_rename(&self, req: FileRename) -> Vec<FileNode> {
        let op = FileOp::Rename {
            id: req.file_id,
            name: req.name,
        };
        self.apply_and_broadcast(&req.room_id, op).await
    }

    pub async fn file_delete(&self, req: FileDelete) -> Vec<FileNode> {
        let op = FileOp::Delete { id: req.file_id };
        self.apply_and_broadcast(&req.room_id, op).await
    }

    pub async fn file_move(&self, req: FileMove) -> Vec<FileNode> {
        let op = FileOp::Move {
            id: req.file_id,
            target_folder_id: req.target_folder_id,
        };
        self.apply_and_broadcast(&req.room_id, op).await
    }

    /// Store the new content and relay it to everyone but the sender.
    pub async fn code_change(&self, conn: ConnectionId, req: CodeChange) {
        let CodeChange { room_id, file_id, code } = req;
        let relay = ServerMessage::code_change(&room_id, &file_id, &code);
        let op = FileOp::UpdateContent { id: file_id, content: code };
        self.store
            .apply_file_op(&room_id, op, |_, _| {
                self.broadcast(&room_id, &relay, Audience::OthersThan(conn));
            })
            .await;
    }

    /// Implicit leave of every room in `rooms`, then drop all of the
    /// connection's subscriptions.
    ///
    /// Only participants still bound to `conn` are removed; a user whose
    /// entry was taken over by a newer connection stays.
    pub async fn disconnect<I>(&self, conn: ConnectionId, rooms: I)
    where
        I: IntoIterator<Item = String>,
    {
        for room_id in rooms {
            let outcome = self
                .store
                .leave(&room_id, LeaveKey::Connection(conn), |room, removed| {
                    for departed in removed {
                        let events = leave_events(&room_id, &departed.user_id, Some(departed), room.participants());
                        for msg in events {
                            self.broadcast(&room_id, &msg, Audience::Everyone);
                        }
                    }
                })
                .await;
            for departed in &outcome.removed {
                log::info!("{} dropped from room {room_id}", departed.user_id);
            }
        }
        self.dispatcher.unsubscribe_all(&conn);
    }

    pub async fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.store.snapshot(room_id).await
    }

    pub async fn room_count(&self) -> usize {
        self.store.room_count().await
    }
}
