//! Room registry.
//!
//! Each room sits behind its own `RwLock`; the registry map has a separate
//! lock that is only held for lookups, inserts and removals, so operations on
//! different rooms never wait on each other.
//!
//! Lifecycle: a room is created lazily by the first operation naming it and
//! destroyed when its participant set goes from non-empty to empty. A room
//! that ends an operation with neither participants nor files is dropped too,
//! since it is indistinguishable from an absent one; a room that only holds
//! files stays until a participant has come and gone. Destruction happens
//! under the room's own write lock: the room is marked `closed`, then
//! its registry entry is removed (only if the entry still points at this room).
//! Anyone who acquires a room and finds it closed goes back to the registry,
//! which by then either has no entry or a fresh room. Lock order is always
//! room → registry; the registry lock is never held while waiting for a room.
//!
//! Mutating calls take an `emit` closure that runs before the room lock is
//! released, so whatever it enqueues is ordered exactly like the mutations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coedit_core::{FileNode, FileOp, FileTree};
use tokio::sync::RwLock;

use crate::presence::{ParticipantSet, Upsert};
use crate::protocol::{ConnectionId, Participant};

/// Shared handle to one room.
pub type RoomHandle = Arc<RwLock<Room>>;

/// State of a single collaboration room.
#[derive(Debug)]
pub struct Room {
    room_id: String,
    files: FileTree,
    participants: ParticipantSet,
    closed: bool,
}

impl Room {
    fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            files: FileTree::new(),
            participants: ParticipantSet::new(),
            closed: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn files(&self) -> &FileTree {
        &self.files
    }

    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    /// A closed room has been removed from the registry and must not be used.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            files: self.files.roots().to_vec(),
            participants: self.participants.to_vec(),
        }
    }
}

/// Point-in-time copy of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub files: Vec<FileNode>,
    pub participants: Vec<Participant>,
}

/// How `leave` picks the participant to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveKey {
    User(String),
    Connection(ConnectionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Entries removed by this call (empty if nobody matched).
    pub removed: Vec<Participant>,
    /// Participants remaining afterwards.
    pub participants: Vec<Participant>,
    /// Whether the room was destroyed by this call.
    pub room_closed: bool,
}

impl LeaveOutcome {
    /// Whether any remaining participant is still bound to `conn`.
    pub fn still_bound(&self, conn: ConnectionId) -> bool {
        self.participants.iter().any(|p| p.connection_id == conn)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub rooms_created: u64,
    pub rooms_destroyed: u64,
    pub active_rooms: usize,
}

/// Registry of all live rooms.
#[derive(Default)]
pub struct RoomStore {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    rooms_created: AtomicU64,
    rooms_destroyed: AtomicU64,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room for `room_id`, creating an empty one if absent.
    pub async fn get_or_create(&self, room_id: &str) -> RoomHandle {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(room_id) {
            return Arc::clone(room);
        }

        let room = Arc::new(RwLock::new(Room::new(room_id)));
        rooms.insert(room_id.to_string(), Arc::clone(&room));
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
        log::info!("room {room_id} created");
        room
    }

    async fn lookup(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Run `f` with exclusive access to a live room, then destroy the room if
    /// `f` removed its last participant, or if it is left entirely empty.
    ///
    /// With `create == false` an unknown room yields `None` and `f` is not run.
    pub async fn with_live_room<R>(
        &self,
        room_id: &str,
        create: bool,
        f: impl FnOnce(&mut Room) -> R,
    ) -> Option<R> {
        let (handle, mut room) = loop {
            let handle = if create {
                self.get_or_create(room_id).await
            } else {
                self.lookup(room_id).await?
            };

            let room = Arc::clone(&handle).write_owned().await;
            // A closed room was destroyed while we waited; its entry is gone.
            if !room.closed {
                break (handle, room);
            }
        };

        let was_populated = !room.participants.is_empty();
        let result = f(&mut *room);

        if room.participants.is_empty() && (was_populated || room.files.is_empty()) {
            room.closed = true;
            self.remove_entry(room_id, &handle).await;
        }
        Some(result)
    }

    /// Run `f` with shared access to an existing room.
    pub async fn read<R>(&self, room_id: &str, f: impl FnOnce(&Room) -> R) -> Option<R> {
        let handle = self.lookup(room_id).await?;
        let room = handle.read().await;
        if room.closed {
            return None;
        }
        Some(f(&room))
    }

    async fn remove_entry(&self, room_id: &str, handle: &RoomHandle) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(room_id).is_some_and(|h| Arc::ptr_eq(h, handle)) {
            rooms.remove(room_id);
            self.rooms_destroyed.fetch_add(1, Ordering::Relaxed);
            log::info!("room {room_id} destroyed");
        }
    }

    /// Apply a tree mutation. `emit` receives the room and whether the forest
    /// changed. Returns the resulting forest.
    pub async fn apply_file_op(
        &self,
        room_id: &str,
        op: FileOp,
        emit: impl FnOnce(&Room, bool),
    ) -> Vec<FileNode> {
        self.with_live_room(room_id, true, |room| {
            let name = op.name();
            let changed = op.apply(&mut room.files);
            log::debug!("{name} in room {room_id}: changed={changed}");
            emit(room, changed);
            room.files.roots().to_vec()
        })
        .await
        .unwrap_or_default()
    }

    /// Add or refresh a participant. Returns the full participant list.
    pub async fn join(
        &self,
        room_id: &str,
        participant: Participant,
        emit: impl FnOnce(&Room, &Participant, Upsert),
    ) -> Vec<Participant> {
        self.with_live_room(room_id, true, |room| {
            let joined = participant.clone();
            let upsert = room.participants.upsert(participant);
            emit(room, &joined, upsert);
            room.participants.to_vec()
        })
        .await
        .unwrap_or_default()
    }

    /// Remove a participant.
    ///
    /// A leave by user id creates the room if needed so `emit` always runs;
    /// a leave by connection only touches rooms that exist.
    pub async fn leave(
        &self,
        room_id: &str,
        key: LeaveKey,
        emit: impl FnOnce(&Room, &[Participant]),
    ) -> LeaveOutcome {
        let create = matches!(key, LeaveKey::User(_));
        let outcome = self
            .with_live_room(room_id, create, |room| {
                let removed: Vec<Participant> = match &key {
                    LeaveKey::User(user_id) => room.participants.remove_user(user_id).into_iter().collect(),
                    LeaveKey::Connection(conn) => room.participants.remove_connection(*conn),
                };
                emit(room, &removed);
                // Mirrors the destroy rule in `with_live_room`.
                let closing = room.participants.is_empty() && (!removed.is_empty() || room.files.is_empty());
                (removed, room.participants.to_vec(), closing)
            })
            .await;

        match outcome {
            Some((removed, participants, room_closed)) => LeaveOutcome {
                removed,
                participants,
                room_closed,
            },
            None => LeaveOutcome {
                removed: Vec::new(),
                participants: Vec::new(),
                room_closed: false,
            },
        }
    }

    /// Read-only copy of a room; never creates one.
    pub async fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.read(room_id, Room::snapshot).await
    }

    /// Current participants; empty for unknown rooms.
    pub async fn participants(&self, room_id: &str) -> Vec<Participant> {
        self.read(room_id, |room| room.participants.to_vec())
            .await
            .unwrap_or_default()
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_destroyed: self.rooms_destroyed.load(Ordering::Relaxed),
            active_rooms: self.room_count().await,
        }
    }
}
