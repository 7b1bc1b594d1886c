//! Room-scoped fan-out to connected sessions.
//!
//! Each session owns an unbounded outbox (mpsc) drained by its WebSocket
//! writer. A message is serialized once and the resulting `Arc<str>` is pushed
//! into every recipient's outbox, so fan-out never waits on a slow peer and
//! never drops a frame for a live one.
//!
//! Subscriptions are tracked here, separately from room state: a connection
//! stays subscribed to a room id until it leaves or disconnects, even if the
//! room itself is destroyed and recreated in between.
//!
//! `emit` is synchronous and takes only a short read lock, so it can be called
//! while a room's exclusive section is held. That is what makes the event
//! stream of a room follow the order in which its mutations were applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, ProtocolError, ServerMessage};

/// Outgoing frame queue of one session.
pub type Outbox = mpsc::UnboundedSender<Arc<str>>;

/// Who receives an emitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every subscriber, the originator included.
    Everyone,
    /// Every subscriber except the given connection.
    OthersThan(ConnectionId),
}

impl Audience {
    fn includes(&self, id: ConnectionId) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::OthersThan(origin) => *origin != id,
        }
    }
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub active_rooms: usize,
    pub active_subscriptions: usize,
}

/// Lock-free counters updated on the emit path.
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Subscribers of a single room.
#[derive(Default)]
pub struct BroadcastGroup {
    subscribers: HashMap<ConnectionId, Outbox>,
}

impl BroadcastGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the connection was already subscribed (its outbox is
    /// replaced).
    pub fn add_subscriber(&mut self, id: ConnectionId, outbox: Outbox) -> bool {
        self.subscribers.insert(id, outbox).is_none()
    }

    pub fn remove_subscriber(&mut self, id: &ConnectionId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Push `frame` to every subscriber in `audience`.
    /// Returns `(delivered, dropped)`; a drop means the session already hung up.
    pub fn deliver(&self, frame: &Arc<str>, audience: Audience) -> (usize, usize) {
        let mut delivered = 0;
        let mut dropped = 0;
        for (id, outbox) in &self.subscribers {
            if !audience.includes(*id) {
                continue;
            }
            if outbox.send(Arc::clone(frame)).is_ok() {
                delivered += 1;
            } else {
                dropped += 1;
            }
        }
        (delivered, dropped)
    }
}

/// Maps room ids to their broadcast groups.
#[derive(Default)]
pub struct Dispatcher {
    groups: RwLock<HashMap<String, BroadcastGroup>>,
    stats: AtomicBroadcastStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `id` to `room_id`. Returns `false` if it already was.
    pub fn subscribe(&self, room_id: &str, id: ConnectionId, outbox: Outbox) -> bool {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups.entry(room_id.to_string()).or_default().add_subscriber(id, outbox)
    }

    /// Drop the subscription; empty groups are removed.
    pub fn unsubscribe(&self, room_id: &str, id: &ConnectionId) -> bool {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let Some(group) = groups.get_mut(room_id) else {
            return false;
        };
        let removed = group.remove_subscriber(id);
        if group.is_empty() {
            groups.remove(room_id);
        }
        removed
    }

    /// Drop every subscription held by `id`. Returns the affected room ids.
    pub fn unsubscribe_all(&self, id: &ConnectionId) -> Vec<String> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let mut rooms = Vec::new();
        groups.retain(|room_id, group| {
            if group.remove_subscriber(id) {
                rooms.push(room_id.clone());
            }
            !group.is_empty()
        });
        rooms
    }

    /// Serialize `msg` once and fan it out to the room's subscribers.
    /// Returns the number of outboxes it was pushed into.
    pub fn emit(&self, room_id: &str, msg: &ServerMessage, audience: Audience) -> Result<usize, ProtocolError> {
        let frame: Arc<str> = Arc::from(msg.encode()?);
        Ok(self.emit_raw(room_id, &frame, audience))
    }

    /// Fan out a pre-encoded frame.
    pub fn emit_raw(&self, room_id: &str, frame: &Arc<str>, audience: Audience) -> usize {
        let (delivered, dropped) = {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            match groups.get(room_id) {
                Some(group) => group.deliver(frame, audience),
                None => (0, 0),
            }
        };

        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.frames_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        if dropped > 0 {
            self.stats.frames_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            log::debug!("{dropped} closed outboxes in room {room_id}");
        }
        delivered
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.get(room_id).map_or(0, BroadcastGroup::len)
    }

    pub fn is_subscribed(&self, room_id: &str, id: &ConnectionId) -> bool {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.get(room_id).is_some_and(|g| g.contains(id))
    }

    /// Number of room ids with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.groups.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn stats(&self) -> BroadcastStats {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            frames_delivered: self.stats.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            active_rooms: groups.len(),
            active_subscriptions: groups.values().map(BroadcastGroup::len).sum(),
        }
    }
}
