//! Participant tracking for a room.
//!
//! A room holds at most one [`Participant`] per `userId`. A second join with
//! the same `userId` (a reconnect, or a second tab) takes over the entry: it
//! keeps its position in the list and gets the newer connection id.
//!
//! The join/leave event sequences are built here as well so that every path
//! (explicit leave, disconnect) emits exactly the same messages:
//!
//! ```text
//! join   ─► user-joined (room) ─► files-update (joiner only) ─► participants-update (room)
//! leave  ─► participants-update (room) ─► user-left (room)
//! ```

use indexmap::IndexMap;

use crate::protocol::{ConnectionId, Participant, ServerMessage};

/// Result of [`ParticipantSet::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The user was not present before.
    Joined,
    /// The user was present; their entry now points at the new connection.
    Rejoined { previous_connection: ConnectionId },
}

/// Participants of one room, keyed by `userId`, in join order.
#[derive(Debug, Clone, Default)]
pub struct ParticipantSet {
    by_user: IndexMap<String, Participant>,
}

impl ParticipantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `participant`, or overwrite the existing entry for its `userId`.
    pub fn upsert(&mut self, participant: Participant) -> Upsert {
        match self.by_user.insert(participant.user_id.clone(), participant) {
            None => Upsert::Joined,
            Some(previous) => Upsert::Rejoined {
                previous_connection: previous.connection_id,
            },
        }
    }

    pub fn remove_user(&mut self, user_id: &str) -> Option<Participant> {
        self.by_user.shift_remove(user_id)
    }

    /// Remove every entry bound to `connection_id`.
    ///
    /// Entries that were taken over by a newer connection are not touched.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Vec<Participant> {
        let mut removed = Vec::new();
        self.by_user.retain(|_, p| {
            if p.connection_id == connection_id {
                removed.push(p.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn get(&self, user_id: &str) -> Option<&Participant> {
        self.by_user.get(user_id)
    }

    pub fn by_connection(&self, connection_id: ConnectionId) -> impl Iterator<Item = &Participant> {
        self.by_user
            .values()
            .filter(move |p| p.connection_id == connection_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.by_user.values()
    }

    pub fn to_vec(&self) -> Vec<Participant> {
        self.by_user.values().cloned().collect()
    }
}

/// Messages produced by a join, in emission order.
#[derive(Debug, Clone)]
pub struct JoinEvents {
    /// Room-wide, joiner included.
    pub user_joined: ServerMessage,
    /// Joining connection only.
    pub files_reply: ServerMessage,
    /// Room-wide.
    pub participants_update: ServerMessage,
}

impl JoinEvents {
    pub fn new(
        room_id: &str,
        joined: &Participant,
        files: &[coedit_core::FileNode],
        participants: &ParticipantSet,
    ) -> Self {
        Self {
            user_joined: ServerMessage::user_joined(room_id, &joined.user_id, joined.name.clone()),
            files_reply: ServerMessage::files_update(room_id, files),
            participants_update: ServerMessage::participants_update(room_id, participants.to_vec()),
        }
    }
}

/// Room-wide messages produced by one departure, in emission order.
///
/// `departed` is the removed entry, if any; its name is the user's last known
/// display name.
pub fn leave_events(
    room_id: &str,
    user_id: &str,
    departed: Option<&Participant>,
    participants: &ParticipantSet,
) -> [ServerMessage; 2] {
    [
        ServerMessage::participants_update(room_id, participants.to_vec()),
        ServerMessage::user_left(room_id, user_id, departed.and_then(|p| p.name.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(user: &str, conn: ConnectionId) -> Participant {
        Participant::new(user, Some(user.to_uppercase()), conn)
    }

    #[test]
    fn test_upsert_new_user() {
        let mut set = ParticipantSet::new();
        let conn = ConnectionId::new();
        assert_eq!(set.upsert(participant("a", conn)), Upsert::Joined);
        assert_eq!(set.len(), 1);
        assert!(set.contains("a"));
    }

    #[test]
    fn test_rejoin_overwrites_connection() {
        let mut set = ParticipantSet::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        set.upsert(participant("a", first));
        set.upsert(participant("b", first));
        let outcome = set.upsert(Participant::new("a", Some("Alice".into()), second));

        assert_eq!(outcome, Upsert::Rejoined { previous_connection: first });
        assert_eq!(set.len(), 2);
        let a = set.get("a").unwrap();
        assert_eq!(a.connection_id, second);
        assert_eq!(a.name.as_deref(), Some("Alice"));
        // Position is kept.
        let order: Vec<&str> = set.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_remove_user() {
        let mut set = ParticipantSet::new();
        let conn = ConnectionId::new();
        set.upsert(participant("a", conn));
        set.upsert(participant("b", conn));
        set.upsert(participant("c", conn));

        let removed = set.remove_user("b").unwrap();
        assert_eq!(removed.user_id, "b");
        let order: Vec<&str> = set.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(order, vec!["a", "c"]);
        assert!(set.remove_user("b").is_none());
    }

    #[test]
    fn test_remove_connection_skips_taken_over_entries() {
        let mut set = ParticipantSet::new();
        let old = ConnectionId::new();
        let new = ConnectionId::new();
        set.upsert(participant("a", old));
        set.upsert(participant("a", new));
        set.upsert(participant("b", old));

        let removed = set.remove_connection(old);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].user_id, "b");
        assert!(set.contains("a"));
        assert_eq!(set.by_connection(new).count(), 1);
        assert_eq!(set.by_connection(old).count(), 0);
    }

    #[test]
    fn test_join_events() {
        let mut set = ParticipantSet::new();
        let joined = participant("a", ConnectionId::new());
        set.upsert(joined.clone());

        let events = JoinEvents::new("R1", &joined, &[], &set);
        assert_eq!(events.user_joined, ServerMessage::user_joined("R1", "a", Some("A".into())));
        assert_eq!(events.files_reply, ServerMessage::files_update("R1", &[]));
        assert_eq!(events.participants_update, ServerMessage::participants_update("R1", vec![joined]));
    }

    #[test]
    fn test_leave_events_carry_last_known_name() {
        let mut set = ParticipantSet::new();
        set.upsert(participant("a", ConnectionId::new()));
        let departed = set.remove_user("a");

        let [update, left] = leave_events("R1", "a", departed.as_ref(), &set);
        assert_eq!(update, ServerMessage::participants_update("R1", vec![]));
        assert_eq!(left, ServerMessage::user_left("R1", "a", Some("A".into())));
    }

    #[test]
    fn test_leave_events_unknown_user_has_no_name() {
        let set = ParticipantSet::new();
        let [_, left] = leave_events("R1", "ghost", None, &set);
        assert_eq!(left, ServerMessage::user_left("R1", "ghost", None));
    }
}
