//! In-memory presence tracking. Lives exactly as long as the process;
//! rebuilt empty on restart, which is fine for live-connection state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub connection_id: Uuid,
    pub room_id: String,
    pub display_name: String,
}

/// Maps each live connection to the one room it currently occupies.
/// The gateway is the only writer; every call is atomic under the lock.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<Mutex<HashMap<Uuid, PresenceEntry>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Replacing is an implicit leave-then-join; the
    /// gateway owes the old room its leave notification before calling this
    /// for a new room.
    pub fn register(&self, connection_id: Uuid, room_id: &str, display_name: &str) {
        self.entries.lock().insert(
            connection_id,
            PresenceEntry {
                connection_id,
                room_id: room_id.to_owned(),
                display_name: display_name.to_owned(),
            },
        );
    }

    /// Removes and returns the prior entry. Duplicate disconnects land here
    /// with nothing to remove and that is not an error.
    pub fn unregister(&self, connection_id: Uuid) -> Option<PresenceEntry> {
        self.entries.lock().remove(&connection_id)
    }

    /// Distinct display names in a room, sorted. Two sessions under the same
    /// name collapse to one entry.
    pub fn list_room(&self, room_id: &str) -> Vec<String> {
        let entries = self.entries.lock();
        let names: BTreeSet<&str> = entries
            .values()
            .filter(|e| e.room_id == room_id)
            .map(|e| e.display_name.as_str())
            .collect();
        names.into_iter().map(str::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_collapse() {
        let presence = PresenceRegistry::new();
        presence.register(Uuid::now_v7(), "lobby", "Alice");
        presence.register(Uuid::now_v7(), "lobby", "Alice");
        presence.register(Uuid::now_v7(), "lobby", "Bob");

        assert_eq!(presence.list_room("lobby"), vec!["Alice", "Bob"]);
    }

    #[test]
    fn unregister_unknown_is_a_noop() {
        let presence = PresenceRegistry::new();
        assert_eq!(presence.unregister(Uuid::now_v7()), None);
    }

    #[test]
    fn register_replaces_prior_room() {
        let presence = PresenceRegistry::new();
        let conn = Uuid::now_v7();
        presence.register(conn, "lobby", "Alice");
        presence.register(conn, "den", "Alice");

        assert!(presence.list_room("lobby").is_empty());
        assert_eq!(presence.list_room("den"), vec!["Alice"]);

        let prior = presence.unregister(conn).unwrap();
        assert_eq!(prior.room_id, "den");
        assert_eq!(presence.unregister(conn), None);
    }
}
