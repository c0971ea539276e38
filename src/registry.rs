//! Session registry: which connection is known by which display name.
//!
//! The registry is owned by the dispatcher task and mutated only through
//! `&mut self`, so every call is atomic with respect to every other. Names
//! come back as owned snapshots; nothing outside ever borrows the storage.

use indexmap::IndexMap;

use crate::error::RegistryError;
use crate::protocol::ConnectionId;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    // Insertion order doubles as the order of every name list and fan-out.
    sessions: IndexMap<ConnectionId, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the session for `id`.
    ///
    /// The name is trimmed before it is stored. Two connections may register
    /// the same name. Overwriting keeps the entry's original position.
    pub fn register(&mut self, id: ConnectionId, display_name: &str) -> Result<(), RegistryError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        self.sessions.insert(id, name.to_string());
        Ok(())
    }

    /// Removes the session for `id`, returning its name. Unknown ids are a no-op.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        self.sessions.shift_remove(&id)
    }

    /// Like [`unregister`](Self::unregister) but reports unknown ids.
    pub fn try_unregister(&mut self, id: ConnectionId) -> Result<String, RegistryError> {
        self.unregister(id)
            .ok_or(RegistryError::UnknownConnection(id))
    }

    /// Snapshot of all display names in insertion order.
    pub fn list_names(&self) -> Vec<String> {
        self.sessions.values().cloned().collect()
    }

    pub fn name_for(&self, id: ConnectionId) -> Option<String> {
        self.sessions.get(&id).cloned()
    }

    /// Registered connection ids in insertion order.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_list_in_insertion_order() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(2), "Bob").unwrap();
        reg.register(ConnectionId(1), "Alice").unwrap();
        assert_eq!(reg.list_names(), vec!["Bob", "Alice"]);
        assert_eq!(reg.connections(), vec![ConnectionId(2), ConnectionId(1)]);
    }

    #[test]
    fn blank_names_are_rejected_without_change() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(1), "Alice").unwrap();

        assert_eq!(reg.register(ConnectionId(2), ""), Err(RegistryError::InvalidName));
        assert_eq!(reg.register(ConnectionId(2), "   "), Err(RegistryError::InvalidName));
        assert_eq!(reg.register(ConnectionId(1), "\t"), Err(RegistryError::InvalidName));

        assert_eq!(reg.list_names(), vec!["Alice"]);
        assert!(!reg.contains(ConnectionId(2)));
    }

    #[test]
    fn names_are_trimmed() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(1), "  Alice ").unwrap();
        assert_eq!(reg.name_for(ConnectionId(1)).as_deref(), Some("Alice"));
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(1), "Alice").unwrap();
        reg.register(ConnectionId(2), "Bob").unwrap();
        reg.register(ConnectionId(1), "Alicia").unwrap();
        assert_eq!(reg.list_names(), vec!["Alicia", "Bob"]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn duplicate_names_across_connections() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(1), "Sam").unwrap();
        reg.register(ConnectionId(2), "Sam").unwrap();
        assert_eq!(reg.list_names(), vec!["Sam", "Sam"]);

        assert_eq!(reg.unregister(ConnectionId(1)).as_deref(), Some("Sam"));
        assert_eq!(reg.list_names(), vec!["Sam"]);
        assert_eq!(reg.name_for(ConnectionId(2)).as_deref(), Some("Sam"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(1), "Alice").unwrap();
        reg.register(ConnectionId(2), "Bob").unwrap();
        reg.register(ConnectionId(3), "Carol").unwrap();

        assert_eq!(reg.unregister(ConnectionId(2)).as_deref(), Some("Bob"));
        assert_eq!(reg.unregister(ConnectionId(2)), None);
        assert_eq!(reg.unregister(ConnectionId(9)), None);
        assert_eq!(reg.list_names(), vec!["Alice", "Carol"]);
    }

    #[test]
    fn try_unregister_reports_unknown() {
        let mut reg = SessionRegistry::new();
        assert_eq!(
            reg.try_unregister(ConnectionId(4)),
            Err(RegistryError::UnknownConnection(ConnectionId(4)))
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshot_is_detached() {
        let mut reg = SessionRegistry::new();
        reg.register(ConnectionId(1), "Alice").unwrap();
        let snapshot = reg.list_names();
        reg.register(ConnectionId(2), "Bob").unwrap();
        reg.unregister(ConnectionId(1));
        assert_eq!(snapshot, vec!["Alice"]);
    }
}
