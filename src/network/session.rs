//! Server-side session state.
//!
//! [`SyncSession`] tracks who is connected, who is logged in, and which entries are locked by a
//! change that not every client has confirmed yet. It is plain data: the server's mutation thread
//! owns the only instance, so nothing here is synchronised.
//!
//! # Lifecycle of a client
//!
//! ```text
//! connect ──► unapproved ──login──► unapproved + username ──confirm──► approved
//!     │                                                                    │
//!     └────────────────────────── disconnect ◄─────────────────────────────┘
//! ```
//!
//! Unapproved clients may not modify anything. A client is approved by the first confirmation it
//! sends after logging in, which acknowledges the initial mapping snapshot.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
};

use crate::{network::SyncId, translation::Entry, Error, Result};

/// Identifies one connection for the lifetime of the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Wraps a raw connection number.
    #[must_use]
    pub fn new(id: u64) -> Self {
        ClientId(id)
    }

    /// The raw connection number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Roster, usernames and lock tables of a running server.
#[derive(Debug)]
pub struct SyncSession {
    clients: BTreeSet<ClientId>,
    usernames: HashMap<ClientId, String>,
    unapproved: HashSet<ClientId>,
    sync_ids: HashMap<Entry, SyncId>,
    locked_entries: HashMap<SyncId, Entry>,
    confirmations: HashMap<SyncId, HashSet<ClientId>>,
    next_sync_id: SyncId,
}

impl Default for SyncSession {
    fn default() -> Self {
        SyncSession {
            clients: BTreeSet::new(),
            usernames: HashMap::new(),
            unapproved: HashSet::new(),
            sync_ids: HashMap::new(),
            locked_entries: HashMap::new(),
            confirmations: HashMap::new(),
            next_sync_id: 1,
        }
    }
}

impl SyncSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        SyncSession::default()
    }

    /// Adds a freshly accepted connection. It starts out unapproved.
    pub fn connect(&mut self, client: ClientId) {
        self.clients.insert(client);
        self.unapproved.insert(client);
    }

    /// Removes a client from the roster and from every confirmation set, releasing locks that no
    /// longer wait for anyone. Returns the client's username if it had logged in.
    pub fn disconnect(&mut self, client: ClientId) -> Option<String> {
        self.clients.remove(&client);
        self.unapproved.remove(&client);

        let emptied: Vec<SyncId> = self
            .confirmations
            .iter_mut()
            .filter_map(|(sync_id, waiting)| {
                (waiting.remove(&client) && waiting.is_empty()).then_some(*sync_id)
            })
            .collect();
        for sync_id in emptied {
            self.release(sync_id);
        }

        self.usernames.remove(&client)
    }

    /// Returns true if `client` is connected.
    #[must_use]
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.contains(&client)
    }

    /// Every connected client, in connection order.
    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.iter().copied()
    }

    /// Every client that has logged in, in connection order.
    pub fn logged_in(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients
            .iter()
            .copied()
            .filter(|client| self.usernames.contains_key(client))
    }

    /// Returns true if a connected client already uses `username`.
    #[must_use]
    pub fn is_username_taken(&self, username: &str) -> bool {
        self.usernames.values().any(|taken| taken == username)
    }

    /// Records the username of a logged in client.
    pub fn set_username(&mut self, client: ClientId, username: impl Into<String>) {
        self.usernames.insert(client, username.into());
    }

    /// The username of `client`, if it has logged in.
    #[must_use]
    pub fn username(&self, client: ClientId) -> Option<&str> {
        self.usernames.get(&client).map(String::as_str)
    }

    /// Finds the client logged in as `username`.
    #[must_use]
    pub fn client_by_username(&self, username: &str) -> Option<ClientId> {
        self.usernames
            .iter()
            .find(|(_, name)| *name == username)
            .map(|(client, _)| *client)
    }

    /// Every username, sorted.
    #[must_use]
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.usernames.values().cloned().collect();
        names.sort();
        names
    }

    /// Returns true if `client` has confirmed the initial snapshot.
    #[must_use]
    pub fn is_approved(&self, client: ClientId) -> bool {
        self.clients.contains(&client) && !self.unapproved.contains(&client)
    }

    /// Returns true if `client` may change `entry` now.
    ///
    /// Unapproved clients may not change anything. Approved clients are locked out of an entry
    /// while a change to it waits for their confirmation.
    #[must_use]
    pub fn can_modify_entry(&self, client: ClientId, entry: &Entry) -> bool {
        if !self.is_approved(client) {
            return false;
        }

        self.sync_ids
            .get(entry)
            .and_then(|sync_id| self.confirmations.get(sync_id))
            .map_or(true, |waiting| !waiting.contains(&client))
    }

    /// Locks `entry` behind a fresh sync id that every logged in client except `excluded` must
    /// confirm. A previous lock of the same entry is superseded.
    ///
    /// If nobody else is logged in the id is still allocated but no lock is recorded.
    ///
    /// # Errors
    /// Returns [`Error::SyncIdsExhausted`] if every sync id is held by an outstanding lock.
    pub fn lock_entry(&mut self, excluded: ClientId, entry: &Entry) -> Result<SyncId> {
        let sync_id = self.allocate_sync_id()?;

        if let Some(previous) = self.sync_ids.remove(entry) {
            self.release(previous);
        }

        let waiting: HashSet<ClientId> = self
            .logged_in()
            .filter(|client| *client != excluded)
            .collect();
        if !waiting.is_empty() {
            self.sync_ids.insert(entry.clone(), sync_id);
            self.locked_entries.insert(sync_id, entry.clone());
            self.confirmations.insert(sync_id, waiting);
        }

        Ok(sync_id)
    }

    /// Records that `client` has applied the change `sync_id`.
    ///
    /// A logged in client that is still unapproved becomes approved. Once every client of a
    /// change has confirmed it, its sync id and entry lock are released. Unknown sync ids are
    /// ignored.
    pub fn confirm_change(&mut self, client: ClientId, sync_id: SyncId) {
        if self.usernames.contains_key(&client) {
            self.unapproved.remove(&client);
        }

        let Some(waiting) = self.confirmations.get_mut(&sync_id) else {
            return;
        };
        waiting.remove(&client);
        if waiting.is_empty() {
            self.release(sync_id);
        }
    }

    /// Clients that still have to confirm `sync_id`.
    #[must_use]
    pub fn pending_confirmations(&self, sync_id: SyncId) -> Option<&HashSet<ClientId>> {
        self.confirmations.get(&sync_id)
    }

    /// The outstanding sync id locking `entry`, if any.
    #[must_use]
    pub fn sync_id_for(&self, entry: &Entry) -> Option<SyncId> {
        self.sync_ids.get(entry).copied()
    }

    /// Number of changes waiting for confirmation.
    #[must_use]
    pub fn outstanding_changes(&self) -> usize {
        self.confirmations.len()
    }

    fn allocate_sync_id(&mut self) -> Result<SyncId> {
        for _ in 0..SyncId::MAX {
            let candidate = self.next_sync_id;
            self.next_sync_id = if candidate == SyncId::MAX {
                1
            } else {
                candidate + 1
            };

            if !self.confirmations.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::SyncIdsExhausted)
    }

    fn release(&mut self, sync_id: SyncId) {
        self.confirmations.remove(&sync_id);
        if let Some(entry) = self.locked_entries.remove(&sync_id) {
            if self.sync_ids.get(&entry) == Some(&sync_id) {
                self.sync_ids.remove(&entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{class, method};

    fn logged_in(session: &mut SyncSession, id: u64, name: &str) -> ClientId {
        let client = ClientId::new(id);
        session.connect(client);
        session.set_username(client, name);
        session.confirm_change(client, 0);
        client
    }

    #[test]
    fn test_unapproved_clients_cannot_modify() {
        let mut session = SyncSession::new();
        let client = ClientId::new(1);
        session.connect(client);
        assert!(!session.can_modify_entry(client, &class("a")));

        session.confirm_change(client, 0);
        assert!(!session.is_approved(client));

        session.set_username(client, "alice");
        session.confirm_change(client, 0);
        assert!(session.can_modify_entry(client, &class("a")));
    }

    #[test]
    fn test_lock_blocks_until_confirmed() {
        let mut session = SyncSession::new();
        let alice = logged_in(&mut session, 1, "alice");
        let bob = logged_in(&mut session, 2, "bob");
        let entry = method(&class("a"), "a", "()V");

        let sync_id = session.lock_entry(alice, &entry).unwrap();
        assert_eq!(sync_id, 1);
        assert_eq!(
            session.pending_confirmations(sync_id),
            Some(&HashSet::from([bob]))
        );
        assert!(session.can_modify_entry(alice, &entry));
        assert!(!session.can_modify_entry(bob, &entry));
        assert!(session.can_modify_entry(bob, &class("other")));

        session.confirm_change(bob, sync_id);
        assert!(session.can_modify_entry(bob, &entry));
        assert_eq!(session.sync_id_for(&entry), None);
        assert_eq!(session.outstanding_changes(), 0);
    }

    #[test]
    fn test_disconnect_releases_locks() {
        let mut session = SyncSession::new();
        let alice = logged_in(&mut session, 1, "alice");
        let bob = logged_in(&mut session, 2, "bob");
        let entry = class("a");

        let sync_id = session.lock_entry(alice, &entry).unwrap();
        assert_eq!(session.disconnect(alice), Some("alice".to_string()));
        assert!(!session.can_modify_entry(bob, &entry));

        session.disconnect(bob);
        assert!(session.pending_confirmations(sync_id).is_none());
        assert!(session.usernames().is_empty());
    }

    #[test]
    fn test_relock_supersedes() {
        let mut session = SyncSession::new();
        let alice = logged_in(&mut session, 1, "alice");
        let bob = logged_in(&mut session, 2, "bob");
        let entry = class("a");

        let first = session.lock_entry(alice, &entry).unwrap();
        let second = session.lock_entry(alice, &entry).unwrap();
        assert_ne!(first, second);
        assert!(session.pending_confirmations(first).is_none());

        session.confirm_change(bob, first);
        assert!(!session.can_modify_entry(bob, &entry));
        session.confirm_change(bob, second);
        assert!(session.can_modify_entry(bob, &entry));
    }

    #[test]
    fn test_lone_client_takes_no_lock() {
        let mut session = SyncSession::new();
        let alice = logged_in(&mut session, 1, "alice");

        let sync_id = session.lock_entry(alice, &class("a")).unwrap();
        assert_ne!(sync_id, 0);
        assert_eq!(session.outstanding_changes(), 0);
    }

    #[test]
    fn test_sync_ids_wrap_and_skip_outstanding() {
        let mut session = SyncSession::new();
        let alice = logged_in(&mut session, 1, "alice");
        logged_in(&mut session, 2, "bob");

        let held = session.lock_entry(alice, &class("held")).unwrap();
        assert_eq!(held, 1);

        session.next_sync_id = SyncId::MAX;
        assert_eq!(session.lock_entry(alice, &class("x")).unwrap(), SyncId::MAX);
        assert_eq!(session.lock_entry(alice, &class("y")).unwrap(), 2);
    }

    #[test]
    fn test_sync_ids_exhausted() {
        let mut session = SyncSession::new();
        let alice = logged_in(&mut session, 1, "alice");
        logged_in(&mut session, 2, "bob");

        for index in 0..SyncId::MAX {
            let entry = class(&format!("c{index}"));
            let sync_id = session.lock_entry(alice, &entry).unwrap();
            assert_ne!(sync_id, 0);
        }
        assert!(matches!(
            session.lock_entry(alice, &class("overflow")),
            Err(Error::SyncIdsExhausted)
        ));
    }

    #[test]
    fn test_usernames() {
        let mut session = SyncSession::new();
        let bob = logged_in(&mut session, 2, "bob");
        logged_in(&mut session, 1, "alice");

        assert!(session.is_username_taken("bob"));
        assert_eq!(session.client_by_username("bob"), Some(bob));
        assert_eq!(session.usernames(), vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(session.username(bob), Some("bob"));
    }
}
