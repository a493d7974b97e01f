//! The per-node user store: primary records plus predecessor replicas.

use super::types::User;
use crate::ring::types::in_interval;
use dashmap::DashMap;
use tracing::debug;

/// Records a node is responsible for (`users`) and the replicas it holds
/// for its ring predecessor (`backups`). Both maps are keyed by the ring
/// position of the user's email.
///
/// Ownership only ever moves through [`UserStore::split_off`] (a node
/// joined and took part of the range) or [`UserStore::promote_backups`]
/// (the predecessor died and this node inherits its range).
pub struct UserStore {
    users: DashMap<u32, User>,
    backups: DashMap<u32, User>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            backups: DashMap::new(),
        }
    }

    pub fn primary_count(&self) -> usize {
        self.users.len()
    }

    pub fn backup_count(&self) -> usize {
        self.backups.len()
    }

    pub fn contains(&self, key: u32) -> bool {
        self.users.contains_key(&key)
    }

    /// Clone of the primary record under `key`.
    pub fn get(&self, key: u32) -> Option<User> {
        self.users.get(&key).map(|entry| entry.value().clone())
    }

    pub fn get_backup(&self, key: u32) -> Option<User> {
        self.backups.get(&key).map(|entry| entry.value().clone())
    }

    /// Inserts a brand new primary record. Returns `false` and leaves the
    /// store untouched when the key is already taken.
    pub fn insert_new(&self, user: User) -> bool {
        match self.users.entry(user.key()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(user);
                true
            }
        }
    }

    /// Inserts or overwrites a primary record.
    pub fn put(&self, user: User) {
        self.users.insert(user.key(), user);
    }

    /// Stores the replica of a predecessor-owned record.
    pub fn put_backup(&self, user: User) {
        self.backups.insert(user.key(), user);
    }

    /// Applies `mutate` to the primary record under `key` and returns the
    /// updated record, ready for replication. `None` when the user is not
    /// owned here.
    pub fn update<F>(&self, key: u32, mutate: F) -> Option<User>
    where
        F: FnOnce(&mut User),
    {
        let mut entry = self.users.get_mut(&key)?;
        mutate(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Moves every primary record in the ring interval `(from, to]` out of
    /// the store, together with the matching backups. This is the partition
    /// hand-off when a node with id `to` joins between `from` and here.
    pub fn split_off(&self, from: u32, to: u32) -> (Vec<User>, Vec<User>) {
        let moved_users = Self::drain_interval(&self.users, from, to);
        let moved_backups = Self::drain_interval(&self.backups, from, to);
        debug!(
            "split off {} users and {} backups for range ({}, {}]",
            moved_users.len(),
            moved_backups.len(),
            from,
            to
        );
        (moved_users, moved_backups)
    }

    fn drain_interval(map: &DashMap<u32, User>, from: u32, to: u32) -> Vec<User> {
        let keys: Vec<u32> = map
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| in_interval(*key, from, to))
            .collect();
        keys.into_iter()
            .filter_map(|key| map.remove(&key).map(|(_, user)| user))
            .collect()
    }

    /// Installs a transferred partition batch. Incoming primaries overwrite
    /// nothing that is already owned here.
    pub fn install(&self, primaries: Vec<User>, replicas: Vec<User>) {
        for user in primaries {
            self.users.entry(user.key()).or_insert(user);
        }
        for user in replicas {
            self.backups.entry(user.key()).or_insert(user);
        }
    }

    /// Drains the backups in the ring interval `(from, to]` into the
    /// primary map. Keys already owned keep their primary copy; replicas
    /// outside the interval stay backups. Returns the number of records
    /// inherited.
    pub fn promote_backups(&self, from: u32, to: u32) -> usize {
        let inherited = Self::drain_interval(&self.backups, from, to);
        let promoted = inherited.len();
        for user in inherited {
            self.users.entry(user.key()).or_insert(user);
        }
        promoted
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}
