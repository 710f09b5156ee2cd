//! Persistent-connection table. Entries are keyed by the full credential
//! triple and live until the owning context is dropped.

use std::collections::HashMap;
use std::fmt;

use zeroize::ZeroizeOnDrop;

use crate::engine::Connection;

/// Lookup key of a persistent connection. Holds the password, so the key
/// material is wiped when dropped and never printed.
#[derive(Clone, PartialEq, Eq, Hash, ZeroizeOnDrop)]
pub struct PoolKey {
    value: String,
}

impl PoolKey {
    pub fn new(user: &str, target: &str, password: &str) -> Self {
        Self {
            value: format!("__ibm_db_{}.{}.{}", user, target, password),
        }
    }
}

impl fmt::Debug for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PoolKey(***)")
    }
}

pub struct PersistentPool {
    entries: HashMap<PoolKey, Connection>,
    capacity: Option<usize>,
}

impl PersistentPool {
    /// `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    pub fn get(&self, key: &PoolKey) -> Option<Connection> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: PoolKey, conn: Connection) {
        self.entries.insert(key, conn);
    }

    pub fn remove(&mut self, key: &PoolKey) -> Option<Connection> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn has_room(&self) -> bool {
        self.capacity.map_or(true, |max| self.entries.len() < max)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Connection> + '_ {
        self.entries.drain().map(|(_, conn)| conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_includes_every_credential() {
        let a = PoolKey::new("db2inst1", "SAMPLE", "secret");
        assert_eq!(a.value, "__ibm_db_db2inst1.SAMPLE.secret");
        assert_eq!(a, PoolKey::new("db2inst1", "SAMPLE", "secret"));
        assert_ne!(a, PoolKey::new("db2inst1", "SAMPLE", "other"));
        assert_ne!(a, PoolKey::new("db2inst2", "SAMPLE", "secret"));
    }

    #[test]
    fn test_pool_key_debug_hides_password() {
        let key = PoolKey::new("u", "SAMPLE", "secret");
        assert!(!format!("{:?}", key).contains("secret"));
    }

    #[test]
    fn test_capacity() {
        let pool = PersistentPool::new(Some(0));
        assert!(!pool.has_room());
        assert!(pool.is_empty());
        let pool = PersistentPool::new(None);
        assert!(pool.has_room());
        assert_eq!(pool.capacity(), None);
    }
}
