//! Per-key async locks.
//!
//! [`KeyedLocks`] serializes work on the same key while letting different
//! keys proceed in parallel. Entries exist only while some caller holds or
//! waits for the key, so the table does not grow with the number of distinct
//! keys ever used.
//!
//! A guard releases its lock and its table slot on every exit path: normal
//! return, early `?` return, panic unwinding, and cancellation of a future
//! still waiting for the lock.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    /// Callers holding or waiting for `lock`.
    interested: usize,
}

type Table<K> = Arc<Mutex<HashMap<K, Entry>>>;

/// A table of lazily created per-key mutexes.
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    table: Table<K>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let (lock, ticket) = {
            let mut table = self.table.lock();
            let entry = table.entry(key.clone()).or_insert_with(|| Entry {
                lock: Arc::new(AsyncMutex::new(())),
                interested: 0,
            });
            entry.interested += 1;
            (
                entry.lock.clone(),
                Ticket {
                    table: self.table.clone(),
                    key,
                },
            )
        };

        // Dropping this future while waiting drops `ticket`, which
        // deregisters the caller.
        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub async fn with_lock<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        f().await
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones share the same table.
impl<K: Eq + Hash + Clone> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

/// Registration of one caller's interest in a key.
struct Ticket<K: Eq + Hash + Clone> {
    table: Table<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for Ticket<K> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        if let Some(entry) = table.get_mut(&self.key) {
            entry.interested -= 1;
            if entry.interested == 0 {
                table.remove(&self.key);
            }
        }
    }
}

/// Exclusive access to one key. Released on drop.
pub struct KeyGuard<K: Eq + Hash + Clone> {
    // Field order matters: the mutex is released before the ticket is.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<K>,
}
