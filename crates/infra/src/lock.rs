//! Per-key mutual exclusion with a bounded wait.
//!
//! Adjustments on one product must not both read the same `quantity_before`.
//! `KeyedLock` serializes holders of the same key while different keys proceed
//! in parallel. There is no global lock: the inner mutex only guards the set
//! of held keys and is never held across a caller's critical section.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("timed out after {waited:?} waiting for the lock on {key}")]
pub struct LockTimeout {
    pub key: String,
    pub waited: Duration,
}

#[derive(Debug)]
pub struct KeyedLock<K> {
    held: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K> KeyedLock<K> {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone + core::fmt::Display,
{
    /// Block until `key` is free or `timeout` elapses.
    pub fn acquire(&self, key: K, timeout: Duration) -> Result<KeyGuard<'_, K>, LockTimeout> {
        let started = Instant::now();
        // The set stays coherent even if a holder panicked, so poison is ignored.
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if !held.contains(&key) {
                held.insert(key.clone());
                return Ok(KeyGuard { lock: self, key });
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockTimeout {
                    key: key.to_string(),
                    waited,
                });
            }

            // Wakeups for other keys just loop back to the check above.
            let (guard, _) = self
                .released
                .wait_timeout(held, timeout - waited)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
    }

    pub fn is_held(&self, key: &K) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn release(&self, key: &K) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(key);
        drop(held);
        self.released.notify_all();
    }
}

/// Holds one key of a [`KeyedLock`] until dropped.
#[derive(Debug)]
pub struct KeyGuard<'a, K>
where
    K: Eq + Hash + Clone + core::fmt::Display,
{
    lock: &'a KeyedLock<K>,
    key: K,
}

impl<K> KeyGuard<'_, K>
where
    K: Eq + Hash + Clone + core::fmt::Display,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Eq + Hash + Clone + core::fmt::Display,
{
    fn drop(&mut self) {
        self.lock.release(&self.key);
    }
}
