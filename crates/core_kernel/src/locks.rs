//! Keyed lock registry
//!
//! Gives in-process adapters the same guarantees a database gives with
//! `SELECT ... FOR UPDATE`: one writer per key, multi-key acquisition in a
//! fixed global order (ascending key) and a bounded wait. Guards are released
//! when the returned [`LockSet`] is dropped, on every exit path.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::error::CoreError;

/// Held locks; dropping releases them
#[derive(Debug)]
pub struct LockSet {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    /// Number of keys held
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// True when no key is held
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Merges another set into this one
    pub fn extend(&mut self, other: LockSet) {
        self.guards.extend(other.guards);
    }

    /// An empty set
    pub fn empty() -> Self {
        Self { guards: Vec::new() }
    }
}

/// Registry of per-key async mutexes
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Copy + Eq + Hash + Ord + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: K) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key).or_default().clone()
    }

    /// Acquires every key in ascending order, waiting at most `timeout` overall
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LockTimeout` naming the first key that could not be
    /// acquired; any keys already taken are released before returning.
    pub async fn acquire(&self, keys: &[K], timeout: Duration) -> Result<LockSet, CoreError> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(ordered.len());

        for key in ordered {
            let slot = self.slot(key);
            match tokio::time::timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    return Err(CoreError::LockTimeout {
                        resource: key.to_string(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }

        Ok(LockSet { guards })
    }
}
