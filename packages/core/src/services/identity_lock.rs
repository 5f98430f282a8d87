//! Per-identity single-flight guard
//!
//! While a rename or move of a note is in flight, no other mutation of the
//! same identity is accepted. Callers try to acquire every key they touch at
//! once; if any key is already held the whole acquisition fails and nothing
//! is held. Keys are released when the returned guard drops.
//!
//! Acquisition never waits, so two operations can never deadlock on each
//! other's keys.
//!
//! Reading, rewriting and writing back one note's content is guarded
//! separately by [`ContentLocks`]: a short per-note lock that does wait, and
//! is never held while taking another one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, Default)]
pub struct IdentityLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire all `keys`, or none of them.
    ///
    /// Returns the first busy key on failure.
    pub fn try_acquire<I, S>(&self, keys: I) -> Result<IdentityGuard, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut wanted: Vec<String> = keys.into_iter().map(Into::into).collect();
        wanted.sort();
        wanted.dedup();

        let mut held = self.lock_held();
        if let Some(busy) = wanted.iter().find(|key| held.contains(*key)) {
            return Err(busy.clone());
        }
        held.extend(wanted.iter().cloned());
        tracing::debug!("Acquired identity locks {:?}", wanted);

        Ok(IdentityGuard {
            held: Arc::clone(&self.held),
            keys: wanted,
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.lock_held().contains(key)
    }
}

/// Holds a set of identity keys until dropped.
#[derive(Debug)]
pub struct IdentityGuard {
    held: Arc<Mutex<HashSet<String>>>,
    keys: Vec<String>,
}

impl IdentityGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn holds(&self, key: &str) -> bool {
        self.keys.iter().any(|held| held == key)
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in &self.keys {
            held.remove(key);
        }
    }
}

type ContentLockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Waiting per-note locks around read-modify-write of note content
#[derive(Debug, Clone, Default)]
pub struct ContentLocks {
    locks: Arc<Mutex<ContentLockMap>>,
}

impl ContentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and hold it.
    pub async fn lock(&self, key: &str) -> ContentGuard {
        let entry = {
            let mut locks = lock_map(&self.locks);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let guard = entry.lock_owned().await;
        ContentGuard {
            locks: Arc::clone(&self.locks),
            key: key.to_string(),
            guard: Some(guard),
        }
    }
}

fn lock_map(locks: &Mutex<ContentLockMap>) -> MutexGuard<'_, ContentLockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds one content lock until dropped.
#[derive(Debug)]
pub struct ContentGuard {
    locks: Arc<Mutex<ContentLockMap>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ContentGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Forget the key once nobody holds or waits for it
        let mut locks = lock_map(&self.locks);
        if locks
            .get(&self.key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
