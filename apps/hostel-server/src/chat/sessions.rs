//! Registry of live connection identities.
//!
//! Identities are random, so the registry is what guarantees that a new
//! connection never receives a token that another live connection (and
//! therefore possibly some room) still holds.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hostel_common::Identity;

/// Per-connection bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub connected_at: Instant,
}

/// Shared registry of all connected sessions.
///
/// Uses `DashMap` for shard-level concurrency; registration and removal
/// from different connections never contend on one global lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Identity, SessionInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection under a freshly generated identity.
    pub fn register(&self) -> Identity {
        self.register_with(Identity::generate)
    }

    /// Register with a custom generator, retrying until an unused identity comes up.
    pub fn register_with(&self, mut generate: impl FnMut() -> Identity) -> Identity {
        loop {
            match self.sessions.entry(generate()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let identity = slot.key().clone();
                    slot.insert(SessionInfo {
                        connected_at: Instant::now(),
                    });
                    return identity;
                }
            }
        }
    }

    /// Forget a connection. Returns how long it was connected.
    pub fn remove(&self, identity: &Identity) -> Option<Duration> {
        self.sessions
            .remove(identity)
            .map(|(_, info)| info.connected_at.elapsed())
    }

    #[cfg(test)]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
