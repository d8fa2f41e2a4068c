use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Opaque handle for one interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionHandle {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tells the registry whether a previously registered handle still
/// belongs to a live session.
pub trait SessionProbe: Send + Sync {
    fn is_live(&self, handle: &SessionHandle) -> bool;
}

/// How a successful acquire was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Fresh,
    /// A registered handle was dead and has been replaced.
    ReplacedStale,
}

/// At most one live session per username.
///
/// Check and insert happen under the map's entry lock, so concurrent
/// acquires for one username see each other.
pub struct SessionRegistry {
    active: DashMap<String, SessionHandle>,
    probe: Arc<dyn SessionProbe>,
}

impl SessionRegistry {
    pub fn new(probe: Arc<dyn SessionProbe>) -> Self {
        Self {
            active: DashMap::new(),
            probe,
        }
    }

    /// Register `handle` as the live session for `username`.
    pub fn try_acquire(
        &self,
        username: &str,
        handle: SessionHandle,
    ) -> Result<Acquired, SessionError> {
        match self.active.entry(username.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.probe.is_live(entry.get()) {
                    tracing::warn!("Refused second session for {}", username);
                    return Err(SessionError::AlreadyActive(username.to_string()));
                }
                tracing::debug!("Replacing stale session for {}", username);
                entry.insert(handle);
                Ok(Acquired::ReplacedStale)
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(Acquired::Fresh)
            }
        }
    }

    /// Drop the registration for `username`. Returns whether one existed.
    pub fn release(&self, username: &str) -> bool {
        self.active.remove(username).is_some()
    }

    /// Drop the registration for `username` only if it still points at `handle`.
    pub fn release_if(&self, username: &str, handle: &SessionHandle) -> bool {
        self.active
            .remove_if(username, |_, current| current == handle)
            .is_some()
    }

    pub fn holder(&self, username: &str) -> Option<SessionHandle> {
        self.active.get(username).map(|h| h.value().clone())
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
