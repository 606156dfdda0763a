use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{FlowSnapshot, SessionStore};
use crate::errors::StoreError;
use crate::model::FlowStatus;

/// Store en memoria. El CAS se hace bajo el lock del shard (`entry`).
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: DashMap<String, FlowSnapshot>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session_key: &str) -> Result<Option<FlowSnapshot>, StoreError> {
        Ok(self.inner.get(session_key).map(|s| s.value().clone()))
    }

    fn save(&self, snapshot: &FlowSnapshot, expected_version: Option<u64>) -> Result<(), StoreError> {
        match (self.inner.entry(snapshot.state.session_key.clone()), expected_version) {
            (Entry::Vacant(slot), None) => {
                slot.insert(snapshot.clone());
                Ok(())
            }
            (Entry::Vacant(_), Some(_)) => Err(StoreError::NotFound),
            (Entry::Occupied(mut slot), Some(expected)) if slot.get().state.version == expected => {
                slot.insert(snapshot.clone());
                Ok(())
            }
            (Entry::Occupied(slot), expected) => Err(StoreError::VersionConflict { expected,
                                                                                   found: slot.get().state.version }),
        }
    }

    fn delete(&self, session_key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.remove(session_key).is_some())
    }

    fn list_idle(&self, status: FlowStatus, older_than: DateTime<Utc>) -> Result<Vec<FlowSnapshot>, StoreError> {
        Ok(self.inner
               .iter()
               .filter(|s| s.state.status == status && s.state.last_updated < older_than)
               .map(|s| s.value().clone())
               .collect())
    }

    fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut purged = 0;
        self.inner.retain(|_, s| {
                      let expired = s.state.status.is_terminal() && s.state.last_updated < older_than;
                      purged += usize::from(expired);
                      !expired
                  });
        Ok(purged)
    }
}
