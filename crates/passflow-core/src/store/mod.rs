//! Persistencia de snapshots de flow con concurrencia optimista.

mod memory;
mod snapshot;

pub use memory::InMemorySessionStore;
pub use snapshot::FlowSnapshot;

use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::model::FlowStatus;

/// Backend de snapshots, indexado por `session_key`.
///
/// `save` es un compare-and-swap sobre `version`: con `expected_version =
/// None` sólo inserta (falla si la clave existe); con `Some(v)` sólo
/// reemplaza si la versión almacenada es exactamente `v`. En ambos casos el
/// conflicto se reporta como `StoreError::VersionConflict`.
pub trait SessionStore: Send + Sync {
    fn load(&self, session_key: &str) -> Result<Option<FlowSnapshot>, StoreError>;

    fn save(&self, snapshot: &FlowSnapshot, expected_version: Option<u64>) -> Result<(), StoreError>;

    /// `Ok(false)` si no existía.
    fn delete(&self, session_key: &str) -> Result<bool, StoreError>;

    /// Snapshots en `status` cuya última actualización es anterior a `older_than`.
    fn list_idle(&self, status: FlowStatus, older_than: DateTime<Utc>) -> Result<Vec<FlowSnapshot>, StoreError>;

    /// Borra snapshots terminales anteriores a `older_than`; devuelve cuántos.
    fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError>;
}
