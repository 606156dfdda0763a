use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{FlowEvent, FlowEventKind};
use crate::errors::StoreError;

/// Almacenamiento de eventos append-only, compartido entre requests.
pub trait EventStore: Send + Sync {
    /// Agrega un evento y devuelve el evento completo (con seq y ts).
    fn append_kind(&self, flow_id: Uuid, kind: FlowEventKind) -> Result<FlowEvent, StoreError>;
    /// Eventos de un flow en orden ascendente de seq.
    fn list(&self, flow_id: Uuid) -> Result<Vec<FlowEvent>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: DashMap<Uuid, Vec<FlowEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&self, flow_id: Uuid, kind: FlowEventKind) -> Result<FlowEvent, StoreError> {
        // entry() bloquea el shard: seq no se repite entre appends concurrentes
        let mut stream = self.inner.entry(flow_id).or_default();
        let ev = FlowEvent { seq: stream.len() as u64,
                             flow_id,
                             kind,
                             ts: Utc::now() };
        stream.push(ev.clone());
        Ok(ev)
    }

    fn list(&self, flow_id: Uuid) -> Result<Vec<FlowEvent>, StoreError> {
        Ok(self.inner.get(&flow_id).map(|s| s.value().clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_are_numbered_per_flow() {
        let store = InMemoryEventStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append_kind(a, FlowEventKind::FlowCancelled { reason: "x".into() }).expect("append");
        let second = store.append_kind(a, FlowEventKind::FlowCancelled { reason: "y".into() }).expect("append");
        let other = store.append_kind(b, FlowEventKind::FlowCancelled { reason: "z".into() }).expect("append");
        assert_eq!(second.seq, 1);
        assert_eq!(other.seq, 0);
        assert_eq!(store.list(a).expect("list").len(), 2);
    }
}
