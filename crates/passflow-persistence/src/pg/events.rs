use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{debug, warn};
use passflow_core::{EventStore, FlowEvent, FlowEventKind, StoreError};
use serde_json::Value;
use uuid::Uuid;

use super::{with_retry, ConnectionProvider, PoolProvider};
use crate::error::PersistenceError;
use crate::schema::flow_event_log;

#[derive(Insertable, Debug)]
#[diesel(table_name = flow_event_log)]
struct NewEventRow<'a> {
    flow_id: Uuid,
    event_type: &'a str,
    payload: &'a Value,
}

#[derive(Queryable, Debug)]
struct EventRow {
    seq: i64,
    flow_id: Uuid,
    ts: DateTime<Utc>,
    event_type: String,
    payload: Value,
}

impl EventRow {
    /// El payload guarda el enum completo; `event_type` es sólo índice.
    fn into_event(self) -> Option<FlowEvent> {
        match serde_json::from_value::<FlowEventKind>(self.payload) {
            Ok(kind) => Some(FlowEvent { seq: self.seq as u64,
                                         flow_id: self.flow_id,
                                         kind,
                                         ts: self.ts }),
            Err(e) => {
                warn!("skipping undecodable event seq={} flow_id={} type={} err={e}",
                      self.seq,
                      self.flow_id,
                      self.event_type);
                None
            }
        }
    }
}

/// `EventStore` append-only sobre `flow_event_log`.
pub struct PgEventStore<P: ConnectionProvider = PoolProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    fn append_kind(&self, flow_id: Uuid, kind: FlowEventKind) -> Result<FlowEvent, StoreError> {
        let payload = serde_json::to_value(&kind).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let event_type = kind.name();
        let (seq, ts): (i64, DateTime<Utc>) = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(flow_event_log::table).values(NewEventRow { flow_id,
                                                                            event_type,
                                                                            payload: &payload })
                                                      .returning((flow_event_log::seq, flow_event_log::ts))
                                                      .get_result(&mut conn)
                                                      .map_err(PersistenceError::from)
        })?;
        debug!("event appended flow_id={flow_id} seq={seq} type={event_type}");
        Ok(FlowEvent { seq: seq as u64,
                       flow_id,
                       kind,
                       ts })
    }

    fn list(&self, flow_id: Uuid) -> Result<Vec<FlowEvent>, StoreError> {
        let rows: Vec<EventRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            flow_event_log::table.filter(flow_event_log::flow_id.eq(flow_id))
                                 .order(flow_event_log::seq.asc())
                                 .load(&mut conn)
                                 .map_err(PersistenceError::from)
        })?;
        Ok(rows.into_iter().filter_map(EventRow::into_event).collect())
    }
}
