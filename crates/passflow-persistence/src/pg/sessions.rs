use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::debug;
use passflow_core::store::{FlowSnapshot, SessionStore};
use passflow_core::{FlowStatus, StoreError};
use serde_json::Value;
use uuid::Uuid;

use super::{with_retry, ConnectionProvider, PoolProvider};
use crate::error::PersistenceError;
use crate::schema::flow_sessions;

const TERMINAL: [FlowStatus; 4] = [FlowStatus::Completed, FlowStatus::Cancelled, FlowStatus::Error, FlowStatus::Expired];

#[derive(Insertable, Debug)]
#[diesel(table_name = flow_sessions)]
struct SessionRow<'a> {
    session_key: &'a str,
    flow_instance: Uuid,
    flow_slug: &'a str,
    status: &'a str,
    version: i64,
    last_updated: DateTime<Utc>,
    snapshot: Value,
}

impl<'a> SessionRow<'a> {
    fn from_snapshot(snapshot: &'a FlowSnapshot) -> Result<Self, StoreError> {
        let state = &snapshot.state;
        let version = i64::try_from(state.version).map_err(|_| {
                                                     StoreError::Serialization(format!("version out of range: {}",
                                                                                       state.version))
                                                 })?;
        Ok(Self { session_key: &state.session_key,
                  flow_instance: state.flow_instance,
                  flow_slug: &state.flow_slug,
                  status: state.status.as_str(),
                  version,
                  last_updated: state.last_updated,
                  snapshot: snapshot.to_json()? })
    }
}

enum SaveOutcome {
    Saved,
    Missing,
    Conflict(u64),
}

/// `SessionStore` sobre la tabla `flow_sessions`.
pub struct PgSessionStore<P: ConnectionProvider = PoolProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgSessionStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> SessionStore for PgSessionStore<P> {
    fn load(&self, session_key: &str) -> Result<Option<FlowSnapshot>, StoreError> {
        let raw: Option<Value> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            flow_sessions::table.find(session_key)
                                .select(flow_sessions::snapshot)
                                .first(&mut conn)
                                .optional()
                                .map_err(PersistenceError::from)
        })?;
        raw.map(FlowSnapshot::from_json).transpose()
    }

    fn save(&self, snapshot: &FlowSnapshot, expected_version: Option<u64>) -> Result<(), StoreError> {
        let row = SessionRow::from_snapshot(snapshot)?;
        let outcome = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| {
                let affected = match expected_version {
                    None => diesel::insert_into(flow_sessions::table).values(&row)
                                                                       .on_conflict_do_nothing()
                                                                       .execute(tx)?,
                    Some(expected) => {
                        let target = flow_sessions::table.filter(flow_sessions::session_key.eq(row.session_key))
                                                         .filter(flow_sessions::version.eq(expected as i64));
                        diesel::update(target).set((flow_sessions::flow_instance.eq(row.flow_instance),
                                                    flow_sessions::flow_slug.eq(row.flow_slug),
                                                    flow_sessions::status.eq(row.status),
                                                    flow_sessions::version.eq(row.version),
                                                    flow_sessions::last_updated.eq(row.last_updated),
                                                    flow_sessions::snapshot.eq(&row.snapshot)))
                                              .execute(tx)?
                    }
                };
                if affected == 1 {
                    return Ok(SaveOutcome::Saved);
                }
                let found: Option<i64> = flow_sessions::table.find(row.session_key)
                                                             .select(flow_sessions::version)
                                                             .first(tx)
                                                             .optional()?;
                Ok::<_, PersistenceError>(match found {
                    Some(v) => SaveOutcome::Conflict(v as u64),
                    None => SaveOutcome::Missing,
                })
            })
        })?;
        match outcome {
            SaveOutcome::Saved => {
                debug!("session saved key={} version={}", row.session_key, row.version);
                Ok(())
            }
            SaveOutcome::Missing => Err(StoreError::NotFound),
            SaveOutcome::Conflict(found) => Err(StoreError::VersionConflict { expected: expected_version,
                                                                              found }),
        }
    }

    fn delete(&self, session_key: &str) -> Result<bool, StoreError> {
        let deleted = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(flow_sessions::table.find(session_key)).execute(&mut conn)
                                                                 .map_err(PersistenceError::from)
        })?;
        Ok(deleted > 0)
    }

    fn list_idle(&self, status: FlowStatus, older_than: DateTime<Utc>) -> Result<Vec<FlowSnapshot>, StoreError> {
        let rows: Vec<Value> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            flow_sessions::table.filter(flow_sessions::status.eq(status.as_str()))
                                .filter(flow_sessions::last_updated.lt(older_than))
                                .order(flow_sessions::last_updated.asc())
                                .select(flow_sessions::snapshot)
                                .load(&mut conn)
                                .map_err(PersistenceError::from)
        })?;
        rows.into_iter().map(FlowSnapshot::from_json).collect()
    }

    fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let purged = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(flow_sessions::table.filter(flow_sessions::status.eq_any(TERMINAL.map(FlowStatus::as_str)))
                                               .filter(flow_sessions::last_updated.lt(older_than)))
            .execute(&mut conn)
            .map_err(PersistenceError::from)
        })?;
        debug!("purged {purged} terminal session(s)");
        Ok(purged)
    }
}
