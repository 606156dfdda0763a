//! Implementaciones Postgres (Diesel) de los stores del core.
//!
//! - `PgSessionStore`: un snapshot por `session_key` en `flow_sessions`. El
//!   compare-and-swap de `save` es un `UPDATE ... WHERE version = expected`
//!   dentro de una transacción; si no afecta filas se distingue entre clave
//!   inexistente y versión distinta.
//! - `PgEventStore`: `flow_event_log` append-only, orden total por `seq`.
//!
//! Ambos reintentan con backoff corto ante errores transitorios del pool o
//! conflictos de serialización; el resto de errores se propaga como
//! `StoreError`.

mod events;
mod sessions;

use std::thread;
use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use log::warn;

pub use events::PgEventStore;
pub use sessions::PgSessionStore;

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor de conexiones; permite inyectar un pool real o uno de test.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl PoolProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

const MAX_RETRIES: u32 = 3;

fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
        // algunos drivers sólo dejan el texto
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access")
            || m.contains("connection closed")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Repite `f` ante errores transitorios: hasta 3 reintentos, backoff de
/// 15/30/45 ms.
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = Duration::from_millis(15 * u64::from(attempts));
                warn!("retryable persistence error attempt={attempts} err={e} sleep_ms={}", delay.as_millis());
                thread::sleep(delay);
            }
            r => return r,
        }
    }
}

/// Construye un pool r2d2 y aplica las migraciones pendientes.
///
/// Tamaños 0 se elevan a 1 y si `min > max` se usa `min = max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1);
    if min > max {
        warn!("pool min_size > max_size ({min} > {max}); using min = max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min.min(max)))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_transient_errors_then_gives_up() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::TransientIo("reset".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1 + MAX_RETRIES);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::CheckViolation("status".into()))
        });
        assert!(matches!(result, Err(PersistenceError::CheckViolation(_))));
        assert_eq!(calls.get(), 1);
    }
}
