//! passflow-persistence
//!
//! Backends Postgres (Diesel + r2d2) de los traits de almacenamiento del
//! core: `SessionStore` para snapshots de flow con CAS sobre `version` y
//! `EventStore` append-only.
//!
//! Módulos:
//! - `pg`: stores, pool y reintentos ante errores transitorios.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: configuración de conexión desde el entorno / `.env`.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgEventStore, PgPool, PgSessionStore,
             PoolProvider};
