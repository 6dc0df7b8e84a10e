//! Connection management.
//!
//! A [`ConnectionRegistry`] hands out one [`Connection`] per configuration
//! fingerprint. Each connection owns a pool of master handles and, when
//! replicas are configured, one pool per replica. Reads are routed to a random
//! replica when read splitting is on; writes, introspection and transactions
//! always use the master.
//!
//! Drivers plug in through the [`Driver`] / [`DriverHandle`] traits. SQLite is
//! registered by default.

mod driver;
mod error;
mod manager;
mod metadata;
mod pool;
mod registry;
mod sqlite;
mod sync;
#[cfg(test)]
pub(crate) mod testing;
mod transaction;

pub use driver::{ColumnInfo, Driver, DriverError, DriverHandle, ExecOutcome};
pub use manager::Connection;
pub use metadata::TableMetadata;
pub use registry::ConnectionRegistry;
pub use sqlite::SqliteDriver;
pub use transaction::Transaction;

pub(crate) use manager::Route;
