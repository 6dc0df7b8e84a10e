//! # dbflow
//!
//! A dynamic SQL data-access layer: a fluent query builder, a connection manager
//! with master/replica routing and pooling, and a table-metadata cache used to
//! validate writes and resolve primary keys.
//!
//! ## Features
//!
//! - Fluent [`Query`] builder with a closed set of terminal operations
//! - Recursive WHERE compiler with strict placeholder/parameter ordering
//! - Pooled driver handles keyed by a configuration [`Fingerprint`]
//! - Random replica selection for reads, master pinning for writes and transactions
//! - Lazily populated [`TableMetadata`] with optional on-disk persistence
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbflow::{ConnectionConfig, ConnectionRegistry, Page, Record, RuntimeFlags};
//!
//! let registry = ConnectionRegistry::new(RuntimeFlags::production(), None);
//! let conn = registry.connection(&ConnectionConfig::sqlite("app.db"))?;
//!
//! let id = conn.table("users").insert(Record::new().set("name", "Ann").set("age", 30))?;
//!
//! let mut page = Page::new(2, 10);
//! let rows = conn
//!     .table("users")
//!     .and_where("age", ">", 18)
//!     .order_by("id DESC")
//!     .page(&mut page)
//!     .list(true)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod connection;
pub mod db;
pub mod models;
pub mod observability;
pub mod query;

pub use config::{ConnectionConfig, DatabaseSettings, Fingerprint, PoolSettings, RuntimeFlags};
pub use connection::{
    ColumnInfo, Connection, ConnectionRegistry, Driver, DriverError, DriverHandle, ExecOutcome,
    SqliteDriver, TableMetadata, Transaction,
};
pub use db::Db;
pub use models::{ArithOp, Assignment, Changes, Page, Record, Row, Value};
pub use observability::{LogFormat, LoggingConfig, init_logging};
pub use query::{
    Conditions, KeyedColumn, Limit, Logic, Operand, Operator, PredicateNode, Query, QueryState,
    Statement, WhereGroup,
};

/// Numeric error codes surfaced by [`Error::code`].
pub mod codes {
    /// Generic statement execution failure.
    pub const EXECUTION_FAILED: i64 = 60001;
    /// Driver connect failure.
    pub const CONNECT_FAILED: i64 = 60002;
    /// Statement rejected before reaching the driver.
    pub const QUERY_BUILD: i64 = 60003;
    /// The server connection went away mid-statement.
    pub const CONNECTION_LOST: i64 = 60004;
    /// No usable configuration.
    pub const CONFIGURATION: i64 = 60005;
    /// No pooled handle became available in time.
    pub const POOL_TIMEOUT: i64 = 60006;
}

/// Classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    /// The underlying connection was lost; reconnect-and-retry may succeed.
    ConnectionLost,
    /// Any other driver failure.
    Failed,
}

/// Error type for dbflow operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Unknown connection name, unknown driver, invalid settings |
/// | `Connection` | Driver connect failure, pool checkout timeout |
/// | `QueryBuild` | Missing table, unconditioned update/delete, empty payloads |
/// | `Execution` | The driver rejected or failed a statement |
#[derive(Debug, ThisError)]
pub enum Error {
    /// No usable configuration could be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The driver could not open a connection.
    #[error("database connect error: {message} code: {code}")]
    Connection {
        /// Numeric error code.
        code: i64,
        /// Driver message.
        message: String,
    },

    /// The statement was rejected before it reached the driver.
    #[error("query build error: {0}")]
    QueryBuild(String),

    /// The driver failed to execute a statement.
    ///
    /// The message embeds the fully interpolated SQL. Bound values are not redacted.
    #[error("SQL execute error: {sql} |{message} Code: {code}")]
    Execution {
        /// Failure classification.
        kind: ExecutionErrorKind,
        /// Numeric error code.
        code: i64,
        /// SQL with parameters interpolated.
        sql: String,
        /// Driver message.
        message: String,
    },
}

impl Error {
    /// Returns the numeric code carried by this error.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Configuration(_) => codes::CONFIGURATION,
            Self::QueryBuild(_) => codes::QUERY_BUILD,
            Self::Connection { code, .. } | Self::Execution { code, .. } => *code,
        }
    }

    /// Returns true if the failure was caused by a lost server connection.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Execution {
                kind: ExecutionErrorKind::ConnectionLost,
                ..
            }
        )
    }

    pub(crate) fn build(message: impl Into<String>) -> Self {
        Self::QueryBuild(message.into())
    }
}

/// Result type alias for dbflow operations.
pub type Result<T> = std::result::Result<T, Error>;
