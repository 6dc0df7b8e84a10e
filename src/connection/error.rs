//! Classification of driver failures.

use super::DriverError;
use crate::{Error, ExecutionErrorKind, codes};
use once_cell::sync::Lazy;
use regex::Regex;

static CONNECTION_LOST: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)(server has gone away|lost connection|connection (was )?(reset|refused|closed)|broken pipe)",
    )
    .ok()
});

/// Returns true if the driver message says the connection is gone.
pub(crate) fn is_connection_lost(message: &str) -> bool {
    CONNECTION_LOST
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

/// Turns a statement failure into an [`Error::Execution`].
///
/// `sql` is the interpolated statement text.
pub(crate) fn classify(err: DriverError, sql: String) -> Error {
    let (kind, code) = if is_connection_lost(&err.message) {
        (ExecutionErrorKind::ConnectionLost, codes::CONNECTION_LOST)
    } else {
        (
            ExecutionErrorKind::Failed,
            err.code.unwrap_or(codes::EXECUTION_FAILED),
        )
    };
    Error::Execution {
        kind,
        code,
        sql,
        message: err.message,
    }
}

/// Turns a connect failure into an [`Error::Connection`].
pub(crate) fn connect_error(err: &DriverError) -> Error {
    let message = match err.code {
        Some(code) => format!("{} (driver code {code})", err.message),
        None => err.message.clone(),
    };
    Error::Connection {
        code: codes::CONNECT_FAILED,
        message,
    }
}
