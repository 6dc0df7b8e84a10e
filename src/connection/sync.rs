//! Mutex helpers and statement metrics shared by the pool and the manager.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Acquires a mutex, recovering from poison.
///
/// A panic inside a critical section leaves the protected state usable (idle
/// handle lists, cached SQL text), so the inner value is taken over and the
/// event is logged.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("dbflow mutex was poisoned, recovering");
            metrics::counter!("db_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Records statement count and latency.
///
/// * `route` - `master`, `replica` or `pinned`
/// * `kind` - statement kind (`select`, `insert`, `introspect`, ...)
/// * `status` - `success` or `error`
pub(crate) fn record_statement_metrics(
    route: &'static str,
    kind: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "db_statements_total",
        "route" => route,
        "kind" => kind,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "db_statement_duration_ms",
        "route" => route,
        "kind" => kind
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
