//! Bounded pool of driver handles for one configuration fingerprint.

use super::driver::{ClosedHandle, Driver, DriverHandle};
use super::error::connect_error;
use super::sync::acquire_lock;
use crate::config::{ConnectionConfig, Fingerprint, PoolSettings};
use crate::{Error, Result, codes};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Checkout wait applied when the configured timeout is zero.
const MAX_ACQUIRE_WAIT: Duration = Duration::from_secs(60);

struct PoolState {
    idle: Vec<Box<dyn DriverHandle>>,
    open: usize,
}

/// Handles opened for one configuration.
///
/// Handles are created lazily up to `max_size`; a checkout beyond that waits
/// for a checkin until the acquire timeout elapses.
pub(crate) struct HandlePool {
    fingerprint: Fingerprint,
    driver: Arc<dyn Driver>,
    config: ConnectionConfig,
    options: BTreeMap<String, String>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl fmt::Debug for HandlePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = acquire_lock(&self.state);
        f.debug_struct("HandlePool")
            .field("fingerprint", &self.fingerprint.short())
            .field("driver", &self.driver.name())
            .field("max_size", &self.settings.max_size)
            .field("open", &state.open)
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl HandlePool {
    pub(crate) fn new(
        fingerprint: Fingerprint,
        driver: Arc<dyn Driver>,
        config: ConnectionConfig,
        options: BTreeMap<String, String>,
    ) -> Self {
        let settings = config.effective_pool();
        Self {
            fingerprint,
            driver,
            config,
            options,
            settings,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub(crate) const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Number of handles currently open (idle or checked out).
    pub(crate) fn open_count(&self) -> usize {
        acquire_lock(&self.state).open
    }

    /// Opens one handle and parks it, surfacing connect failures early.
    pub(crate) fn warm(self: &Arc<Self>) -> Result<()> {
        self.checkout().map(drop)
    }

    /// Checks out a handle, opening a new one if the pool has room.
    pub(crate) fn checkout(self: &Arc<Self>) -> Result<PooledHandle> {
        let wait = match self.settings.acquire_timeout_ms {
            0 => MAX_ACQUIRE_WAIT,
            ms => Duration::from_millis(ms),
        };
        let deadline = Instant::now() + wait;
        let mut state = acquire_lock(&self.state);
        loop {
            if let Some(handle) = state.idle.pop() {
                return Ok(PooledHandle::new(Arc::clone(self), handle));
            }
            if state.open < self.settings.max_size {
                state.open += 1;
                drop(state);
                return self.open_handle();
            }
            let now = Instant::now();
            if now >= deadline {
                drop(state);
                metrics::counter!("db_pool_checkout_timeouts_total").increment(1);
                tracing::warn!(
                    pool = self.fingerprint.short(),
                    max_size = self.settings.max_size,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "Timed out waiting for a pooled connection"
                );
                return Err(Error::Connection {
                    code: codes::POOL_TIMEOUT,
                    message: format!(
                        "no connection available after {}ms (max_size {})",
                        wait.as_millis(),
                        self.settings.max_size
                    ),
                });
            }
            state = match self.available.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn open_handle(self: &Arc<Self>) -> Result<PooledHandle> {
        match self.driver.connect(&self.config, &self.options) {
            Ok(handle) => {
                tracing::debug!(
                    pool = self.fingerprint.short(),
                    driver = self.driver.name(),
                    "Opened database connection"
                );
                Ok(PooledHandle::new(Arc::clone(self), handle))
            },
            Err(e) => {
                acquire_lock(&self.state).open -= 1;
                self.available.notify_one();
                tracing::warn!(
                    pool = self.fingerprint.short(),
                    driver = self.driver.name(),
                    error = %e,
                    "Database connect failed"
                );
                Err(connect_error(&e))
            },
        }
    }

    fn checkin(&self, handle: Box<dyn DriverHandle>, broken: bool) {
        let mut state = acquire_lock(&self.state);
        if broken {
            state.open = state.open.saturating_sub(1);
            drop(state);
            drop(handle);
            tracing::debug!(
                pool = self.fingerprint.short(),
                "Discarded broken database connection"
            );
        } else {
            state.idle.push(handle);
            drop(state);
        }
        self.available.notify_one();
    }
}

/// A handle checked out of a [`HandlePool`].
///
/// Returned to the pool on drop, on every exit path. A handle marked broken
/// is closed instead of being reused.
pub(crate) struct PooledHandle {
    pool: Arc<HandlePool>,
    handle: Box<dyn DriverHandle>,
    broken: bool,
}

impl fmt::Debug for PooledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHandle")
            .field("pool", &self.pool.fingerprint.short())
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl PooledHandle {
    fn new(pool: Arc<HandlePool>, handle: Box<dyn DriverHandle>) -> Self {
        Self {
            pool,
            handle,
            broken: false,
        }
    }

    pub(crate) fn driver_mut(&mut self) -> &mut dyn DriverHandle {
        self.handle.as_mut()
    }

    pub(crate) const fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        let handle = std::mem::replace(&mut self.handle, Box::new(ClosedHandle));
        self.pool.checkin(handle, self.broken);
    }
}
