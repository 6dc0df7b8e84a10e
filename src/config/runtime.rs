//! Runtime mode flags.

/// Process mode flags that change caching behaviour.
///
/// Either flag disables the on-disk schema cache so schema drift during
/// development or interactive sessions is always re-read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// Debug mode.
    pub debug: bool,
    /// Interactive / CLI mode.
    pub interactive: bool,
}

impl RuntimeFlags {
    /// Production mode: disk cache enabled.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            debug: false,
            interactive: false,
        }
    }

    /// Debug mode.
    #[must_use]
    pub const fn debug() -> Self {
        Self {
            debug: true,
            interactive: false,
        }
    }

    /// Interactive mode.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            debug: false,
            interactive: true,
        }
    }

    /// Returns true if schema metadata may be written to disk.
    #[must_use]
    pub const fn allows_disk_cache(&self) -> bool {
        !self.debug && !self.interactive
    }

    /// Applies `DBFLOW_DEBUG` / `DBFLOW_INTERACTIVE` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("DBFLOW_DEBUG") {
            self.debug = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("DBFLOW_INTERACTIVE") {
            self.interactive = parse_flag(&v);
        }
        self
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
