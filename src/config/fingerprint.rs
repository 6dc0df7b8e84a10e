//! Deterministic configuration digests used as pool keys.

use super::ConnectionConfig;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// SHA-256 digest of a configuration plus its execution options.
///
/// Two configurations with the same fingerprint share one pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of `config` combined with `options`.
    #[must_use]
    pub fn compute(config: &ConnectionConfig, options: &BTreeMap<String, String>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(config.identity().to_string().as_bytes());
        hasher.update(b"\x00");
        hasher.update(serde_json::json!(options).to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an abbreviated digest for log output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_configs_share_fingerprint() {
        let a = ConnectionConfig::sqlite("app.db");
        let b = ConnectionConfig::sqlite("app.db");
        let opts = BTreeMap::new();
        assert_eq!(a.fingerprint(&opts), b.fingerprint(&opts));
        assert_eq!(a.fingerprint(&opts).as_str().len(), 64);
    }

    #[test]
    fn test_options_change_fingerprint() {
        let config = ConnectionConfig::sqlite("app.db");
        let mut opts = BTreeMap::new();
        let plain = config.fingerprint(&opts);
        opts.insert("timeout".to_string(), "3".to_string());
        assert_ne!(plain, config.fingerprint(&opts));
    }

    #[test]
    fn test_password_changes_fingerprint() {
        let opts = BTreeMap::new();
        let a = ConnectionConfig::sqlite("app.db").with_credentials("root", "a");
        let b = ConnectionConfig::sqlite("app.db").with_credentials("root", "b");
        assert_ne!(a.fingerprint(&opts), b.fingerprint(&opts));
    }

    #[test]
    fn test_short_prefix() {
        let fp = ConnectionConfig::sqlite("x.db").fingerprint(&BTreeMap::new());
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
    }
}
