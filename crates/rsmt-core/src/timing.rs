//! Orchestrator timing
//!
//! Loaded from an optional TOML file:
//!
//! ```toml
//! poll_interval_ms = 500
//! settle_ms = 3000
//! retry_delay_ms = 1000
//! max_verify_attempts = 20
//! max_wait_polls = 60
//! ```
//!
//! Missing keys keep their defaults; the two `max_*` bounds default to
//! unbounded.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Delays and retry bounds used by [`crate::Job`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timing {
    /// Interval between device count polls while waiting for re-enumeration
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause once all devices have re-enumerated
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause between verification attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Give up after this many verification attempts
    #[serde(default)]
    pub max_verify_attempts: Option<u32>,
    /// Give up waiting for re-enumeration after this many polls
    #[serde(default)]
    pub max_wait_polls: Option<u32>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_verify_attempts: None,
            max_wait_polls: None,
        }
    }
}

impl Timing {
    /// Load timing from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse timing from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Usage(format!("invalid timing file: {}", e)))
    }

    /// Interval between device count polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Settle time after re-enumeration
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Delay between verification attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Timing::from_toml_str("").unwrap(), Timing::default());
        assert_eq!(Timing::default().settle(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_override() {
        let t = Timing::from_toml_str("settle_ms = 10\nmax_verify_attempts = 3\n").unwrap();
        assert_eq!(t.settle_ms, 10);
        assert_eq!(t.poll_interval_ms, 1000);
        assert_eq!(t.max_verify_attempts, Some(3));
        assert_eq!(t.max_wait_polls, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Timing::from_toml_str("retry_delay = 5\n").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Usage);
    }

    #[test]
    fn test_wrong_type_rejected() {
        assert!(Timing::from_toml_str("settle_ms = \"long\"\n").is_err());
    }
}
