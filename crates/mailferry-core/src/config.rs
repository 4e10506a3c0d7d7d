//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How duplicates in the destination mailbox are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// One header search on the destination per message.
    #[default]
    Search,
    /// Fetch every destination Message-ID once per mailbox pair.
    Materialize,
}

/// Tunables shared by transfer, backup and restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Attempts per remote operation, including the first.
    pub retry_attempts: u32,
    /// Pause between attempts.
    #[serde(with = "seconds")]
    pub retry_delay: Duration,
    /// Messages between advisory NOOPs on both endpoints.
    pub keepalive_interval: u32,
    /// Duplicate detection strategy.
    pub dedup: DedupStrategy,
    /// Skip source UIDs that also exist as destination UIDs.
    ///
    /// A coarse legacy filter; identity-based dedup still applies to
    /// everything that passes it.
    pub uid_prefilter: bool,
    /// Try plaintext port 143 after the encrypted candidates.
    pub allow_plaintext: bool,
    /// TCP connect and TLS handshake timeout per candidate.
    #[serde(with = "seconds")]
    pub connect_timeout: Duration,
    /// Timeout for one command round trip.
    #[serde(with = "seconds")]
    pub io_timeout: Duration,
    /// Directory under which restore extracts archives; the system temp
    /// directory when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            keepalive_interval: 50,
            dedup: DedupStrategy::Search,
            uid_prefilter: false,
            allow_plaintext: false,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(120),
            work_dir: None,
        }
    }
}

impl TransferConfig {
    /// Checks that the values make sense together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero attempts or a zero keepalive
    /// interval.
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(Error::Config("retry_attempts must be at least 1".into()));
        }
        if self.keepalive_interval == 0 {
            return Err(Error::Config(
                "keepalive_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Serializes a [`Duration`] as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
