//! `config.toml` loading.
//!
//! ```toml
//! [source]
//! host = "imap.old-provider.example"
//! user = "alice"
//!
//! [dest]
//! host = "imap.new-provider.example"
//! user = "alice@example.com"
//!
//! [transfer]
//! retry_attempts = 3
//! retry_delay = 2
//! dedup = "materialize"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mailferry_core::TransferConfig;
use serde::Deserialize;
use tracing::debug;

/// Defaults for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountSettings {
    /// IMAP host.
    pub host: Option<String>,
    /// Login name.
    pub user: Option<String>,
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Default source account.
    pub source: AccountSettings,
    /// Default destination account.
    pub dest: AccountSettings,
    /// Engine tunables.
    pub transfer: TransferConfig,
}

impl Settings {
    /// `<config dir>/mailferry/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailferry")
            .join("config.toml")
    }

    /// Loads `explicit`, or the default path if it exists, or defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path();
                if !path.exists() {
                    debug!(path = %path.display(), "no config file, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings =
            Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(settings)
    }

    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.transfer.validate()?;
        Ok(settings)
    }
}
