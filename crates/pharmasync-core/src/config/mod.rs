//! Sync configuration.
//!
//! Provides `SyncConfig`, the settings every client needs to reach the remote
//! document store and to schedule sync passes. Values come from the
//! environment (or any key lookup, for tests).

use std::env;
use std::time::Duration;

use crate::util::{is_http_url, is_truthy, normalize_text_option};
use crate::{Error, Result};

pub const ENV_REMOTE_URL: &str = "PHARMASYNC_REMOTE_URL";
pub const ENV_REMOTE_TOKEN: &str = "PHARMASYNC_REMOTE_TOKEN";
pub const ENV_SYNC_INTERVAL_SECS: &str = "PHARMASYNC_SYNC_INTERVAL_SECS";
pub const ENV_OFFLINE: &str = "PHARMASYNC_OFFLINE";

/// Default automatic sync interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for remote sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the remote document store (e.g. `https://docs.example.com/v1`)
    pub remote_url: Option<String>,
    /// Bearer token for the remote store
    pub auth_token: Option<String>,
    /// Automatic sync interval (`None` means manual sync only)
    pub sync_interval: Option<Duration>,
    /// Explicit offline override; no remote calls are attempted while set
    pub offline_mode: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            auth_token: None,
            sync_interval: Some(DEFAULT_SYNC_INTERVAL),
            offline_mode: false,
        }
    }
}

impl SyncConfig {
    /// Create a new sync configuration
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(remote_url.into()),
            ..Self::default()
        }
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable automatic sync (manual sync only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Force offline mode
    #[must_use]
    pub const fn with_offline_mode(mut self, offline: bool) -> Self {
        self.offline_mode = offline;
        self
    }

    /// Check if a remote store is configured
    pub const fn is_configured(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Whether remote calls should be attempted at all
    pub const fn is_online(&self) -> bool {
        self.is_configured() && !self.offline_mode
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// A token without a URL, a URL without an http(s) scheme, or an
    /// unparsable interval is an error rather than silently ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let remote_url = normalize_text_option(lookup(ENV_REMOTE_URL));
        let auth_token = normalize_text_option(lookup(ENV_REMOTE_TOKEN));

        if auth_token.is_some() && remote_url.is_none() {
            return Err(Error::InvalidInput(format!(
                "{ENV_REMOTE_TOKEN} is set but {ENV_REMOTE_URL} is missing"
            )));
        }

        let remote_url = match remote_url {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(url) => {
                return Err(Error::InvalidInput(format!(
                    "{ENV_REMOTE_URL} must include http:// or https:// (got '{url}')"
                )));
            }
            None => None,
        };

        let sync_interval = match normalize_text_option(lookup(ENV_SYNC_INTERVAL_SECS)) {
            None => Some(DEFAULT_SYNC_INTERVAL),
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    Error::InvalidInput(format!(
                        "{ENV_SYNC_INTERVAL_SECS} must be a whole number of seconds (got '{raw}')"
                    ))
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        let offline_mode = lookup(ENV_OFFLINE).is_some_and(|value| is_truthy(&value));

        Ok(Self {
            remote_url,
            auth_token,
            sync_interval,
            offline_mode,
        })
    }
}
