//! Endpoint configuration for the remote services.

use std::time::Duration;

use scorefill_core::{CacheBustStyle, ConfigError, Timeouts};

pub const DEFAULT_API_BASE: &str = "https://buzzfunbackend.buzzdotfun.workers.dev/api";
pub const DEFAULT_IDENTITY_BASE: &str = "https://api.neynar.com/v2/farcaster";

pub const API_BASE_ENV: &str = "SCOREFILL_API_BASE";
pub const IDENTITY_BASE_ENV: &str = "SCOREFILL_IDENTITY_BASE";
pub const API_KEY_ENV: &str = "NEYNAR_API_KEY";

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Creator score and leaderboard API
#[derive(Debug, Clone)]
pub struct ScoreApiConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    pub timeouts: Timeouts,
    pub cache_bust: CacheBustStyle,
}

impl Default for ScoreApiConfig {
    fn default() -> Self {
        ScoreApiConfig {
            base_url: trim_base(
                &std::env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            ),
            timeouts: Timeouts::default(),
            cache_bust: CacheBustStyle::default(),
        }
    }
}

impl ScoreApiConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        ScoreApiConfig {
            base_url: trim_base(base_url),
            timeouts: Timeouts::default(),
            cache_bust: CacheBustStyle::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_cache_bust(mut self, style: CacheBustStyle) -> Self {
        self.cache_bust = style;
        self
    }
}

/// Identity (user lookup) service
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub base_url: String,
    /// Sent as `x-api-key`
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            base_url: trim_base(
                &std::env::var(IDENTITY_BASE_ENV)
                    .unwrap_or_else(|_| DEFAULT_IDENTITY_BASE.to_string()),
            ),
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            timeout: Timeouts::default().verify,
        }
    }
}

impl IdentityConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        IdentityConfig {
            base_url: trim_base(base_url),
            api_key: None,
            timeout: Timeouts::default().verify,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The API key, or the startup error for a missing credential.
    pub fn require_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential(API_KEY_ENV))
    }
}
