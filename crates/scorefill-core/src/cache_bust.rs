//! Cache-defeat parameters for forced score recomputation.
//!
//! The scoring service caches records for about a week. A forced fetch adds
//! query parameters that no cached response can match: a strictly increasing
//! timestamp token, and in the `Full` style also a random nonce and explicit
//! refresh/force flags.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Which cache-busting parameters to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBustStyle {
    /// `t={token}` only
    Timestamp,
    /// `refresh=true&t={token}&r={nonce}&force=1` plus `Cache-Control: no-cache`
    #[default]
    Full,
}

/// Parameters for one forced request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBustParams {
    pub token: i64,
    pub nonce: Option<u32>,
    pub force: bool,
}

impl CacheBustParams {
    /// Query pairs in wire order.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if self.force {
            pairs.push(("refresh", "true".to_string()));
        }
        pairs.push(("t", self.token.to_string()));
        if let Some(nonce) = self.nonce {
            pairs.push(("r", nonce.to_string()));
        }
        if self.force {
            pairs.push(("force", "1".to_string()));
        }
        pairs
    }

    /// Whether a `Cache-Control: no-cache` header should accompany the request.
    pub fn no_cache_header(&self) -> bool {
        self.force
    }
}

/// Issues cache-busting parameters with a token that never repeats or goes
/// backwards within the process, even when two calls land in the same
/// millisecond.
#[derive(Debug)]
pub struct CacheBuster {
    style: CacheBustStyle,
    last_token: AtomicI64,
}

impl CacheBuster {
    pub fn new(style: CacheBustStyle) -> Self {
        Self {
            style,
            last_token: AtomicI64::new(0),
        }
    }

    pub fn style(&self) -> CacheBustStyle {
        self.style
    }

    pub fn params(&self) -> CacheBustParams {
        let token = self.next_token(chrono::Utc::now().timestamp_millis());
        match self.style {
            CacheBustStyle::Timestamp => CacheBustParams {
                token,
                nonce: None,
                force: false,
            },
            CacheBustStyle::Full => CacheBustParams {
                token,
                nonce: Some(rand::rng().random_range(1000..=9999)),
                force: true,
            },
        }
    }

    fn next_token(&self, now_ms: i64) -> i64 {
        let mut current = self.last_token.load(Ordering::Relaxed);
        loop {
            let next = now_ms.max(current + 1);
            match self.last_token.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for CacheBuster {
    fn default() -> Self {
        Self::new(CacheBustStyle::default())
    }
}
