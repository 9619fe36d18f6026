//! Identity service client
//!
//! `GET {base}/user/bulk?fids={fid}` with `x-api-key`. A key exists when the
//! call returns 200 and the first user carries the same fid.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use scorefill_core::{ConfigError, ExistenceVerifier, Fid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IdentityConfig;
use crate::error::ClientError;
use crate::USER_AGENT;

/// One user of a bulk lookup response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub fid: Fid,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkUsers {
    #[serde(default)]
    users: Vec<IdentityUser>,
}

/// Raw lookup result, used for connectivity diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityLookup {
    pub status: u16,
    /// First user of the response, when the body decoded
    pub user: Option<IdentityUser>,
}

impl IdentityLookup {
    /// Whether the lookup confirms `fid`.
    pub fn confirms(&self, fid: Fid) -> bool {
        self.status == 200 && self.user.as_ref().map(|u| u.fid == fid).unwrap_or(false)
    }

    /// Operator hint for well-known failure statuses.
    pub fn hint(&self) -> Option<&'static str> {
        match self.status {
            401 => Some("API key might be invalid"),
            429 => Some("rate limited"),
            _ => None,
        }
    }
}

/// HTTP client for the identity service
pub struct IdentityClient {
    config: IdentityConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl IdentityClient {
    /// Fails with `MissingCredential` when no API key is configured.
    pub fn new(config: IdentityConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_key()?.to_string();
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;
        Ok(IdentityClient {
            config,
            api_key,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(IdentityConfig::from_env())
    }

    /// Look up one key and report the status and first user.
    pub async fn lookup(&self, fid: Fid) -> Result<IdentityLookup, ClientError> {
        let timeout = self.config.timeout;
        let response = self
            .http_client
            .get(format!("{}/user/bulk", self.config.base_url))
            .query(&[("fids", fid.get())])
            .header(ACCEPT, "application/json")
            .header("x-api-key", &self.api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        let user = serde_json::from_str::<BulkUsers>(&body)
            .ok()
            .and_then(|b| b.users.into_iter().next());
        Ok(IdentityLookup { status, user })
    }
}

#[async_trait]
impl ExistenceVerifier for IdentityClient {
    async fn exists(&self, fid: Fid) -> bool {
        match self.lookup(fid).await {
            Ok(lookup) => {
                let confirmed = lookup.confirms(fid);
                if !confirmed {
                    debug!(fid = fid.get(), status = lookup.status, "identity not confirmed");
                }
                confirmed
            }
            Err(e) => {
                debug!(fid = fid.get(), error = %e, "identity check failed");
                false
            }
        }
    }
}
