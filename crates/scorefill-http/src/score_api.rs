//! Creator score and leaderboard API client
//!
//! - `GET  {base}/score/creator/{fid}` computes (or returns the cached) score
//! - `GET  {base}/leaderboard` reads the ranked aggregate
//! - `POST {base}/leaderboard/refresh` asks the aggregate to rebuild

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use scorefill_core::outcome::{classify_body, LeaderboardEnvelope};
use scorefill_core::{
    AggregateEntry, AggregateService, CacheBuster, CallError, FetchOutcome, Fid, ScoreFetcher,
};
use tracing::debug;

use crate::config::ScoreApiConfig;
use crate::error::ClientError;
use crate::USER_AGENT;

/// HTTP client for the scoring service
pub struct ScoreApiClient {
    config: ScoreApiConfig,
    http_client: reqwest::Client,
    buster: CacheBuster,
}

impl ScoreApiClient {
    pub fn new(config: ScoreApiConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let buster = CacheBuster::new(config.cache_bust);
        Ok(ScoreApiClient {
            config,
            http_client,
            buster,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ScoreApiConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Raw score request. Returns the status and body whatever the status.
    async fn get_score(&self, fid: Fid, bust_cache: bool) -> Result<(u16, String), ClientError> {
        let url = self.url(&format!("/score/creator/{}", fid));
        let mut request = self.http_client.get(&url);
        let timeout = if bust_cache {
            let params = self.buster.params();
            request = request.query(&params.query());
            if params.no_cache_header() {
                request = request.header(CACHE_CONTROL, "no-cache");
            }
            self.config.timeouts.forced_fetch
        } else {
            self.config.timeouts.fetch
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        debug!(fid = fid.get(), status, bust_cache, "score response");
        Ok((status, body))
    }

    async fn read_leaderboard(&self) -> Result<Vec<AggregateEntry>, CallError> {
        let timeout = self.config.timeouts.leaderboard_read;
        let response = self
            .http_client
            .get(self.url("/leaderboard"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        let envelope: LeaderboardEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Status(status.as_u16()).into())
            }
            Err(e) => return Err(ClientError::Json(e).into()),
        };
        envelope.into_entries()
    }

    async fn post_refresh(&self) -> Result<(), ClientError> {
        let timeout: Duration = self.config.timeouts.rebuild;
        let response = self
            .http_client
            .post(self.url("/leaderboard/refresh"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, timeout))?;
        // Any answer means the trigger reached the service.
        debug!(status = response.status().as_u16(), "leaderboard refresh answered");
        Ok(())
    }
}

#[async_trait]
impl ScoreFetcher for ScoreApiClient {
    async fn fetch(&self, fid: Fid, bust_cache: bool) -> FetchOutcome {
        match self.get_score(fid, bust_cache).await {
            Ok((status, body)) => classify_body(fid, status, &body),
            Err(e) => FetchOutcome::TransientFailure(e.into()),
        }
    }
}

#[async_trait]
impl AggregateService for ScoreApiClient {
    async fn trigger_rebuild(&self) -> Result<(), CallError> {
        Ok(self.post_refresh().await?)
    }

    async fn leaderboard(&self) -> Result<Vec<AggregateEntry>, CallError> {
        self.read_leaderboard().await
    }
}
