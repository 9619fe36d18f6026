//! Collaborator seams used by the backfill engine.
//!
//! - `ExistenceVerifier`: identity service pre-check (optional stage)
//! - `ScoreFetcher`: creator score API
//! - `AggregateService`: leaderboard read and rebuild trigger
//!
//! The engine depends only on these traits. HTTP implementations live in
//! `scorefill-http`; in-memory fakes live in [`crate::fakes`].

use async_trait::async_trait;

use crate::domain::{AggregateEntry, Fid};
use crate::error::CallError;
use crate::outcome::FetchOutcome;

/// Does a key correspond to a live identity?
#[async_trait]
pub trait ExistenceVerifier: Send + Sync {
    /// Fails closed: any transport error, bad status, malformed body or
    /// identity mismatch returns `false`.
    async fn exists(&self, fid: Fid) -> bool;
}

/// Requests (or forces) computation of a score record.
#[async_trait]
pub trait ScoreFetcher: Send + Sync {
    /// With `bust_cache` set the request must bypass every caching layer of
    /// the scoring service.
    async fn fetch(&self, fid: Fid, bust_cache: bool) -> FetchOutcome;
}

/// Downstream ranked aggregate derived from the score records.
#[async_trait]
pub trait AggregateService: Send + Sync {
    /// Ask the aggregate to rebuild itself. Success means the trigger was
    /// accepted, not that the rebuild finished.
    async fn trigger_rebuild(&self) -> Result<(), CallError>;

    /// Read the current leaderboard, best rank first.
    async fn leaderboard(&self) -> Result<Vec<AggregateEntry>, CallError>;
}
