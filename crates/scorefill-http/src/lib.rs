//! Scorefill HTTP: production collaborators for the backfill engine
//!
//! - `IdentityClient`: [`ExistenceVerifier`](scorefill_core::ExistenceVerifier) over the
//!   identity service
//! - `ScoreApiClient`: [`ScoreFetcher`](scorefill_core::ScoreFetcher) and
//!   [`AggregateService`](scorefill_core::AggregateService) over the creator score API

pub mod config;
mod error;
pub mod identity;
pub mod score_api;

pub use config::{IdentityConfig, ScoreApiConfig};
pub use error::ClientError;
pub use identity::{IdentityClient, IdentityLookup, IdentityUser};
pub use score_api::ScoreApiClient;

pub(crate) const USER_AGENT: &str = concat!("scorefill/", env!("CARGO_PKG_VERSION"));
