//! Scorefill Core: weighted-sampling backfill engine
//!
//! Populates a sparse, lazily computed score store by probing candidate keys
//! against a scoring service until a success quota or an attempt budget is
//! reached, then nudges the downstream leaderboard to rebuild.
//!
//! ## Key Components
//!
//! - `RangeSampler` / `FixedKeys`: candidate sources
//! - `BackfillLoop`: the sampling / verify / fetch / account state machine
//! - `AggregateRefresher`: rebuild trigger and coverage audit
//! - `ExistenceVerifier`, `ScoreFetcher`, `AggregateService`: collaborator seams

pub mod backfill;
pub mod cache_bust;
pub mod collaborators;
pub mod config;
pub mod dedupe;
pub mod domain;
mod error;
pub mod fakes;
pub mod obs;
pub mod outcome;
pub mod refresher;
pub mod sampler;
pub mod telemetry;

pub use backfill::{
    AttemptOutcome, AttemptRecord, BackfillLoop, LoopState, OutcomeTally, RunSummary, Stage,
    StopReason,
};
pub use cache_bust::{CacheBustParams, CacheBustStyle, CacheBuster};
pub use collaborators::{AggregateService, ExistenceVerifier, ScoreFetcher};
pub use config::{BackfillConfig, Preset, Profile, SuccessCriterion, Timeouts, DEFAULT_QUOTA};
pub use dedupe::DedupeTracker;
pub use domain::{AggregateEntry, Fid, ScoreRecord};
pub use error::{CallError, ConfigError, FailureKind};
pub use outcome::{classify_body, classify_envelope, FetchOutcome};
pub use refresher::{AggregateRefresher, CoverageReport, KeySelection};
pub use sampler::{CandidateSource, FixedKeys, RangeSampler, RangeTable, RangeWeight};
