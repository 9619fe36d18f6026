//! Backfill loop: the state machine that turns candidate keys into score
//! records.
//!
//! ```text
//! Sampling -> Deduping -> (Verifying) -> Fetching -> Accounting -> Sampling | Stopped
//! ```
//!
//! One attempt is consumed per admitted key. Duplicate draws are discarded
//! without consuming budget or sleeping. No collaborator failure aborts the
//! run; each only decides whether the attempt added a success.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::collaborators::{ExistenceVerifier, ScoreFetcher};
use crate::config::BackfillConfig;
use crate::dedupe::DedupeTracker;
use crate::domain::{Fid, ScoreRecord};
use crate::error::{CallError, ConfigError, FailureKind};
use crate::obs;
use crate::outcome::FetchOutcome;
use crate::sampler::CandidateSource;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QuotaReached,
    BudgetExhausted,
    /// Fixed key list ran out, or too many duplicate draws in a row.
    CandidatesExhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::QuotaReached => "quota_reached",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::CandidatesExhausted => "candidates_exhausted",
        }
    }
}

/// Position of the loop in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Sampling,
    Deduping(Fid),
    Verifying(Fid),
    Fetching(Fid),
    Accounting,
    Stopped(StopReason),
}

/// Furthest pipeline stage an attempt reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Verifying,
    Fetching,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Verifying => "verifying",
            Stage::Fetching => "fetching",
        }
    }
}

/// What happened to one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Identity service did not confirm the key.
    Unverified,
    Fetched(FetchOutcome),
}

/// Ephemeral record of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt number within the run.
    pub attempt: u32,
    pub fid: Fid,
    pub stage: Stage,
    pub outcome: AttemptOutcome,
    /// Whether this attempt added a success.
    pub counted: bool,
}

impl AttemptRecord {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            AttemptOutcome::Unverified => Some(FailureKind::DomainNotFound),
            AttemptOutcome::Fetched(outcome) => outcome.failure_kind(),
        }
    }

    /// Short human-readable status.
    pub fn status(&self) -> String {
        match &self.outcome {
            AttemptOutcome::Unverified => "not found by identity service".to_string(),
            AttemptOutcome::Fetched(FetchOutcome::Scored(record)) if record.is_scored() => {
                if self.counted {
                    format!("scored {}", record.label())
                } else {
                    format!("scored {} (not counted)", record.label())
                }
            }
            AttemptOutcome::Fetched(FetchOutcome::Scored(record)) => {
                format!("inactive, no score ({})", record.tier_label())
            }
            AttemptOutcome::Fetched(FetchOutcome::NotFound(msg)) => format!("invalid FID: {}", msg),
            AttemptOutcome::Fetched(FetchOutcome::TransientFailure(err)) => {
                format!("failed: {}", err)
            }
        }
    }
}

/// Per-outcome counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    /// Records with a score.
    pub scored: u32,
    /// Records without a score (inactive entities).
    pub unscored: u32,
    pub not_found: u32,
    pub transport: u32,
    pub malformed: u32,
    /// Keys rejected by the identity pre-check.
    pub unverified: u32,
    /// Scored or unscored records carrying a handle or display name.
    pub enriched: u32,
}

impl OutcomeTally {
    fn record_fetch(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Scored(record) => {
                if record.is_scored() {
                    self.scored += 1;
                } else {
                    self.unscored += 1;
                }
                if record.has_enrichment() {
                    self.enriched += 1;
                }
            }
            FetchOutcome::NotFound(_) => self.not_found += 1,
            FetchOutcome::TransientFailure(CallError::Malformed(_)) => self.malformed += 1,
            FetchOutcome::TransientFailure(_) => self.transport += 1,
        }
    }

    /// Attempts that reached the fetch stage.
    pub fn fetched(&self) -> u32 {
        self.scored + self.unscored + self.not_found + self.transport + self.malformed
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub successes: u32,
    pub attempts: u32,
    pub quota: u32,
    pub attempt_budget: u32,
    pub stop_reason: StopReason,
    pub tally: OutcomeTally,
    /// Best-scoring records of the run, score descending.
    pub top: Vec<ScoreRecord>,
}

impl RunSummary {
    /// `successes / attempts`, or 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.attempts)
        }
    }

    pub fn quota_reached(&self) -> bool {
        self.successes >= self.quota
    }
}

/// Mutable counters of one run.
#[derive(Debug)]
struct RunState {
    attempts: u32,
    successes: u32,
    seen: DedupeTracker,
}

/// The backfill engine.
pub struct BackfillLoop<S> {
    config: BackfillConfig,
    source: S,
    verifier: Option<Arc<dyn ExistenceVerifier>>,
    fetcher: Arc<dyn ScoreFetcher>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    run: RunState,
    state: LoopState,
    tally: OutcomeTally,
    top: Vec<ScoreRecord>,
    consecutive_duplicates: u32,
    last_progress_at: u32,
}

impl<S: CandidateSource> BackfillLoop<S> {
    /// Build a loop for one run.
    ///
    /// A verifier is required when `config.verify` is set; it is ignored
    /// otherwise.
    pub fn new(
        config: BackfillConfig,
        source: S,
        verifier: Option<Arc<dyn ExistenceVerifier>>,
        fetcher: Arc<dyn ScoreFetcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.verify && verifier.is_none() {
            return Err(ConfigError::Invalid(
                "verification enabled but no existence verifier supplied".to_string(),
            ));
        }
        Ok(Self {
            config,
            source,
            verifier,
            fetcher,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            run: RunState {
                attempts: 0,
                successes: 0,
                seen: DedupeTracker::new(),
            },
            state: LoopState::Sampling,
            tally: OutcomeTally::default(),
            top: Vec::new(),
            consecutive_duplicates: 0,
            last_progress_at: 0,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.run.attempts
    }

    pub fn successes(&self) -> u32 {
        self.run.successes
    }

    pub fn tally(&self) -> &OutcomeTally {
        &self.tally
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, LoopState::Stopped(_))
    }

    /// Drive the loop to `Stopped` and report.
    pub async fn run(mut self) -> RunSummary {
        let span = obs::run_span(&self.run_id.to_string());
        async {
            let clock = tokio::time::Instant::now();
            obs::emit_run_started(
                &self.run_id.to_string(),
                self.config.quota,
                self.config.attempt_budget,
                self.verification_enabled(),
            );
            while !self.is_stopped() {
                self.step().await;
            }
            let summary = self.summary(clock.elapsed().as_millis() as u64);
            obs::emit_run_finished(&summary);
            summary
        }
        .instrument(span)
        .await
    }

    /// Perform one state transition. Returns the attempt record when the
    /// transition completed an attempt.
    pub async fn step(&mut self) -> Option<AttemptRecord> {
        match self.state {
            LoopState::Sampling => {
                self.state = match self.stop_condition() {
                    Some(reason) => LoopState::Stopped(reason),
                    None => match self.source.next_candidate() {
                        Some(fid) => LoopState::Deduping(fid),
                        None => LoopState::Stopped(StopReason::CandidatesExhausted),
                    },
                };
                None
            }
            LoopState::Deduping(fid) => {
                if !self.run.seen.admit(fid) {
                    self.consecutive_duplicates += 1;
                    debug!(fid = fid.get(), "duplicate draw discarded");
                    let limit = self.config.max_consecutive_duplicates;
                    self.state = if self.consecutive_duplicates >= limit {
                        LoopState::Stopped(StopReason::CandidatesExhausted)
                    } else {
                        LoopState::Sampling
                    };
                    return None;
                }
                self.consecutive_duplicates = 0;
                self.run.attempts += 1;
                self.state = if self.verification_enabled() {
                    LoopState::Verifying(fid)
                } else {
                    LoopState::Fetching(fid)
                };
                None
            }
            LoopState::Verifying(fid) => {
                let exists = match &self.verifier {
                    Some(verifier) => verifier.exists(fid).await,
                    None => true,
                };
                if exists {
                    self.state = LoopState::Fetching(fid);
                    return None;
                }
                self.tally.unverified += 1;
                let record = AttemptRecord {
                    attempt: self.run.attempts,
                    fid,
                    stage: Stage::Verifying,
                    outcome: AttemptOutcome::Unverified,
                    counted: false,
                };
                obs::emit_attempt(&record, self.run.successes, self.config.quota);
                tokio::time::sleep(self.config.failed_check_delay).await;
                self.maybe_emit_progress();
                self.state = LoopState::Sampling;
                Some(record)
            }
            LoopState::Fetching(fid) => {
                let outcome = self.fetcher.fetch(fid, self.config.bust_cache).await;
                self.tally.record_fetch(&outcome);
                let counted = match &outcome {
                    FetchOutcome::Scored(record) => self.config.criterion.is_success(record),
                    _ => false,
                };
                if counted {
                    self.run.successes += 1;
                }
                if let FetchOutcome::Scored(record) = &outcome {
                    if record.is_scored() {
                        self.remember_top(record.clone());
                    }
                }
                let record = AttemptRecord {
                    attempt: self.run.attempts,
                    fid,
                    stage: Stage::Fetching,
                    outcome: AttemptOutcome::Fetched(outcome),
                    counted,
                };
                obs::emit_attempt(&record, self.run.successes, self.config.quota);
                self.state = LoopState::Accounting;
                Some(record)
            }
            LoopState::Accounting => {
                tokio::time::sleep(self.config.request_delay).await;
                self.maybe_emit_progress();
                self.state = match self.stop_condition() {
                    Some(reason) => LoopState::Stopped(reason),
                    None => LoopState::Sampling,
                };
                None
            }
            LoopState::Stopped(_) => None,
        }
    }

    /// Snapshot of the run so far.
    pub fn summary(&self, duration_ms: u64) -> RunSummary {
        let stop_reason = match self.state {
            LoopState::Stopped(reason) => reason,
            _ => self.stop_condition().unwrap_or(StopReason::BudgetExhausted),
        };
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            duration_ms,
            successes: self.run.successes,
            attempts: self.run.attempts,
            quota: self.config.quota,
            attempt_budget: self.config.attempt_budget,
            stop_reason,
            tally: self.tally.clone(),
            top: self.top.clone(),
        }
    }

    fn verification_enabled(&self) -> bool {
        self.config.verify && self.verifier.is_some()
    }

    fn stop_condition(&self) -> Option<StopReason> {
        if self.run.successes >= self.config.quota {
            Some(StopReason::QuotaReached)
        } else if self.run.attempts >= self.config.attempt_budget {
            Some(StopReason::BudgetExhausted)
        } else {
            None
        }
    }

    fn maybe_emit_progress(&mut self) {
        let attempts = self.run.attempts;
        if attempts > 0
            && attempts % self.config.progress_every == 0
            && attempts != self.last_progress_at
        {
            self.last_progress_at = attempts;
            obs::emit_progress(self.run.successes, self.config.quota, attempts);
        }
    }

    fn remember_top(&mut self, record: ScoreRecord) {
        if self.config.top_n == 0 {
            return;
        }
        self.top.push(record);
        self.top.sort_by(|a, b| {
            let sa = a.overall_score.unwrap_or(f64::MIN);
            let sb = b.overall_score.unwrap_or(f64::MIN);
            sb.total_cmp(&sa).then_with(|| a.fid.cmp(&b.fid))
        });
        self.top.truncate(self.config.top_n);
    }
}
