//! Structured observability hooks for backfill runs.
//!
//! - `run_span`: run-scoped span carrying the `run_id`
//! - emit functions for attempts, progress, run completion and audits
//!
//! All events carry an `event = "..."` field so JSON output can be filtered
//! without parsing messages.

use tracing::{info, warn};

use crate::backfill::{AttemptRecord, RunSummary};
use crate::refresher::CoverageReport;

/// Span tagging every event of one run with its id.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("scorefill.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, quota: u32, attempt_budget: u32, verify: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        quota = quota,
        attempt_budget = attempt_budget,
        verify = verify,
    );
}

/// Emit event: one attempt completed. This is the per-attempt status line.
pub fn emit_attempt(record: &AttemptRecord, successes: u32, quota: u32) {
    info!(
        event = "attempt.finished",
        attempt = record.attempt,
        fid = record.fid.get(),
        stage = record.stage.as_str(),
        counted = record.counted,
        successes = successes,
        quota = quota,
        "[{:>3}] FID {}: {}",
        record.attempt,
        record.fid,
        record.status()
    );
}

/// Emit event: periodic progress summary.
pub fn emit_progress(successes: u32, quota: u32, attempts: u32) {
    let pct = if quota == 0 {
        100.0
    } else {
        f64::from(successes) / f64::from(quota) * 100.0
    };
    info!(
        event = "run.progress",
        successes = successes,
        quota = quota,
        attempts = attempts,
        "progress: {}/{} ({:.1}%) after {} attempts",
        successes,
        quota,
        pct,
        attempts
    );
}

/// Emit event: run stopped.
pub fn emit_run_finished(summary: &RunSummary) {
    info!(
        event = "run.finished",
        run_id = %summary.run_id,
        stop_reason = summary.stop_reason.as_str(),
        successes = summary.successes,
        attempts = summary.attempts,
        quota = summary.quota,
        success_rate = summary.success_rate(),
        duration_ms = summary.duration_ms,
    );
    if !summary.quota_reached() {
        warn!(
            event = "run.quota_missed",
            missing = summary.quota.saturating_sub(summary.successes),
            "quota not reached"
        );
    }
}

/// Emit event: leaderboard rebuild trigger result.
pub fn emit_rebuild_triggered(accepted: bool) {
    if accepted {
        info!(event = "aggregate.rebuild_triggered", accepted = true);
    } else {
        warn!(event = "aggregate.rebuild_triggered", accepted = false);
    }
}

/// Emit event: leaderboard coverage audited.
pub fn emit_coverage(report: &CoverageReport) {
    info!(
        event = "aggregate.audited",
        total_entries = report.total_entries,
        enriched_entries = report.enriched_entries,
        coverage = report.coverage_ratio(),
    );
}
