//! Leaderboard rebuild trigger and coverage audit.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::collaborators::AggregateService;
use crate::domain::{AggregateEntry, Fid};
use crate::error::CallError;
use crate::obs;

/// Snapshot of how much of the leaderboard carries profile data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub total_entries: usize,
    pub enriched_entries: usize,
    /// First entries of the leaderboard, in rank order.
    pub top: Vec<AggregateEntry>,
    /// Keys whose entry lacks a handle and a display name.
    pub missing: Vec<Fid>,
}

impl CoverageReport {
    pub fn from_entries(entries: &[AggregateEntry], sample: usize) -> Self {
        let missing: Vec<Fid> = entries
            .iter()
            .filter(|e| !e.has_enrichment())
            .map(|e| e.fid)
            .collect();
        Self {
            total_entries: entries.len(),
            enriched_entries: entries.len() - missing.len(),
            top: entries.iter().take(sample).cloned().collect(),
            missing,
        }
    }

    /// Enriched share of the leaderboard; 0 for an empty board.
    pub fn coverage_ratio(&self) -> f64 {
        if self.total_entries == 0 {
            0.0
        } else {
            self.enriched_entries as f64 / self.total_entries as f64
        }
    }
}

/// Which leaderboard keys to feed into a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySelection {
    All,
    MissingEnrichment,
    Top(usize),
}

impl std::str::FromStr for KeySelection {
    type Err = String;

    /// `all`, `missing`, or `top:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(KeySelection::All),
            "missing" => Ok(KeySelection::MissingEnrichment),
            other => other
                .strip_prefix("top:")
                .and_then(|n| n.parse().ok())
                .map(KeySelection::Top)
                .ok_or_else(|| format!("expected all, missing or top:N, got '{}'", other)),
        }
    }
}

/// Drives the downstream aggregate after a backfill.
pub struct AggregateRefresher {
    service: Arc<dyn AggregateService>,
    settle_delay: Duration,
    sample: usize,
}

impl AggregateRefresher {
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

    pub fn new(service: Arc<dyn AggregateService>) -> Self {
        Self {
            service,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
            sample: 10,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_sample(mut self, sample: usize) -> Self {
        self.sample = sample;
        self
    }

    /// Trigger a rebuild. `true` only means the trigger was accepted.
    pub async fn refresh(&self) -> bool {
        let accepted = match self.service.trigger_rebuild().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "leaderboard rebuild trigger failed");
                false
            }
        };
        obs::emit_rebuild_triggered(accepted);
        accepted
    }

    /// Read the leaderboard and count enriched entries.
    pub async fn audit(&self) -> Result<CoverageReport, CallError> {
        let entries = self.service.leaderboard().await?;
        let report = CoverageReport::from_entries(&entries, self.sample);
        obs::emit_coverage(&report);
        Ok(report)
    }

    /// Trigger a rebuild, give it time to settle, then audit.
    ///
    /// The audit runs even when the trigger failed; the board may still
    /// reflect an earlier rebuild.
    pub async fn refresh_and_audit(&self) -> (bool, Result<CoverageReport, CallError>) {
        let accepted = self.refresh().await;
        tokio::time::sleep(self.settle_delay).await;
        (accepted, self.audit().await)
    }

    /// Keys of the current leaderboard matching `selection`, in rank order.
    pub async fn select_keys(&self, selection: KeySelection) -> Result<Vec<Fid>, CallError> {
        let entries = self.service.leaderboard().await?;
        let keys = match selection {
            KeySelection::All => entries.iter().map(|e| e.fid).collect(),
            KeySelection::MissingEnrichment => entries
                .iter()
                .filter(|e| !e.has_enrichment())
                .map(|e| e.fid)
                .collect(),
            KeySelection::Top(n) => entries.iter().take(n).map(|e| e.fid).collect(),
        };
        Ok(keys)
    }
}
