//! Backfill configuration and presets.
//!
//! Every knob that used to be a script-level constant lives here and is
//! handed to the loop at construction. Presets reproduce the three sampling
//! variants; a TOML profile or CLI flags override individual fields.

use crate::domain::ScoreRecord;
use crate::error::ConfigError;
use crate::sampler::{RangeTable, RangeWeight};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUOTA: u32 = 100;

/// Named sampling variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Identity pre-check before every score request.
    #[default]
    Verified,
    /// Score API only; it rejects unknown keys itself.
    Simple,
    /// Score API only, skewed towards the earliest keys.
    Targeted,
}

impl Preset {
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Verified => "verified",
            Preset::Simple => "simple",
            Preset::Targeted => "targeted",
        }
    }

    pub fn ranges(&self) -> RangeTable {
        let ranges = match self {
            Preset::Verified => vec![
                RangeWeight::new(1, 1000, 0.3),
                RangeWeight::new(1000, 5000, 0.4),
                RangeWeight::new(5000, 20000, 0.2),
                RangeWeight::new(20000, 50000, 0.1),
            ],
            Preset::Simple => vec![
                RangeWeight::new(1, 1000, 0.4),
                RangeWeight::new(1000, 5000, 0.3),
                RangeWeight::new(5000, 15000, 0.2),
                RangeWeight::new(15000, 30000, 0.1),
            ],
            Preset::Targeted => vec![
                RangeWeight::new(1, 100, 0.3),
                RangeWeight::new(100, 500, 0.25),
                RangeWeight::new(500, 2000, 0.2),
                RangeWeight::new(2000, 8000, 0.15),
                RangeWeight::new(8000, 25000, 0.1),
            ],
        };
        RangeTable::builtin(ranges)
    }

    /// Attempt budget as a multiple of the quota.
    pub fn budget_multiplier(&self) -> u32 {
        match self {
            Preset::Simple => 2,
            Preset::Verified | Preset::Targeted => 3,
        }
    }

    fn request_delay(&self) -> Duration {
        match self {
            Preset::Verified => Duration::from_millis(2000),
            Preset::Simple => Duration::from_millis(1500),
            Preset::Targeted => Duration::from_millis(1000),
        }
    }

    fn progress_every(&self) -> u32 {
        match self {
            Preset::Verified => 10,
            Preset::Simple => 20,
            Preset::Targeted => 25,
        }
    }

    fn fetch_timeout(&self) -> Duration {
        match self {
            Preset::Targeted => Duration::from_secs(20),
            Preset::Verified | Preset::Simple => Duration::from_secs(30),
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(Preset::Verified),
            "simple" => Ok(Preset::Simple),
            "targeted" => Ok(Preset::Targeted),
            other => Err(ConfigError::Invalid(format!("unknown preset '{}'", other))),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What counts toward the success quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessCriterion {
    /// Any record with a score.
    #[default]
    ScoredNonNull,
    /// A scored record that also carries a handle or display name.
    Enriched,
}

impl SuccessCriterion {
    /// A record without a score never counts, whatever the criterion.
    pub fn is_success(&self, record: &ScoreRecord) -> bool {
        match self {
            SuccessCriterion::ScoredNonNull => record.is_scored(),
            SuccessCriterion::Enriched => record.is_scored() && record.has_enrichment(),
        }
    }
}

/// Timeout bound per collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub verify: Duration,
    pub fetch: Duration,
    /// Forced recomputation is slower on the service side.
    pub forced_fetch: Duration,
    pub leaderboard_read: Duration,
    pub rebuild: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            verify: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            forced_fetch: Duration::from_secs(60),
            leaderboard_read: Duration::from_secs(30),
            rebuild: Duration::from_secs(120),
        }
    }
}

/// Parameters of one backfill run.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    /// Run the identity pre-check before fetching.
    pub verify: bool,
    /// Target number of successes.
    pub quota: u32,
    /// Hard ceiling on attempts.
    pub attempt_budget: u32,
    /// Send cache-defeat parameters with every fetch.
    pub bust_cache: bool,
    pub criterion: SuccessCriterion,
    /// Rate-limit delay after every fetched attempt.
    pub request_delay: Duration,
    /// Backoff after a failed identity check.
    pub failed_check_delay: Duration,
    /// Log a progress line every N attempts.
    pub progress_every: u32,
    /// Stop after this many duplicate draws in a row.
    pub max_consecutive_duplicates: u32,
    /// Number of best records kept for the run summary.
    pub top_n: usize,
    pub timeouts: Timeouts,
}

impl BackfillConfig {
    pub fn from_preset(preset: Preset, quota: u32) -> Self {
        Self {
            verify: preset == Preset::Verified,
            quota,
            attempt_budget: quota.saturating_mul(preset.budget_multiplier()),
            bust_cache: false,
            criterion: SuccessCriterion::ScoredNonNull,
            request_delay: preset.request_delay(),
            failed_check_delay: Duration::from_millis(500),
            progress_every: preset.progress_every(),
            max_consecutive_duplicates: 10_000,
            top_n: 10,
            timeouts: Timeouts {
                fetch: preset.fetch_timeout(),
                ..Timeouts::default()
            },
        }
    }

    /// Config for driving a fixed list of `keys` keys through the pipeline.
    /// Quota and budget both equal the list length so nothing stops early.
    pub fn sweep(keys: usize, force: bool) -> Self {
        let n = u32::try_from(keys).unwrap_or(u32::MAX);
        Self {
            verify: false,
            quota: n,
            attempt_budget: n,
            bust_cache: force,
            criterion: if force {
                SuccessCriterion::Enriched
            } else {
                SuccessCriterion::ScoredNonNull
            },
            request_delay: Duration::from_millis(1000),
            failed_check_delay: Duration::from_millis(500),
            progress_every: 10,
            max_consecutive_duplicates: 10_000,
            top_n: 10,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_attempt_budget(mut self, budget: u32) -> Self {
        self.attempt_budget = budget;
        self
    }

    pub fn with_bust_cache(mut self, bust_cache: bool) -> Self {
        self.bust_cache = bust_cache;
        self
    }

    pub fn with_criterion(mut self, criterion: SuccessCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_progress_every(mut self, every: u32) -> Self {
        self.progress_every = every;
        self
    }

    /// Reject configurations the loop cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_budget == 0 {
            return Err(ConfigError::Invalid("attempt budget must be at least 1".to_string()));
        }
        if self.progress_every == 0 {
            return Err(ConfigError::Invalid("progress interval must be at least 1".to_string()));
        }
        if self.max_consecutive_duplicates == 0 {
            return Err(ConfigError::Invalid(
                "duplicate draw limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional TOML overrides for a backfill run.
///
/// ```toml
/// preset = "simple"
/// quota = 50
/// request_delay_ms = 750
/// ranges = [
///     { lower = 1, upper = 1000, mass = 0.6 },
///     { lower = 1000, upper = 5000, mass = 0.4 },
/// ]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub preset: Option<Preset>,
    pub quota: Option<u32>,
    pub attempt_budget: Option<u32>,
    pub verify: Option<bool>,
    pub bust_cache: Option<bool>,
    pub criterion: Option<SuccessCriterion>,
    pub request_delay_ms: Option<u64>,
    pub progress_every: Option<u32>,
    pub ranges: Option<RangeTable>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Field-wise overlay: values set in `self` win over `base`.
    pub fn or(self, base: Profile) -> Profile {
        Profile {
            preset: self.preset.or(base.preset),
            quota: self.quota.or(base.quota),
            attempt_budget: self.attempt_budget.or(base.attempt_budget),
            verify: self.verify.or(base.verify),
            bust_cache: self.bust_cache.or(base.bust_cache),
            criterion: self.criterion.or(base.criterion),
            request_delay_ms: self.request_delay_ms.or(base.request_delay_ms),
            progress_every: self.progress_every.or(base.progress_every),
            ranges: self.ranges.or(base.ranges),
        }
    }

    /// Build the run config: preset defaults first, then profile fields.
    pub fn to_config(&self, preset: Preset, quota: u32) -> BackfillConfig {
        let preset = self.preset.unwrap_or(preset);
        let quota = self.quota.unwrap_or(quota);
        let mut config = BackfillConfig::from_preset(preset, quota);
        if let Some(budget) = self.attempt_budget {
            config.attempt_budget = budget;
        }
        if let Some(verify) = self.verify {
            config.verify = verify;
        }
        if let Some(bust) = self.bust_cache {
            config.bust_cache = bust;
        }
        if let Some(criterion) = self.criterion {
            config.criterion = criterion;
        }
        if let Some(ms) = self.request_delay_ms {
            config.request_delay = Duration::from_millis(ms);
        }
        if let Some(every) = self.progress_every {
            config.progress_every = every;
        }
        config
    }

    /// Range table from the profile, or the preset's.
    pub fn range_table(&self, preset: Preset) -> RangeTable {
        self.ranges
            .clone()
            .unwrap_or_else(|| self.preset.unwrap_or(preset).ranges())
    }
}
