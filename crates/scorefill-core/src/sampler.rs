//! Candidate key generation.
//!
//! `RangeSampler` draws keys from a weighted table of numeric ranges;
//! `FixedKeys` replays a given list once. Both feed the backfill loop through
//! [`CandidateSource`].

use crate::domain::Fid;
use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const MASS_EPSILON: f64 = 1e-9;

/// Produces the next key for the loop to consider.
pub trait CandidateSource {
    /// `None` means the source is exhausted and the run should stop.
    fn next_candidate(&mut self) -> Option<Fid>;
}

/// One weighted range: `lower` inclusive, `upper` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeWeight {
    pub lower: u64,
    pub upper: u64,
    pub mass: f64,
}

impl RangeWeight {
    pub const fn new(lower: u64, upper: u64, mass: f64) -> Self {
        Self { lower, upper, mass }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Fid {
        Fid(rng.random_range(self.lower..self.upper))
    }
}

impl FromStr for RangeWeight {
    type Err = ConfigError;

    /// Parses `lower-upper:mass`, e.g. `1-1000:0.3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRangeTable(format!("cannot parse range '{}'", s));
        let (bounds, mass) = s.trim().split_once(':').ok_or_else(invalid)?;
        let (lower, upper) = bounds.split_once('-').ok_or_else(invalid)?;
        Ok(RangeWeight {
            lower: lower.trim().parse().map_err(|_| invalid())?,
            upper: upper.trim().parse().map_err(|_| invalid())?,
            mass: mass.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Validated, ordered list of weighted ranges.
///
/// Masses sum to at most 1.0. Any shortfall lands on the last range, which
/// doubles as the fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RangeTable(Vec<RangeWeight>);

impl RangeTable {
    pub fn new(ranges: Vec<RangeWeight>) -> Result<Self, ConfigError> {
        if ranges.is_empty() {
            return Err(ConfigError::InvalidRangeTable(
                "at least one range is required".to_string(),
            ));
        }
        let mut total = 0.0;
        for r in &ranges {
            if r.lower == 0 {
                return Err(ConfigError::InvalidRangeTable(format!(
                    "range {}-{} starts at 0; keys are positive",
                    r.lower, r.upper
                )));
            }
            if r.lower >= r.upper {
                return Err(ConfigError::InvalidRangeTable(format!(
                    "range {}-{} is empty",
                    r.lower, r.upper
                )));
            }
            if !r.mass.is_finite() || !(0.0..=1.0).contains(&r.mass) {
                return Err(ConfigError::InvalidRangeTable(format!(
                    "mass {} of range {}-{} is outside [0, 1]",
                    r.mass, r.lower, r.upper
                )));
            }
            total += r.mass;
        }
        if total > 1.0 + MASS_EPSILON {
            return Err(ConfigError::InvalidRangeTable(format!(
                "masses sum to {:.4}, expected at most 1.0",
                total
            )));
        }
        Ok(RangeTable(ranges))
    }

    /// Compile-time tables that are known to satisfy the invariants.
    pub(crate) fn builtin(ranges: Vec<RangeWeight>) -> Self {
        debug_assert!(RangeTable::new(ranges.clone()).is_ok());
        RangeTable(ranges)
    }

    /// Parses a comma-separated list of `lower-upper:mass` entries.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let ranges = spec
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(RangeWeight::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ranges)
    }

    pub fn ranges(&self) -> &[RangeWeight] {
        &self.0
    }

    pub fn total_mass(&self) -> f64 {
        self.0.iter().map(|r| r.mass).sum()
    }

    /// Human-readable distribution, one line per range.
    pub fn describe(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|r| format!("{}-{}: {:.0}%", r.lower, r.upper, r.mass * 100.0))
            .collect()
    }

    fn fallback(&self) -> &RangeWeight {
        // non-empty by construction
        &self.0[self.0.len() - 1]
    }
}

impl<'de> Deserialize<'de> for RangeTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let ranges = Vec::<RangeWeight>::deserialize(deserializer)?;
        RangeTable::new(ranges).map_err(serde::de::Error::custom)
    }
}

/// Weighted random key sampler over a [`RangeTable`].
pub struct RangeSampler<R = StdRng> {
    table: RangeTable,
    rng: R,
}

impl RangeSampler<StdRng> {
    /// Sampler seeded from the OS entropy source.
    pub fn from_entropy(table: RangeTable) -> Self {
        Self::new(table, StdRng::from_os_rng())
    }

    /// Reproducible sampler.
    pub fn seeded(table: RangeTable, seed: u64) -> Self {
        Self::new(table, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RangeSampler<R> {
    pub fn new(table: RangeTable, rng: R) -> Self {
        Self { table, rng }
    }

    pub fn table(&self) -> &RangeTable {
        &self.table
    }

    /// Draw one key.
    ///
    /// Picks the first range whose cumulative mass reaches a uniform `r` in
    /// `[0, 1)`, then a uniform key inside it. Falls back to the last range
    /// when no cumulative mass reaches `r`.
    pub fn draw(&mut self) -> Fid {
        let r: f64 = self.rng.random();
        let mut cumulative = 0.0;
        for range in self.table.ranges() {
            if range.mass <= 0.0 {
                continue;
            }
            cumulative += range.mass;
            if cumulative >= r {
                return range.draw(&mut self.rng);
            }
        }
        let fallback = *self.table.fallback();
        fallback.draw(&mut self.rng)
    }
}

impl<R: Rng> CandidateSource for RangeSampler<R> {
    fn next_candidate(&mut self) -> Option<Fid> {
        Some(self.draw())
    }
}

/// Replays a fixed key list in order, then reports exhaustion.
#[derive(Debug, Clone)]
pub struct FixedKeys {
    keys: std::vec::IntoIter<Fid>,
    total: usize,
}

impl FixedKeys {
    pub fn new(keys: Vec<Fid>) -> Self {
        let total = keys.len();
        Self {
            keys: keys.into_iter(),
            total,
        }
    }

    /// Deduplicated, ascending key list from several sources.
    pub fn merged<I: IntoIterator<Item = Fid>>(keys: I) -> Self {
        let mut keys: Vec<Fid> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        Self::new(keys)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl CandidateSource for FixedKeys {
    fn next_candidate(&mut self) -> Option<Fid> {
        self.keys.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ranges: &[(u64, u64, f64)]) -> RangeTable {
        RangeTable::new(
            ranges
                .iter()
                .map(|&(l, u, m)| RangeWeight::new(l, u, m))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_draws_converge_to_configured_masses() {
        let t = table(&[
            (1, 1000, 0.3),
            (1000, 5000, 0.4),
            (5000, 20000, 0.2),
            (20000, 50000, 0.1),
        ]);
        let mut sampler = RangeSampler::seeded(t.clone(), 7);
        let n = 10_000;
        let mut counts = [0usize; 4];
        for _ in 0..n {
            let fid = sampler.draw().get();
            let idx = t
                .ranges()
                .iter()
                .position(|r| fid >= r.lower && fid < r.upper)
                .expect("draw outside every range");
            counts[idx] += 1;
        }
        for (count, range) in counts.iter().zip(t.ranges()) {
            let observed = *count as f64 / n as f64;
            assert!(
                (observed - range.mass).abs() < 0.03,
                "range {}-{} observed {:.3}, expected {:.3}",
                range.lower,
                range.upper,
                observed,
                range.mass
            );
        }
    }

    #[test]
    fn test_shortfall_goes_to_last_range() {
        let t = table(&[(1, 10, 0.0), (100, 200, 0.0)]);
        let mut sampler = RangeSampler::seeded(t, 1);
        for _ in 0..200 {
            let fid = sampler.draw().get();
            assert!((100..200).contains(&fid), "fallback drew {}", fid);
        }
    }

    #[test]
    fn test_partial_mass_spills_into_fallback() {
        let t = table(&[(1, 10, 0.5), (10, 20, 0.25)]);
        let mut sampler = RangeSampler::seeded(t, 3);
        let n = 10_000;
        let low = (0..n).filter(|_| sampler.draw().get() < 10).count();
        let observed = low as f64 / n as f64;
        assert!((observed - 0.5).abs() < 0.03, "observed {:.3}", observed);
    }

    #[test]
    fn test_upper_bound_is_exclusive() {
        let t = table(&[(5, 6, 1.0)]);
        let mut sampler = RangeSampler::seeded(t, 11);
        for _ in 0..50 {
            assert_eq!(sampler.draw(), Fid(5));
        }
    }

    #[test]
    fn test_rejects_overweight_table() {
        let err = RangeTable::new(vec![
            RangeWeight::new(1, 10, 0.7),
            RangeWeight::new(10, 20, 0.4),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("sum"));
    }

    #[test]
    fn test_rejects_empty_and_inverted_ranges() {
        assert!(RangeTable::new(vec![]).is_err());
        assert!(RangeTable::new(vec![RangeWeight::new(10, 10, 0.5)]).is_err());
        assert!(RangeTable::new(vec![RangeWeight::new(0, 10, 0.5)]).is_err());
        assert!(RangeTable::new(vec![RangeWeight::new(1, 10, -0.1)]).is_err());
    }

    #[test]
    fn test_parse_range_table() {
        let t = RangeTable::parse("1-1000:0.4, 1000-5000:0.6").unwrap();
        assert_eq!(t.ranges().len(), 2);
        assert_eq!(t.ranges()[1], RangeWeight::new(1000, 5000, 0.6));
        assert!((t.total_mass() - 1.0).abs() < 1e-12);
        assert_eq!(t.describe()[0], "1-1000: 40%");

        assert!(RangeTable::parse("1-1000").is_err());
        assert!(RangeTable::parse("a-b:0.1").is_err());
    }

    #[test]
    fn test_fixed_keys_merged_sorted_and_exhausts() {
        let mut keys = FixedKeys::merged(vec![Fid(5), Fid(1), Fid(5), Fid(3)]);
        assert_eq!(keys.total(), 3);
        assert_eq!(keys.next_candidate(), Some(Fid(1)));
        assert_eq!(keys.next_candidate(), Some(Fid(3)));
        assert_eq!(keys.next_candidate(), Some(Fid(5)));
        assert_eq!(keys.next_candidate(), None);
    }
}
