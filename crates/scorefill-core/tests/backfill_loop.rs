//! End-to-end runs of the backfill loop against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use scorefill_core::fakes::{MemoryLeaderboard, ScriptedFetcher, StaticVerifier};
use scorefill_core::{
    AggregateEntry, AggregateRefresher, BackfillConfig, BackfillLoop, CallError, ExistenceVerifier,
    FailureKind, FetchOutcome, Fid, FixedKeys, Preset, RangeSampler, RangeTable, RangeWeight,
    ScoreRecord, StopReason,
};

fn quick(preset: Preset, quota: u32, budget: u32) -> BackfillConfig {
    BackfillConfig::from_preset(preset, quota)
        .with_attempt_budget(budget)
        .with_request_delay(Duration::ZERO)
}

fn wide_sampler(seed: u64) -> RangeSampler {
    RangeSampler::seeded(Preset::Verified.ranges(), seed)
}

#[tokio::test(start_paused = true)]
async fn stops_at_quota_on_seventh_attempt() {
    let fetcher = Arc::new(ScriptedFetcher::scored_on(&[2, 5, 7]));
    let config = quick(Preset::Simple, 3, 10);
    let summary = BackfillLoop::new(config, wide_sampler(1), None, fetcher.clone())
        .unwrap()
        .run()
        .await;

    assert_eq!(summary.successes, 3);
    assert_eq!(summary.attempts, 7);
    assert_eq!(summary.stop_reason, StopReason::QuotaReached);
    assert_eq!(fetcher.calls().len(), 7);
    assert_eq!(summary.tally.scored, 3);
    assert_eq!(summary.tally.unscored, 4);
    assert!(summary.quota_reached());
}

#[tokio::test(start_paused = true)]
async fn counters_respect_budget_when_quota_missed() {
    let fetcher = Arc::new(ScriptedFetcher::scored_on(&[3]));
    let config = quick(Preset::Simple, 5, 10);
    let summary = BackfillLoop::new(config, wide_sampler(2), None, fetcher.clone())
        .unwrap()
        .run()
        .await;

    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.attempts, 10);
    assert_eq!(summary.successes, 1);
    assert!(summary.successes <= summary.attempts);
    assert!(summary.attempts <= summary.attempt_budget);
    assert!(!summary.quota_reached());
    assert!((summary.success_rate() - 0.1).abs() < 1e-12);

    let mut keys = fetcher.calls();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 10, "every attempted key is distinct");
}

#[tokio::test(start_paused = true)]
async fn not_found_and_transport_failures_do_not_abort() {
    let fetcher = Arc::new(ScriptedFetcher::from_fn(|fid, _| match fid.get() {
        1 => FetchOutcome::NotFound("FID not found".to_string()),
        2 => FetchOutcome::TransientFailure(CallError::Timeout(Duration::from_secs(30))),
        3 => FetchOutcome::TransientFailure(CallError::Malformed("eof".to_string())),
        _ => FetchOutcome::Scored(ScoreRecord {
            fid: Some(fid),
            overall_score: Some(61.0),
            tier: "B".to_string(),
            username: None,
            display_name: None,
            avatar_url: None,
        }),
    }));
    let keys = FixedKeys::new((1..=4).map(Fid).collect());
    let mut backfill =
        BackfillLoop::new(quick(Preset::Simple, 1, 10), keys, None, fetcher).unwrap();

    let mut kinds = Vec::new();
    while !backfill.is_stopped() {
        if let Some(record) = backfill.step().await {
            kinds.push(record.failure_kind());
        }
    }

    assert_eq!(
        kinds,
        vec![
            Some(FailureKind::DomainNotFound),
            Some(FailureKind::TransportError),
            Some(FailureKind::MalformedResponse),
            None,
        ]
    );
    let summary = backfill.summary(0);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.attempts, 4);
    assert_eq!(summary.tally.not_found, 1);
    assert_eq!(summary.tally.transport, 1);
    assert_eq!(summary.tally.malformed, 1);
    assert_eq!(summary.stop_reason, StopReason::QuotaReached);
}

#[tokio::test(start_paused = true)]
async fn exhausted_small_range_terminates() {
    let table = RangeTable::new(vec![RangeWeight::new(1, 6, 1.0)]).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::null_score());
    let summary = BackfillLoop::new(
        quick(Preset::Simple, 100, 1000),
        RangeSampler::seeded(table, 9),
        None,
        fetcher,
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(summary.stop_reason, StopReason::CandidatesExhausted);
    assert!(summary.attempts <= 5);
    assert_eq!(summary.successes, 0);
}

#[tokio::test(start_paused = true)]
async fn verified_preset_checks_identity_before_fetching() {
    let known: Vec<Fid> = (1..=100).map(Fid).collect();
    let verifier = Arc::new(StaticVerifier::only(&known));
    let fetcher = Arc::new(ScriptedFetcher::always(70.0));
    let table = RangeTable::new(vec![RangeWeight::new(1, 200, 1.0)]).unwrap();

    let summary = BackfillLoop::new(
        quick(Preset::Verified, 5, 15),
        RangeSampler::seeded(table, 4),
        Some(verifier.clone() as Arc<dyn ExistenceVerifier>),
        fetcher.clone(),
    )
    .unwrap()
    .run()
    .await;

    assert!(fetcher.calls().iter().all(|fid| fid.get() <= 100));
    assert_eq!(
        verifier.checked().len() as u32,
        summary.attempts,
        "every attempt passes through verification"
    );
    assert_eq!(summary.tally.unverified + summary.tally.scored, summary.attempts);
    assert!(summary.attempts <= 15);
}

#[tokio::test(start_paused = true)]
async fn audit_counts_enriched_entries() {
    let entries = (1..=5)
        .map(|rank| AggregateEntry {
            rank,
            fid: Fid(u64::from(rank) * 11),
            overall_score: Some(90.0 - f64::from(rank)),
            tier: "A".to_string(),
            username: (rank == 1 || rank == 3).then(|| format!("creator{}", rank)),
            display_name: None,
            pfp_url: None,
        })
        .collect();
    let refresher = AggregateRefresher::new(Arc::new(MemoryLeaderboard::new(entries)));

    let report = refresher.audit().await.unwrap();
    assert_eq!(report.total_entries, 5);
    assert_eq!(report.enriched_entries, 2);
    assert_eq!(report.missing, vec![Fid(22), Fid(44), Fid(55)]);
}

/// Outcome of a key under the mixed script: every outcome class appears.
fn mixed_outcome(fid: Fid) -> FetchOutcome {
    match fid.get() % 5 {
        0 => FetchOutcome::Scored(ScoreRecord {
            fid: Some(fid),
            overall_score: Some(40.0 + (fid.get() % 50) as f64),
            tier: "B".to_string(),
            username: None,
            display_name: None,
            avatar_url: None,
        }),
        1 => FetchOutcome::Scored(ScoreRecord {
            fid: Some(fid),
            overall_score: None,
            tier: "D".to_string(),
            username: None,
            display_name: None,
            avatar_url: None,
        }),
        2 => FetchOutcome::NotFound("Invalid FID".to_string()),
        3 => FetchOutcome::TransientFailure(CallError::Timeout(Duration::from_secs(10))),
        _ => FetchOutcome::TransientFailure(CallError::Malformed("eof".to_string())),
    }
}

#[tokio::test(start_paused = true)]
async fn counters_stay_bounded_across_seeds() {
    const STEP_LIMIT: u32 = 1_000_000;
    let known: Vec<Fid> = (1..500).filter(|k| k % 3 != 0).map(Fid).collect();

    for seed in 0..24u64 {
        let preset = if seed % 2 == 0 {
            Preset::Verified
        } else {
            Preset::Simple
        };
        let quota = 1 + (seed % 7) as u32;
        let budget = quota * 3 + (seed % 5) as u32;
        let table = RangeTable::new(vec![RangeWeight::new(1, 500, 1.0)]).unwrap();
        let verifier = Arc::new(StaticVerifier::only(&known));
        let fetcher = Arc::new(ScriptedFetcher::from_fn(|fid, _| mixed_outcome(fid)));

        let mut backfill = BackfillLoop::new(
            quick(preset, quota, budget),
            RangeSampler::seeded(table, seed),
            Some(verifier.clone() as Arc<dyn ExistenceVerifier>),
            fetcher.clone(),
        )
        .unwrap();

        let mut steps = 0;
        while !backfill.is_stopped() {
            assert!(steps < STEP_LIMIT, "seed {} did not terminate", seed);
            backfill.step().await;
            steps += 1;
        }

        let summary = backfill.summary(0);
        let t = &summary.tally;
        assert!(summary.successes <= summary.attempts, "seed {}", seed);
        assert!(summary.attempts <= budget, "seed {}", seed);
        assert!(summary.successes <= quota, "seed {}", seed);
        assert_eq!(summary.successes, t.scored, "seed {}", seed);
        assert_eq!(t.fetched() + t.unverified, summary.attempts, "seed {}", seed);
        assert_eq!(fetcher.calls().len() as u32, t.fetched(), "seed {}", seed);
        match summary.stop_reason {
            StopReason::QuotaReached => assert_eq!(summary.successes, quota, "seed {}", seed),
            StopReason::BudgetExhausted => assert_eq!(summary.attempts, budget, "seed {}", seed),
            StopReason::CandidatesExhausted => panic!("seed {} ran out of candidates", seed),
        }
        if preset == Preset::Verified {
            assert!(fetcher.calls().iter().all(|fid| fid.get() % 3 != 0));
        } else {
            assert!(verifier.checked().is_empty());
        }
    }
}
