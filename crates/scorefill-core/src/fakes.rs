//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedFetcher`, `StaticVerifier`, and `MemoryLeaderboard`
//! that satisfy the trait contracts without any network access.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::collaborators::{AggregateService, ExistenceVerifier, ScoreFetcher};
use crate::domain::{AggregateEntry, Fid, ScoreRecord};
use crate::error::CallError;
use crate::outcome::FetchOutcome;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type Script = Box<dyn Fn(Fid, bool) -> FetchOutcome + Send + Sync>;

// ---------------------------------------------------------------------------
// ScriptedFetcher
// ---------------------------------------------------------------------------

/// Score fetcher whose answers come from a closure. Records every call.
pub struct ScriptedFetcher {
    script: Script,
    calls: Mutex<Vec<(Fid, bool)>>,
}

impl ScriptedFetcher {
    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(Fid, bool) -> FetchOutcome + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every key answers with a scored record of `score`.
    pub fn always(score: f64) -> Self {
        Self::from_fn(move |fid, _| FetchOutcome::Scored(scored(fid, Some(score))))
    }

    /// Every key answers with an inactive record (no score, tier D).
    pub fn null_score() -> Self {
        Self::from_fn(|fid, _| FetchOutcome::Scored(scored(fid, None)))
    }

    /// The n-th call (1-based) answers with a score when `n` is listed,
    /// otherwise with a null score.
    pub fn scored_on(calls: &[usize]) -> Self {
        let hits: HashSet<usize> = calls.iter().copied().collect();
        let counter = AtomicUsize::new(0);
        Self::from_fn(move |fid, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let score = hits.contains(&n).then_some(50.0);
            FetchOutcome::Scored(scored(fid, score))
        })
    }

    /// Keys called so far, in call order.
    pub fn calls(&self) -> Vec<Fid> {
        lock(&self.calls).iter().map(|(fid, _)| *fid).collect()
    }

    /// Cache-bust flag of every call so far.
    pub fn bust_flags(&self) -> Vec<bool> {
        lock(&self.calls).iter().map(|(_, bust)| *bust).collect()
    }
}

#[async_trait]
impl ScoreFetcher for ScriptedFetcher {
    async fn fetch(&self, fid: Fid, bust_cache: bool) -> FetchOutcome {
        lock(&self.calls).push((fid, bust_cache));
        (self.script)(fid, bust_cache)
    }
}

fn scored(fid: Fid, score: Option<f64>) -> ScoreRecord {
    ScoreRecord {
        fid: Some(fid),
        overall_score: score,
        tier: if score.is_some() { "C" } else { "D" }.to_string(),
        username: None,
        display_name: None,
        avatar_url: None,
    }
}

// ---------------------------------------------------------------------------
// StaticVerifier
// ---------------------------------------------------------------------------

/// Existence verifier backed by a fixed set of known keys.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    known: HashSet<Fid>,
    checked: Mutex<Vec<Fid>>,
}

impl StaticVerifier {
    pub fn only(known: &[Fid]) -> Self {
        Self {
            known: known.iter().copied().collect(),
            checked: Mutex::new(Vec::new()),
        }
    }

    pub fn checked(&self) -> Vec<Fid> {
        lock(&self.checked).clone()
    }
}

#[async_trait]
impl ExistenceVerifier for StaticVerifier {
    async fn exists(&self, fid: Fid) -> bool {
        lock(&self.checked).push(fid);
        self.known.contains(&fid)
    }
}

// ---------------------------------------------------------------------------
// MemoryLeaderboard
// ---------------------------------------------------------------------------

/// Leaderboard held in memory. Rebuild triggers are counted, not executed.
#[derive(Debug, Default)]
pub struct MemoryLeaderboard {
    entries: Mutex<Vec<AggregateEntry>>,
    rebuilds: AtomicUsize,
    fail_rebuilds: AtomicBool,
}

impl MemoryLeaderboard {
    pub fn new(entries: Vec<AggregateEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Make subsequent rebuild triggers fail at the transport level.
    pub fn fail_rebuilds(&self, fail: bool) {
        self.fail_rebuilds.store(fail, Ordering::SeqCst);
    }

    /// Accepted rebuild triggers so far.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AggregateService for MemoryLeaderboard {
    async fn trigger_rebuild(&self) -> Result<(), CallError> {
        if self.fail_rebuilds.load(Ordering::SeqCst) {
            return Err(CallError::Transport("connection refused".to_string()));
        }
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn leaderboard(&self) -> Result<Vec<AggregateEntry>, CallError> {
        Ok(lock(&self.entries).clone())
    }
}
