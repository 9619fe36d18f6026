//! Scorefill - creator score leaderboard backfill CLI
//!
//! The `scorefill` command populates the creator score store and keeps the
//! leaderboard in step with it.
//!
//! ## Commands
//!
//! - `backfill`: sample random FIDs until a success quota is met
//! - `sweep`: push a fixed list of FIDs through the scoring service
//! - `refresh`: trigger a leaderboard rebuild and audit the result
//! - `audit`: report profile coverage of the current leaderboard
//! - `probe`: check identity service connectivity

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use scorefill_core::{
    AggregateRefresher, BackfillConfig, BackfillLoop, CoverageReport, ExistenceVerifier, Fid,
    FixedKeys, KeySelection, Preset, Profile, RangeSampler, RangeTable, RunSummary, Timeouts,
    DEFAULT_QUOTA,
};
use scorefill_http::{IdentityClient, ScoreApiClient, ScoreApiConfig};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "scorefill")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Backfill the creator score leaderboard", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample random FIDs from weighted ranges until the quota is met
    Backfill(BackfillArgs),

    /// Score a fixed set of FIDs
    Sweep(SweepArgs),

    /// Trigger a leaderboard rebuild, wait for it to settle, then audit
    Refresh {
        /// Seconds to wait between the trigger and the audit
        #[arg(long, default_value = "10")]
        settle_secs: u64,

        /// Skip the audit
        #[arg(long)]
        no_audit: bool,
    },

    /// Report how many leaderboard entries carry profile data
    Audit {
        /// Number of top entries to print
        #[arg(short, long, default_value = "10")]
        sample: usize,

        /// List FIDs whose entry lacks profile data
        #[arg(long)]
        show_missing: bool,
    },

    /// Check identity service connectivity for a few known FIDs
    Probe {
        /// FIDs to look up
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = [1, 2, 3, 10, 12, 15, 20, 22, 100, 200, 500, 1000]
        )]
        fids: Vec<u64>,
    },
}

#[derive(Args)]
struct BackfillArgs {
    /// Sampling preset: verified, simple or targeted
    #[arg(short, long, env = "SCOREFILL_PRESET")]
    preset: Option<Preset>,

    /// Number of scored FIDs to collect
    #[arg(short, long, env = "SCOREFILL_QUOTA")]
    quota: Option<u32>,

    /// Hard ceiling on attempts (default: quota times the preset multiplier)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Check each FID against the identity service first
    #[arg(long, conflicts_with = "no_verify")]
    verify: bool,

    /// Skip the identity pre-check
    #[arg(long)]
    no_verify: bool,

    /// Force score recomputation on every fetch
    #[arg(long)]
    bust_cache: bool,

    /// Delay after each scored attempt, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Log a progress line every N attempts
    #[arg(long)]
    progress_every: Option<u32>,

    /// Weighted ranges, e.g. "1-1000:0.6,1000-5000:0.4"
    #[arg(long)]
    ranges: Option<String>,

    /// TOML profile with defaults for the fields above
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Seed the sampler for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    finish: FinishArgs,
}

#[derive(Args)]
struct SweepArgs {
    /// Explicit FIDs, comma separated
    #[arg(long, value_delimiter = ',')]
    fids: Vec<u64>,

    /// Inclusive FID range, e.g. 1..=100
    #[arg(long, value_parser = parse_key_range)]
    range: Option<RangeInclusive<u64>>,

    /// Take FIDs from the current leaderboard: all, missing or top:N
    #[arg(long)]
    from_leaderboard: Option<KeySelection>,

    /// Bypass the score cache; success then requires profile data
    #[arg(long)]
    force: bool,

    /// Delay after each attempt, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    #[command(flatten)]
    finish: FinishArgs,
}

#[derive(Args)]
struct FinishArgs {
    /// Do not rebuild the leaderboard after the run
    #[arg(long)]
    no_refresh: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    summary_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    scorefill_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Backfill(args) => cmd_backfill(args).await,
        Commands::Sweep(args) => cmd_sweep(args).await,
        Commands::Refresh {
            settle_secs,
            no_audit,
        } => cmd_refresh(Duration::from_secs(settle_secs), no_audit).await,
        Commands::Audit {
            sample,
            show_missing,
        } => cmd_audit(sample, show_missing).await,
        Commands::Probe { fids } => cmd_probe(&fids).await,
    }
}

/// Inclusive range written as `a..=b`.
fn parse_key_range(s: &str) -> std::result::Result<RangeInclusive<u64>, String> {
    let (lo, hi) = s
        .split_once("..=")
        .ok_or_else(|| format!("expected a..=b, got '{}'", s))?;
    let lo: u64 = lo.trim().parse().map_err(|_| format!("bad range start '{}'", lo))?;
    let hi: u64 = hi.trim().parse().map_err(|_| format!("bad range end '{}'", hi))?;
    if lo == 0 || lo > hi {
        return Err(format!("range {}..={} is empty or starts at 0", lo, hi));
    }
    Ok(lo..=hi)
}

impl BackfillArgs {
    /// Flags expressed as a profile so they can be overlaid on the file.
    fn as_profile(&self) -> Result<Profile> {
        let verify = match (self.verify, self.no_verify) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let ranges = self
            .ranges
            .as_deref()
            .map(RangeTable::parse)
            .transpose()
            .context("Invalid --ranges")?;
        Ok(Profile {
            preset: self.preset,
            quota: self.quota,
            attempt_budget: self.max_attempts,
            verify,
            bust_cache: self.bust_cache.then_some(true),
            criterion: None,
            request_delay_ms: self.delay_ms,
            progress_every: self.progress_every,
            ranges,
        })
    }
}

fn score_api(timeouts: Timeouts) -> Result<Arc<ScoreApiClient>> {
    let api_config = ScoreApiConfig::from_env().with_timeouts(timeouts);
    let client = ScoreApiClient::new(api_config).context("Failed to create score API client")?;
    Ok(Arc::new(client))
}

async fn cmd_backfill(args: BackfillArgs) -> Result<()> {
    let file_profile = match &args.profile {
        Some(path) => Profile::load(path)
            .with_context(|| format!("Failed to load profile {:?}", path))?,
        None => Profile::default(),
    };
    let profile = args.as_profile()?.or(file_profile);
    let preset = profile.preset.unwrap_or_default();
    let config = profile.to_config(preset, DEFAULT_QUOTA);
    let table = profile.range_table(preset);

    let verifier: Option<Arc<dyn ExistenceVerifier>> = if config.verify {
        let client = IdentityClient::from_env().context("Identity verification is enabled")?;
        Some(Arc::new(client))
    } else {
        None
    };
    let api = score_api(config.timeouts)?;

    info!(
        preset = preset.name(),
        quota = config.quota,
        attempt_budget = config.attempt_budget,
        verify = config.verify,
        "starting backfill"
    );
    for line in table.describe() {
        info!("  {}", line);
    }

    let sampler = match args.seed {
        Some(seed) => RangeSampler::seeded(table, seed),
        None => RangeSampler::from_entropy(table),
    };
    let summary = BackfillLoop::new(config, sampler, verifier, api.clone())
        .context("Invalid backfill configuration")?
        .run()
        .await;

    finish_run(&summary, &args.finish, api).await
}

async fn cmd_sweep(args: SweepArgs) -> Result<()> {
    let api = score_api(Timeouts::default())?;

    let mut keys: Vec<Fid> = args.fids.iter().copied().map(Fid).collect();
    if let Some(range) = args.range.clone() {
        keys.extend(range.map(Fid));
    }
    if let Some(selection) = args.from_leaderboard {
        let selected = AggregateRefresher::new(api.clone())
            .select_keys(selection)
            .await
            .context("Failed to read leaderboard")?;
        info!(selected = selected.len(), "keys taken from leaderboard");
        keys.extend(selected);
    }

    let source = FixedKeys::merged(keys);
    if source.total() == 0 {
        bail!("Nothing to sweep: pass --fids, --range or --from-leaderboard");
    }

    let mut config = BackfillConfig::sweep(source.total(), args.force);
    if let Some(ms) = args.delay_ms {
        config = config.with_request_delay(Duration::from_millis(ms));
    }
    info!(keys = source.total(), force = args.force, "starting sweep");

    let summary = BackfillLoop::new(config, source, None, api.clone())
        .context("Invalid sweep configuration")?
        .run()
        .await;

    finish_run(&summary, &args.finish, api).await
}

async fn finish_run(
    summary: &RunSummary,
    finish: &FinishArgs,
    api: Arc<ScoreApiClient>,
) -> Result<()> {
    if finish.summary_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print_summary(summary);
    }

    if finish.no_refresh {
        return Ok(());
    }
    let refresher = AggregateRefresher::new(api);
    let (accepted, report) = refresher.refresh_and_audit().await;
    println!(
        "\nLeaderboard rebuild {}",
        if accepted { "triggered" } else { "failed" }
    );
    match report {
        Ok(report) => print_coverage(&report, false),
        Err(e) => println!("Leaderboard audit failed: {}", e),
    }
    Ok(())
}

async fn cmd_refresh(settle: Duration, no_audit: bool) -> Result<()> {
    let api = score_api(Timeouts::default())?;
    let refresher = AggregateRefresher::new(api).with_settle_delay(settle);

    if no_audit {
        let accepted = refresher.refresh().await;
        println!("Leaderboard rebuild {}", if accepted { "triggered" } else { "failed" });
        return Ok(());
    }

    let (accepted, report) = refresher.refresh_and_audit().await;
    println!("Leaderboard rebuild {}", if accepted { "triggered" } else { "failed" });
    let report = report.context("Failed to audit leaderboard")?;
    print_coverage(&report, false);
    Ok(())
}

async fn cmd_audit(sample: usize, show_missing: bool) -> Result<()> {
    let api = score_api(Timeouts::default())?;
    let report = AggregateRefresher::new(api)
        .with_sample(sample)
        .audit()
        .await
        .context("Failed to audit leaderboard")?;
    print_coverage(&report, show_missing);
    Ok(())
}

async fn cmd_probe(fids: &[u64]) -> Result<()> {
    let client = IdentityClient::from_env().context("Cannot probe the identity service")?;
    println!("Probing identity service with {} FIDs", fids.len());

    for &fid in fids {
        let fid = Fid(fid);
        match client.lookup(fid).await {
            Ok(lookup) => {
                let verdict = match &lookup.user {
                    Some(user) if lookup.confirms(fid) => {
                        format!("found @{}", user.username.as_deref().unwrap_or("N/A"))
                    }
                    _ if lookup.status == 200 => "no matching user".to_string(),
                    _ => format!("HTTP {}", lookup.status),
                };
                println!("FID {:>5}: status {} - {}", fid, lookup.status, verdict);
                if let Some(hint) = lookup.hint() {
                    println!("           {}", hint);
                }
            }
            Err(e) => println!("FID {:>5}: request failed - {}", fid, e),
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let t = &summary.tally;
    println!("\nRun {}", summary.run_id);
    println!("Stopped:      {}", summary.stop_reason.as_str());
    println!("Successes:    {}/{}", summary.successes, summary.quota);
    println!("Attempts:     {}/{}", summary.attempts, summary.attempt_budget);
    println!("Success rate: {:.1}%", summary.success_rate() * 100.0);
    println!("Duration:     {:.1}s", summary.duration_ms as f64 / 1000.0);
    println!(
        "Outcomes:     scored {}, no score {}, not found {}, unverified {}, transport {}, \
         malformed {}",
        t.scored, t.unscored, t.not_found, t.unverified, t.transport, t.malformed
    );
    if t.enriched > 0 {
        println!("With profile: {}", t.enriched);
    }
    if !summary.quota_reached() {
        println!(
            "Quota not reached: {} short",
            summary.quota.saturating_sub(summary.successes)
        );
    }
    if !summary.top.is_empty() {
        println!("\nTop scores this run:");
        for (i, record) in summary.top.iter().enumerate() {
            let fid = record.fid.map(|f| f.to_string()).unwrap_or_else(|| "?".to_string());
            println!("  {:>2}. FID {:>6}: {}", i + 1, fid, record.label());
        }
    }
}

fn print_coverage(report: &CoverageReport, show_missing: bool) {
    println!(
        "\nLeaderboard: {} entries, {} with profile data ({:.1}%)",
        report.total_entries,
        report.enriched_entries,
        report.coverage_ratio() * 100.0
    );
    for entry in &report.top {
        let name = entry
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| format!("@{}", u))
            .unwrap_or_else(|| "N/A".to_string());
        let score = entry
            .overall_score
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "  #{:<3} FID {:>6} {:<24} {} ({})",
            entry.rank,
            entry.fid,
            name,
            score,
            entry.tier_label()
        );
    }
    if show_missing && !report.missing.is_empty() {
        let missing: Vec<String> = report.missing.iter().map(Fid::to_string).collect();
        println!("\nMissing profile data: {}", missing.join(","));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_range() {
        assert_eq!(parse_key_range("1..=100").unwrap(), 1..=100);
        assert_eq!(parse_key_range(" 5 ..= 5").unwrap(), 5..=5);
        assert!(parse_key_range("1-100").is_err());
        assert!(parse_key_range("0..=10").is_err());
        assert!(parse_key_range("10..=1").is_err());
    }

    #[test]
    fn test_backfill_flags_override_preset() {
        let cli = Cli::try_parse_from([
            "scorefill",
            "backfill",
            "--preset",
            "targeted",
            "--quota",
            "20",
            "--no-verify",
            "--ranges",
            "1-100:1.0",
        ])
        .unwrap();
        let Commands::Backfill(args) = cli.command else {
            panic!("expected backfill");
        };
        let profile = args.as_profile().unwrap();
        assert_eq!(profile.preset, Some(Preset::Targeted));
        assert_eq!(profile.verify, Some(false));

        let config = profile.to_config(Preset::Verified, DEFAULT_QUOTA);
        assert_eq!(config.quota, 20);
        assert_eq!(config.attempt_budget, 60);
        assert_eq!(profile.range_table(Preset::Verified).ranges().len(), 1);
    }

    #[test]
    fn test_verify_flags_conflict() {
        let res = Cli::try_parse_from(["scorefill", "backfill", "--verify", "--no-verify"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_sweep_sources_parse() {
        let cli = Cli::try_parse_from([
            "scorefill",
            "sweep",
            "--fids",
            "3,1,2",
            "--range",
            "1..=4",
            "--from-leaderboard",
            "top:25",
            "--force",
        ])
        .unwrap();
        let Commands::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        assert_eq!(args.fids, vec![3, 1, 2]);
        assert_eq!(args.range, Some(1..=4));
        assert_eq!(args.from_leaderboard, Some(KeySelection::Top(25)));
        assert!(args.force);
    }
}
