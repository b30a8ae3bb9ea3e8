#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use weft_core::LogError;
use weft_core::config::load_config;
use weft_sim::campaign::{CampaignConfig, replay_seed, run_campaign};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(
    name = "weft-sim",
    version,
    about = "Run deterministic replication campaigns against weft logs",
    after_help = "EXAMPLES:\n    # 200 seeds with heavy packet loss\n    weft-sim --seeds 200 --drop 30\n\n    # Replay one failing seed with its full trace\n    weft-sim --replay 17"
)]
struct Cli {
    /// First seed of the campaign.
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    #[arg(long, default_value_t = 4)]
    replicas: usize,

    #[arg(long, default_value_t = 16)]
    rounds: u64,

    #[arg(long, default_value_t = 2)]
    fanout: usize,

    /// Percent chance per round that a replica appends.
    #[arg(long, default_value_t = 40)]
    append_rate: u8,

    /// Skip-link reach of each append. Defaults to `log.pointer_count`
    /// from the config file.
    #[arg(long)]
    pointer_count: Option<usize>,

    /// Log settings (`weft.toml`) applied to every replica.
    #[arg(long, default_value = "weft.toml")]
    config: PathBuf,

    /// Percent of manifest sends dropped.
    #[arg(long, default_value_t = 10)]
    drop: u8,

    #[arg(long, default_value_t = 5)]
    duplicate: u8,

    #[arg(long, default_value_t = 10)]
    reorder: u8,

    #[arg(long, default_value_t = 5)]
    partition: u8,

    #[arg(long, default_value_t = 3)]
    max_delay: u8,

    /// Skip the final pairwise exchange.
    #[arg(long)]
    no_anti_entropy: bool,

    /// Replay a single seed and print its trace instead of a report.
    #[arg(long)]
    replay: Option<u64>,
}

impl Cli {
    fn campaign(&self) -> Result<CampaignConfig> {
        let weft = load_config(&self.config)?;
        let defaults = CampaignConfig::from_weft(weft);
        Ok(CampaignConfig {
            seed_range: self.start..self.start.saturating_add(self.seeds),
            replica_count: self.replicas,
            rounds: self.rounds,
            fanout: self.fanout,
            append_rate_percent: self.append_rate,
            pointer_count: self.pointer_count.unwrap_or(defaults.pointer_count),
            fault_drop_percent: self.drop,
            fault_duplicate_percent: self.duplicate,
            fault_reorder_percent: self.reorder,
            fault_partition_percent: self.partition,
            fault_max_delay: self.max_delay,
            anti_entropy: !self.no_anti_entropy,
            ..defaults
        })
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Print the code and hint of a log error before exiting.
fn print_hint(err: &anyhow::Error) {
    if let Some(log_err) = err.chain().find_map(|e| e.downcast_ref::<LogError>()) {
        let code = log_err.code();
        eprintln!("{code}: {}", code.message());
        if let Some(hint) = log_err.hint() {
            eprintln!("hint: {hint}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(&cli).await.inspect_err(print_hint)
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.campaign()?;

    if let Some(seed) = cli.replay {
        let replay = replay_seed(seed, &config).await?;
        let output = serde_json::json!({
            "seed": seed,
            "passed": replay.oracle.passed,
            "violations": replay
                .oracle
                .violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "states": replay.result.states,
            "trace": replay.result.trace,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        if !replay.oracle.passed {
            bail!("seed {seed} violated invariants");
        }
        return Ok(());
    }

    let report = run_campaign(&config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(seed) = report.first_failure {
        bail!(
            "{} of {} seeds failed; replay with --replay {seed}",
            report.failures.len(),
            report.seeds_run
        );
    }
    Ok(())
}
