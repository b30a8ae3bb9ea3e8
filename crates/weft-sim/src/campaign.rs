//! Seed campaigns.
//!
//! Runs one simulation per seed with shared parameters, checks every run
//! with the oracle and reports the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use weft_core::config::WeftConfig;

use crate::network::FaultConfig;
use crate::oracle::{ConvergenceOracle, InvariantViolation, OracleResult};
use crate::rng::DeterministicRng;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Oracle shuffles use their own stream so they never perturb a run.
const ORACLE_STREAM: u64 = 0xDEAD;

/// Parameters shared by every seed of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub seed_range: Range<u64>,
    pub replica_count: usize,
    pub rounds: u64,
    pub fanout: usize,
    pub append_rate_percent: u8,
    pub pointer_count: usize,
    pub fault_drop_percent: u8,
    pub fault_duplicate_percent: u8,
    pub fault_reorder_percent: u8,
    pub fault_partition_percent: u8,
    pub fault_max_delay: u8,
    pub anti_entropy: bool,
    #[serde(default)]
    pub weft: WeftConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            replica_count: 4,
            rounds: 16,
            fanout: 2,
            append_rate_percent: 40,
            pointer_count: 4,
            fault_drop_percent: 10,
            fault_duplicate_percent: 5,
            fault_reorder_percent: 10,
            fault_partition_percent: 5,
            fault_max_delay: 3,
            anti_entropy: true,
            weft: WeftConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Defaults with the log settings and pointer count of `weft`.
    #[must_use]
    pub fn from_weft(weft: WeftConfig) -> Self {
        Self {
            pointer_count: weft.log.pointer_count,
            weft,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            replica_count: self.replica_count,
            rounds: self.rounds,
            fanout: self.fanout,
            append_rate_percent: self.append_rate_percent,
            pointer_count: self.pointer_count,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                drop_rate_percent: self.fault_drop_percent,
                duplicate_rate_percent: self.fault_duplicate_percent,
                reorder_rate_percent: self.fault_reorder_percent,
                partition_rate_percent: self.fault_partition_percent,
            },
            anti_entropy: self.anti_entropy,
            weft: self.weft.clone(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.replica_count == 0 {
            bail!("replica_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.pointer_count == 0 {
            bail!("pointer_count must be > 0");
        }
        let percents = [
            ("append_rate_percent", self.append_rate_percent),
            ("fault_drop_percent", self.fault_drop_percent),
            ("fault_duplicate_percent", self.fault_duplicate_percent),
            ("fault_reorder_percent", self.fault_reorder_percent),
            ("fault_partition_percent", self.fault_partition_percent),
        ];
        for (name, value) in percents {
            if value > 100 {
                bail!("{name} must be within 0..=100, got {value}");
            }
        }
        self.weft.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate outcome of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds in which at least one fault fired.
    pub interesting_states_reached: usize,
    /// Entries appended across all seeds.
    pub entries_appended: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Full result of replaying one seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run every seed in the campaign.
///
/// # Errors
///
/// Returns an error if the config is invalid or a run hits an internal
/// error. Invariant violations are reported, not returned as errors.
pub async fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        entries_appended: 0,
    };

    for seed in config.seed_range.clone() {
        let trace = check_seed(seed, config).await?;
        report.seeds_run += 1;
        report.entries_appended += trace.result.appended().len();
        if trace.result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if trace.oracle.passed {
            report.seeds_passed += 1;
        } else {
            tracing::warn!(seed, violations = trace.oracle.violations.len(), "seed failed");
            if report.first_failure.is_none() {
                report.first_failure = Some(seed);
            }
            report.failures.push(SeedFailure {
                seed,
                violations: trace
                    .oracle
                    .violations
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }
    }

    tracing::info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        "campaign complete"
    );
    Ok(report)
}

/// Run one seed: `Ok(Ok(()))` on pass, `Ok(Err(violations))` on failure.
///
/// # Errors
///
/// Returns an error only when the simulation itself fails.
pub async fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = check_seed(seed, config).await?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay one seed with its full trace.
///
/// # Errors
///
/// Returns an error when validation or the simulation fails.
pub async fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    check_seed(seed, config).await
}

async fn check_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run().await?;

    let mut oracle_rng = DeterministicRng::fork(seed, ORACLE_STREAM);
    let oracle = ConvergenceOracle::check_all(&result.states, &result.logs, &mut oracle_rng).await?;
    Ok(DetailedTrace { result, oracle })
}
