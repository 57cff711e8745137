//! Campaign runner for deterministic ordering campaigns.
//!
//! Executes many seeds with the same workload shape, collecting pass/fail
//! results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::oracle::{InvariantViolation, OracleResult, OrderingOracle};
use crate::simulator::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the workload each
/// seed gets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub scopes: usize,
    pub items_per_scope: usize,
    pub max_depth: usize,
    pub moves: usize,
    pub multi_drag_percent: u8,
    pub stale_percent: u8,
    pub nest_percent: u8,
    pub hotspot_percent: u8,
    pub create_percent: u8,
    pub delete_percent: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            scopes: sim.scopes,
            items_per_scope: sim.items_per_scope,
            max_depth: sim.max_depth,
            moves: sim.moves,
            multi_drag_percent: sim.multi_drag_percent,
            stale_percent: sim.stale_percent,
            nest_percent: sim.nest_percent,
            hotspot_percent: sim.hotspot_percent,
            create_percent: sim.create_percent,
            delete_percent: sim.delete_percent,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            scopes: self.scopes,
            items_per_scope: self.items_per_scope,
            max_depth: self.max_depth,
            moves: self.moves,
            multi_drag_percent: self.multi_drag_percent,
            stale_percent: self.stale_percent,
            nest_percent: self.nest_percent,
            hotspot_percent: self.hotspot_percent,
            create_percent: self.create_percent,
            delete_percent: self.delete_percent,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed range is empty or the per-seed workload
    /// is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit a rebalance, a mismatch, or a server rejection.
    pub interesting_states_reached: usize,
    /// Stale plans the server overruled, summed over all seeds.
    pub mismatches_observed: usize,
    /// Rebalances, summed over all seeds.
    pub rebalances_observed: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed trace produced by replaying a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

fn execute_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = OrderingOracle::check_all(&result);
    Ok(DetailedTrace { result, oracle })
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        mismatches_observed: 0,
        rebalances_observed: 0,
    };

    for seed in config.seed_range.clone() {
        let DetailedTrace { result, oracle } = execute_seed(seed, config)?;
        report.seeds_run += 1;
        report.mismatches_observed += result.stats.mismatches;
        report.rebalances_observed += result.stats.rebalances;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if oracle.passed {
            report.seeds_passed += 1;
        } else {
            tracing::warn!(seed, violations = oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    tracing::info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        mismatches = report.mismatches_observed,
        "campaign finished"
    );
    Ok(report)
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, store refusal). The inner `Result` distinguishes
/// pass from invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = execute_seed(seed, config)?;
    if trace.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(trace.oracle.violations))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    execute_seed(seed, config)
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::BrokenCycle { item } => {
            format!("BrokenCycle: parent links loop through '{item}'")
        }
        InvariantViolation::HiddenItems {
            expected,
            flattened,
        } => format!("HiddenItems: {flattened} of {expected} items reachable from the roots"),
        InvariantViolation::DuplicatePosition {
            scope,
            parent,
            position,
        } => format!(
            "DuplicatePosition: two siblings at {position} under {} in {scope}",
            parent.as_ref().map_or_else(|| "the root".to_string(), |p| format!("'{p}'"))
        ),
        InvariantViolation::NoRoomBetween {
            scope,
            parent,
            prev,
            next,
        } => format!(
            "NoRoomBetween: no midpoint between {prev} and {next} under {} in {scope}",
            parent.as_ref().map_or_else(|| "the root".to_string(), |p| format!("'{p}'"))
        ),
        InvariantViolation::FreshMismatch { step } => {
            format!("FreshMismatch: step {step} planned on a fresh snapshot but diverged")
        }
        InvariantViolation::RejectionParity { step } => {
            format!("RejectionParity: step {step} refused a cycle the server accepts")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_zero_moves_rejected() {
        let config = CampaignConfig {
            moves: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.moves, config.moves);
        assert_eq!(sim.items_per_scope, config.items_per_scope);
    }

    #[test]
    fn run_single_seed_passes() {
        let result = run_single_seed(0, &CampaignConfig::default()).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn run_campaign_all_seeds_pass() {
        let config = CampaignConfig {
            seed_range: 0..20,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert_eq!(report.seeds_run, 20);
        assert_eq!(report.seeds_passed, 20);
        assert!(report.all_passed());
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn hot_spot_workload_keeps_invariants() {
        let config = CampaignConfig {
            seed_range: 0..5,
            items_per_scope: 4,
            moves: 200,
            hotspot_percent: 100,
            nest_percent: 0,
            stale_percent: 0,
            create_percent: 0,
            delete_percent: 0,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(report.all_passed(), "{:?}", report.failures);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let a = replay_seed(7, &config).expect("replay");
        let b = replay_seed(7, &config).expect("replay");
        assert_eq!(a, b);
    }

    #[test]
    fn format_violation_names_the_invariant() {
        let text = format_violation(&InvariantViolation::DuplicatePosition {
            scope: "s".into(),
            parent: None,
            position: 2.0,
        });
        assert!(text.starts_with("DuplicatePosition"));
        assert!(text.contains("the root"));
    }
}
