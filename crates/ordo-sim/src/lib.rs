//! Deterministic simulation harness for the ordo ordering engine.
//!
//! A [`Simulator`] drives optimistic clients and an authoritative
//! [`MemoryStore`](ordo_core::MemoryStore) through a seeded workload of
//! drags, creations, and deletions. The [`OrderingOracle`] then checks the
//! final forest and the step trace.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Determinism**: All randomness flows from [`DeterministicRng`] streams
//!   forked off the seed; the same seed always yields the same trace.

pub mod campaign;
pub mod oracle;
pub mod rng;
pub mod simulator;

pub use campaign::{
    CampaignConfig, CampaignReport, DetailedTrace, SeedFailure, format_violation, replay_seed,
    run_campaign, run_single_seed,
};
pub use oracle::{InvariantViolation, OracleResult, OrderingOracle};
pub use rng::DeterministicRng;
pub use simulator::{
    Action, MoveOutcome, SimStats, SimulationConfig, SimulationResult, Simulator, StepRecord,
};
