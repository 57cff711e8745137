#![forbid(unsafe_code)]

use std::env;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ordo_sim::{Action, CampaignConfig, MoveOutcome, format_violation, replay_seed, run_campaign};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ordo-sim: deterministic drag-and-drop campaigns",
    long_about = None
)]
struct Cli {
    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a campaign across multiple seeds.
    #[command(
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    ordo-sim run --seeds 100\n\n\
                      # Stale-heavy workload\n    ordo-sim run --seeds 200 --stale 60 --moves 128\n\n\
                      # Machine-readable output\n    ordo-sim run --seeds 100 --format json"
    )]
    Run(RunArgs),

    /// Replay a single seed with its step trace.
    #[command(
        after_help = "EXAMPLES:\n    # Replay seed 42\n    ordo-sim replay --seed 42\n\n\
                      # Same workload flags as the failing campaign\n    ordo-sim replay --seed 42 --stale 60 --moves 128"
    )]
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct WorkloadArgs {
    /// Independent collections per seed.
    #[arg(long, default_value = "2")]
    scopes: usize,

    /// Items seeded into each collection.
    #[arg(long, default_value = "24")]
    items: usize,

    /// Maximum nesting levels of the seeded forest.
    #[arg(long, default_value = "4")]
    depth: usize,

    /// Steps per seed.
    #[arg(long, default_value = "64")]
    moves: usize,

    /// Percent of moves that drag several items.
    #[arg(long, default_value = "20")]
    multi_drag: u8,

    /// Percent of steps after which the client skips its re-sync.
    #[arg(long, default_value = "15")]
    stale: u8,

    /// Percent of drops aimed at the nest band.
    #[arg(long, default_value = "30")]
    nest: u8,

    /// Percent of drops that reuse the previous target.
    #[arg(long, default_value = "10")]
    hotspot: u8,

    /// Percent of steps that create an item.
    #[arg(long, default_value = "10")]
    create: u8,

    /// Percent of steps that delete a subtree.
    #[arg(long, default_value = "5")]
    delete: u8,
}

impl WorkloadArgs {
    const fn campaign(&self, seed_start: u64, seeds: u64) -> CampaignConfig {
        CampaignConfig {
            seed_range: seed_start..seed_start.saturating_add(seeds),
            scopes: self.scopes,
            items_per_scope: self.items,
            max_depth: self.depth,
            moves: self.moves,
            multi_drag_percent: self.multi_drag,
            stale_percent: self.stale,
            nest_percent: self.nest,
            hotspot_percent: self.hotspot,
            create_percent: self.create,
            delete_percent: self.delete,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    seed_start: u64,

    #[command(flatten)]
    workload: WorkloadArgs,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    seed: u64,

    #[command(flatten)]
    workload: WorkloadArgs,
}

/// JSON output for `ordo-sim replay`.
#[derive(Debug, Serialize)]
struct ReplayOutput<'a> {
    seed: u64,
    steps: usize,
    items: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    stats: &'a ordo_sim::SimStats,
    trace: &'a [ordo_sim::StepRecord],
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ORDO_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ordo=debug,info"
        } else {
            "ordo=info,warn"
        })
    });

    let format = env::var("ORDO_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(args: &RunArgs, format: Format) -> Result<bool> {
    let config = args.workload.campaign(args.seed_start, args.seeds);
    let report = run_campaign(&config)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            println!(
                "campaign seeds_run={} moves={} stale_pct={} multi_drag_pct={}",
                report.seeds_run, config.moves, config.stale_percent, config.multi_drag_percent
            );
            println!(
                "results passed={} failed={} interesting_states={} mismatches={} rebalances={}",
                report.seeds_passed,
                report.failures.len(),
                report.interesting_states_reached,
                report.mismatches_observed,
                report.rebalances_observed
            );
            for failure in report.failures.iter().take(5) {
                println!("failure seed={}", failure.seed);
                for violation in &failure.violations {
                    println!("  - {violation}");
                }
            }
            if report.failures.len() > 5 {
                println!("failures_truncated count={}", report.failures.len() - 5);
            }
            if let Some(seed) = report.first_failure {
                println!("hint ordo-sim replay --seed {seed}");
            }
        }
    }

    info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        "ordo-sim run complete"
    );
    Ok(report.all_passed())
}

fn replay(args: &ReplayArgs, format: Format) -> Result<bool> {
    let config = args.workload.campaign(args.seed, 1);
    let trace = replay_seed(args.seed, &config)?;
    let violations: Vec<String> = trace.oracle.violations.iter().map(format_violation).collect();

    match format {
        Format::Json => {
            let out = ReplayOutput {
                seed: args.seed,
                steps: trace.result.trace.len(),
                items: trace.result.items.len(),
                oracle_passed: trace.oracle.passed,
                violations,
                interesting_state_reached: trace.result.interesting_state_reached,
                stats: &trace.result.stats,
                trace: &trace.result.trace,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => {
            let stats = &trace.result.stats;
            println!(
                "replay seed={} steps={} items={} oracle_passed={}",
                args.seed,
                trace.result.trace.len(),
                trace.result.items.len(),
                trace.oracle.passed
            );
            println!(
                "stats applied={} client_rejections={} server_rejections={} mismatches={} rebalances={} creates={} deletes={}",
                stats.moves_applied,
                stats.client_rejections,
                stats.server_rejections,
                stats.mismatches,
                stats.rebalances,
                stats.creates,
                stats.deletes
            );
            for record in &trace.result.trace {
                println!(
                    "step={} scope={} fresh={} {}",
                    record.step,
                    record.scope,
                    record.fresh,
                    describe(&record.action)
                );
            }
            for violation in &violations {
                println!("violation={violation}");
            }
        }
    }

    Ok(trace.oracle.passed)
}

fn describe(action: &Action) -> String {
    match action {
        Action::Move {
            dragged,
            target,
            ratio,
            outcome,
        } => {
            let ids: Vec<&str> = dragged.iter().map(ordo_core::ItemId::as_str).collect();
            let result = match outcome {
                MoveOutcome::Applied {
                    rebalanced,
                    matched,
                    updates,
                } => format!("applied updates={updates} matched={matched} rebalanced={rebalanced}"),
                MoveOutcome::ClientRejected {
                    code,
                    server_rejects,
                } => format!("client_rejected code={code} server_rejects={server_rejects:?}"),
                MoveOutcome::ServerRejected { code } => format!("server_rejected code={code}"),
            };
            format!(
                "move dragged=[{}] target={target} ratio={ratio:.3} {result}",
                ids.join(",")
            )
        }
        Action::Create {
            id,
            parent,
            accepted,
        } => format!(
            "create id={id} parent={} accepted={accepted}",
            parent.as_ref().map_or("-", ordo_core::ItemId::as_str)
        ),
        Action::Delete { id, removed } => format!("delete id={id} removed={removed}"),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let passed = match &cli.command {
        Command::Run(args) => run(args, cli.format)?,
        Command::Replay(args) => replay(args, cli.format)?,
    };

    // Exit code 1 on any failure for CI integration
    if !passed {
        process::exit(1);
    }
    Ok(())
}
