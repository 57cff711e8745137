use ordo_sim::{
    Action, CampaignConfig, MoveOutcome, OrderingOracle, SimulationConfig, Simulator, replay_seed,
    run_campaign,
};
use proptest::prelude::*;

#[test]
fn stale_heavy_campaign_overrules_without_violations() {
    let config = CampaignConfig {
        seed_range: 0..30,
        stale_percent: 70,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign");
    assert!(report.all_passed(), "{:?}", report.failures);
    assert!(report.mismatches_observed > 0);
    assert!(report.interesting_states_reached > 0);
}

#[test]
fn campaign_report_serializes() {
    let config = CampaignConfig {
        seed_range: 3..5,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign");
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["seeds_run"], 2);
    assert!(json["failures"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn replay_trace_serializes_with_tags() {
    let trace = replay_seed(11, &CampaignConfig::default()).expect("replay");
    let json = serde_json::to_value(&trace.result.trace).expect("json");
    let kinds: Vec<&str> = json
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|record| record["action"]["kind"].as_str())
        .collect();
    assert_eq!(kinds.len(), trace.result.trace.len());
    assert!(kinds.iter().all(|k| ["move", "create", "delete"].contains(k)));
}

#[test]
fn fresh_cycle_rejections_are_confirmed_by_server() {
    let config = SimulationConfig {
        seed: 5,
        moves: 300,
        nest_percent: 80,
        stale_percent: 0,
        ..SimulationConfig::default()
    };
    let result = Simulator::new(config).expect("config").run().expect("run");
    let parity: Vec<bool> = result
        .trace
        .iter()
        .filter_map(|record| match &record.action {
            Action::Move {
                outcome:
                    MoveOutcome::ClientRejected {
                        server_rejects: Some(agrees),
                        ..
                    },
                ..
            } => Some(*agrees),
            _ => None,
        })
        .collect();
    assert!(!parity.is_empty());
    assert!(parity.iter().all(|agrees| *agrees));
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn any_seed_keeps_invariants(
        seed in any::<u64>(),
        stale in 0u8..=100,
        multi_drag in 0u8..=100,
        nest in 0u8..=100,
        depth in 1usize..6,
    ) {
        let config = SimulationConfig {
            seed,
            stale_percent: stale,
            multi_drag_percent: multi_drag,
            nest_percent: nest,
            max_depth: depth,
            items_per_scope: 12,
            moves: 48,
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).expect("config").run().expect("run");
        let oracle = OrderingOracle::check_all(&result);
        prop_assert!(oracle.passed, "{:?}", oracle.violations);
    }
}
