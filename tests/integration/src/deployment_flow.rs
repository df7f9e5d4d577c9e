//! Full deployment runs recorded in a real audit ledger

use pretty_assertions::assert_eq;
use rulesync_core::{DeployState, Orchestrator, RunOptions, RunReport};
use rulesync_fs::compute_file_checksum;
use rulesync_ledger::{AuditLedger, DeploymentAction, Outcome};
use rulesync_test_utils::control::ScriptedControl;
use rulesync_test_utils::faults::FaultyOps;
use rulesync_test_utils::node::TestNode;
use rulesync_test_utils::tree::{hash_set, hidden_entries};

/// Node in sync with its bundle apart from one new rule.
fn node_with_new_rule() -> TestNode {
    let node = TestNode::new();
    node.write_both(&[
        ("rules/0010-rules_config.xml", "<group name=\"syslog\"/>"),
        ("rules/local_rules.xml", "<group name=\"local\"/>"),
        ("decoders/local_decoder.xml", "<decoder name=\"local\"/>"),
    ]);
    node.write_bundle(&[("rules/rule_9999.xml", "<rule id=\"9999\" level=\"5\"/>")]);
    node
}

fn orchestrator(node: &TestNode, control: &ScriptedControl, ledger: &AuditLedger) -> Orchestrator {
    Orchestrator::new(
        node.config.clone(),
        Box::new(node.transport()),
        Box::new(control.clone()),
    )
    .unwrap()
    .with_ledger(ledger.clone())
}

fn run(orchestrator: &Orchestrator) -> RunReport {
    orchestrator.run(RunOptions::default()).unwrap()
}

#[test]
fn new_rule_is_deployed_and_recorded() {
    let node = node_with_new_rule();
    let ledger = AuditLedger::open(&node.config.ledger_path).unwrap();
    let control = ScriptedControl::healthy();

    let report = run(&orchestrator(&node, &control, &ledger));

    let plan = report.plan.as_ref().unwrap();
    let added: Vec<_> = plan.rules.to_add.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(added, vec!["rule_9999.xml"]);
    assert!(plan.rules.to_replace.is_empty() && plan.rules.to_remove.is_empty());
    assert!(!plan.decoders.required);

    assert_eq!(report.final_state(), DeployState::Committed);
    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(report.record.files_applied.rules, 1);
    assert_eq!(report.record.files_applied.decoders, 0);
    assert_eq!(control.restarts(), 1);

    let live = hash_set(&node.config.rules_dir);
    assert_eq!(
        live["rule_9999.xml"],
        compute_file_checksum(&node.bundle_dir().join("rules/rule_9999.xml")).unwrap()
    );
    assert_eq!(live, hash_set(&node.bundle_dir().join("rules")));

    let stored = ledger.recent_deployments(10).unwrap();
    assert_eq!(stored, vec![report.record.clone()]);
}

#[test]
fn repeated_run_is_a_noop() {
    let node = node_with_new_rule();
    let ledger = AuditLedger::open(&node.config.ledger_path).unwrap();
    let control = ScriptedControl::healthy();
    let orchestrator = orchestrator(&node, &control, &ledger);

    run(&orchestrator);
    let before = node.live_snapshot();
    let second = run(&orchestrator);

    assert_eq!(second.record.action, DeploymentAction::Noop);
    assert_eq!(second.outcome(), Outcome::Success);
    assert_eq!(second.record.files_applied.total(), 0);
    assert!(second.transitions.contains(&DeployState::Noop));
    assert_eq!(control.restarts(), 1);
    assert_eq!(node.live_snapshot(), before);
}

#[test]
fn failing_health_check_restores_previous_hashes() {
    let node = node_with_new_rule();
    let ledger = AuditLedger::open(&node.config.ledger_path).unwrap();
    let rules_before = hash_set(&node.config.rules_dir);
    let decoders_before = hash_set(&node.config.decoders_dir);

    let report = run(&orchestrator(&node, &ScriptedControl::never_active(), &ledger));

    assert_eq!(report.final_state(), DeployState::RolledBack);
    assert_eq!(report.outcome(), Outcome::RolledBack);
    assert_eq!(hash_set(&node.config.rules_dir), rules_before);
    assert_eq!(hash_set(&node.config.decoders_dir), decoders_before);
    assert!(hidden_entries(&node.live_dir()).is_empty());

    let stats = ledger.query_stats(1).unwrap();
    assert_eq!((stats.total, stats.failed, stats.rolled_back), (1, 1, 1));
}

#[test]
fn interrupted_swap_leaves_live_state_identical() {
    let node = node_with_new_rule();
    node.write_bundle(&[("decoders/extra_decoder.xml", "<decoder name=\"extra\"/>")]);
    let ledger = AuditLedger::open(&node.config.ledger_path).unwrap();
    let before = node.live_snapshot();
    let ops = FaultyOps::fail_swap(2);

    let report = orchestrator(&node, &ScriptedControl::healthy(), &ledger)
        .with_directory_ops(ops.clone())
        .run(RunOptions::default())
        .unwrap();

    assert_eq!(report.outcome(), Outcome::RolledBack);
    assert!(ops.swaps() >= 2);
    assert_eq!(node.live_snapshot(), before);
    assert!(hidden_entries(&node.live_dir()).is_empty());
}

#[test]
fn ledger_counts_add_up_across_runs() {
    let node = node_with_new_rule();
    let ledger = AuditLedger::open(&node.config.ledger_path).unwrap();
    let healthy = ScriptedControl::healthy();

    let deployed = run(&orchestrator(&node, &healthy, &ledger));
    run(&orchestrator(&node, &healthy, &ledger));
    node.write_bundle(&[("rules/rule_9998.xml", "<rule id=\"9998\"/>")]);
    let rolled_back = run(&orchestrator(&node, &ScriptedControl::never_active(), &ledger));
    assert_eq!(rolled_back.outcome(), Outcome::RolledBack);

    let stats = ledger.query_stats(7).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.successful, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.successful + stats.failed, stats.total);
    assert_eq!(stats.success_rate, 66.67);
    assert_eq!(stats.by_node.len(), 1);
    assert_eq!(stats.by_node[0].node_id, "test-node");

    let record = ledger.node("test-node").unwrap().unwrap();
    assert_eq!(record.deployment_count, 3);
    assert!(record.last_success_at.unwrap() >= deployed.record.finished_at.unwrap());
    assert!(record.last_success_at.unwrap() <= rolled_back.record.started_at);
}
