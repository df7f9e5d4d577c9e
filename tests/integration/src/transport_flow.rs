//! Deployments fed by the real repository and package transports

use pretty_assertions::assert_eq;
use rulesync_core::{DeployConfig, Orchestrator, RunOptions, RunReport, SourceConfig};
use rulesync_ledger::Outcome;
use rulesync_test_utils::authority::{MockAuthority, MockResponse};
use rulesync_test_utils::control::ScriptedControl;
use rulesync_test_utils::git::{commit_files, init_origin, remove_file};
use rulesync_test_utils::node::TestNode;
use rulesync_test_utils::package::tar_gz_bundle;
use rulesync_test_utils::tree::hash_set;
use rulesync_transport::PackageFormat;
use serde_json::json;
use std::fs;

fn run(config: &DeployConfig) -> RunReport {
    let mut orchestrator = Orchestrator::new(
        config.clone(),
        config.transport().unwrap(),
        Box::new(ScriptedControl::healthy()),
    )
    .unwrap();
    if let Some(client) = config.authority_client() {
        orchestrator = orchestrator.with_reporter(client);
    }
    orchestrator.run(RunOptions::default()).unwrap()
}

fn names(files: &[rulesync_fs::FileDescriptor]) -> Vec<&str> {
    files.iter().map(|f| f.name.as_str()).collect()
}

#[test]
fn package_source_deploys_and_reports() {
    let archive = tar_gz_bundle(&[
        ("rules/local_rules.xml", "<group name=\"local\"/>"),
        ("rules/rule_9999.xml", "<rule id=\"9999\"/>"),
        ("decoders/local_decoder.xml", "<decoder/>"),
    ]);
    let authority = MockAuthority::start(move |req| match (req.method.as_str(), req.path()) {
        ("GET", "/rules/latest") if req.target.contains("format=tar.gz") => {
            MockResponse::bytes(archive.clone())
        }
        ("POST", "/deploy") => MockResponse::json(200, json!({"status": "recorded"})),
        _ => MockResponse::status(404),
    });

    let node = TestNode::new();
    node.write_live(&[("rules/local_rules.xml", "<group name=\"local\"/>")]);
    let config = DeployConfig {
        report: true,
        source: SourceConfig::Package {
            api_url: authority.url(),
            api_key: "node-key".into(),
            format: PackageFormat::TarGz,
        },
        ..node.config.clone()
    };

    let report = run(&config);

    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(report.report_error, None);
    assert_eq!(
        fs::read_to_string(config.rules_dir.join("rule_9999.xml")).unwrap(),
        "<rule id=\"9999\"/>"
    );
    assert!(config.decoders_dir.join("local_decoder.xml").is_file());

    let posted: Vec<_> = authority
        .requests()
        .into_iter()
        .filter(|r| r.method == "POST")
        .collect();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].path(), "/deploy");
    assert_eq!(posted[0].header("authorization"), Some("Bearer node-key"));
    let body = posted[0].body_json();
    assert_eq!(body["rules_count"], 1);
    assert_eq!(body["decoders_count"], 1);
    assert_eq!(body["success"], true);
    assert_eq!(body["server_id"], "test-node");
}

#[test]
fn unreachable_authority_fails_without_touching_live() {
    let node = TestNode::new();
    node.write_live(&[("rules/local_rules.xml", "<group/>")]);
    let before = node.live_snapshot();
    let config = DeployConfig {
        source: SourceConfig::Package {
            // Port 9 (discard) has no listener on test hosts.
            api_url: "http://127.0.0.1:9".into(),
            api_key: "node-key".into(),
            format: PackageFormat::Zip,
        },
        ..node.config.clone()
    };

    let report = orchestrator_without_retry(&config).run(RunOptions::default()).unwrap();

    assert_eq!(report.outcome(), Outcome::Failed);
    assert!(report.record.error_detail.unwrap().contains("fetch"));
    assert_eq!(node.live_snapshot(), before);
}

fn orchestrator_without_retry(config: &DeployConfig) -> Orchestrator {
    let SourceConfig::Package { format, .. } = &config.source else {
        panic!("package source expected");
    };
    let client = config
        .authority_client()
        .unwrap()
        .with_retry_window(std::time::Duration::ZERO);
    let transport =
        rulesync_transport::PackageTransport::new(client, *format, config.pattern().unwrap());
    Orchestrator::new(
        config.clone(),
        Box::new(transport),
        Box::new(ScriptedControl::healthy()),
    )
    .unwrap()
}

#[test]
fn repository_source_follows_the_branch() {
    let node = TestNode::new();
    let origin = node.root().join("origin");
    let repo = init_origin(&origin);
    let first = commit_files(
        &repo,
        &[
            ("rules/local_rules.xml", "<group name=\"v1\"/>"),
            ("rules/rule_9999.xml", "<rule id=\"9999\"/>"),
            ("decoders/local_decoder.xml", "<decoder/>"),
        ],
        "initial bundle",
    );
    let config = DeployConfig {
        source: SourceConfig::Repository {
            url: origin.to_string_lossy().into_owned(),
            branch: "main".into(),
            checkout_path: node.root().join("checkout"),
        },
        ..node.config.clone()
    };

    let report = run(&config);
    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(report.record.generation, Some(first.to_string()));
    assert_eq!(report.record.files_applied.rules, 2);

    remove_file(&repo, "rules/rule_9999.xml", "drop rule 9999");
    let second = commit_files(
        &repo,
        &[("rules/local_rules.xml", "<group name=\"v2\"/>")],
        "update local rules",
    );

    let report = run(&config);
    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(report.record.generation, Some(second.to_string()));
    let plan = report.plan.unwrap();
    assert_eq!(plan.rules.to_remove, vec!["rule_9999.xml".to_string()]);
    assert_eq!(names(&plan.rules.to_replace), vec!["local_rules.xml"]);
    assert!(!plan.decoders.required);

    assert_eq!(
        hash_set(&config.rules_dir),
        hash_set(&node.root().join("checkout/rules"))
    );
    assert!(!config.rules_dir.join("rule_9999.xml").exists());
}
