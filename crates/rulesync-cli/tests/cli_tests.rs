//! End-to-end tests that run the `rulesync` binary against a local git
//! origin and a throwaway node layout.

use assert_cmd::Command;
use predicates::prelude::*;
use rulesync_fs::{LockGuard, compute_content_checksum};
use rulesync_test_utils::git::{commit_files, init_origin};
use rulesync_test_utils::tree::write_tree;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Node {
    temp: TempDir,
}

impl Node {
    /// Node whose origin adds `rule_9999.xml` and a decoder on top of the
    /// rule already deployed.
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let repo = init_origin(&temp.path().join("origin"));
        commit_files(
            &repo,
            &[
                ("rules/local_rules.xml", "<group name=\"local\"/>"),
                ("rules/rule_9999.xml", "<group name=\"new\"/>"),
                ("decoders/local_decoder.xml", "<decoder/>"),
            ],
            "bundle",
        );
        write_tree(
            &temp.path().join("live"),
            &[("rules/local_rules.xml", "<group name=\"local\"/>")],
        );
        fs::create_dir_all(temp.path().join("live/decoders")).unwrap();
        Self { temp }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    fn config(&self, systemctl: &Path) -> Value {
        json!({
            "node_id": "edge-01",
            "rules_dir": self.path("live/rules"),
            "decoders_dir": self.path("live/decoders"),
            "backup_root": self.path("backup"),
            "lock_path": self.path("state/rulesync.lock"),
            "ledger_path": self.path("state/ledger.sqlite3"),
            "systemctl": systemctl,
            "verify_timeout_secs": 0,
            "verify_interval_ms": 10,
            "restart_timeout_secs": 5,
            "source": {
                "kind": "repository",
                "url": self.path("origin").to_string_lossy(),
                "branch": "main",
                "checkout_path": self.path("checkout"),
            }
        })
    }

    fn write_config(&self, config: &Value) -> PathBuf {
        let path = self.path("config.json");
        fs::write(&path, serde_json::to_vec_pretty(config).unwrap()).unwrap();
        path
    }

    /// Config using `true` as systemctl: restarts and checks always pass.
    fn healthy_config(&self) -> PathBuf {
        self.write_config(&self.config(Path::new("true")))
    }

    fn rulesync(&self, config: &Path) -> Command {
        let mut cmd = Command::cargo_bin("rulesync").unwrap();
        cmd.env_remove("RULESYNC_NODE_ID")
            .env_remove("RULESYNC_API_KEY")
            .arg("--config")
            .arg(config);
        cmd
    }

    fn json_output(&self, config: &Path, args: &[&str]) -> Value {
        let output = self.rulesync(config).args(args).output().unwrap();
        assert!(output.status.success(), "{:?} failed: {:?}", args, output);
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("rulesync")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("nodes"));
}

#[test]
fn deploy_then_second_run_is_noop() {
    let node = Node::new();
    let config = node.healthy_config();

    node.rulesync(&config)
        .arg("deploy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployed 1 rules and 1 decoders"))
        .stdout(predicate::str::contains("rule_9999.xml"));

    assert_eq!(
        fs::read_to_string(node.path("live/rules/rule_9999.xml")).unwrap(),
        "<group name=\"new\"/>"
    );
    assert!(node.path("live/decoders/local_decoder.xml").is_file());

    node.rulesync(&config)
        .arg("deploy")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));
}

#[test]
fn json_report_describes_the_run() {
    let node = Node::new();
    let config = node.healthy_config();

    let report = node.json_output(&config, &["deploy", "--json"]);

    assert_eq!(report["transitions"].as_array().unwrap().last().unwrap(), "COMMITTED");
    assert_eq!(report["record"]["outcome"], "SUCCESS");
    assert_eq!(report["record"]["files_applied"]["rules"], 1);
    assert_eq!(report["record"]["files_applied"]["decoders"], 1);
    assert_eq!(
        report["plan"]["rules"]["to_add"][0]["name"],
        "rule_9999.xml"
    );
}

#[test]
fn dry_run_changes_nothing() {
    let node = Node::new();
    let config = node.healthy_config();

    node.rulesync(&config)
        .args(["deploy", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rule_9999.xml"))
        .stdout(predicate::str::contains("Dry run"));

    assert!(!node.path("live/rules/rule_9999.xml").exists());
    assert!(!node.path("backup").exists());
    let history = node.json_output(&config, &["history", "--json"]);
    assert_eq!(history, json!([]));
}

#[cfg(unix)]
#[test]
fn unhealthy_service_rolls_back_with_exit_code_2() {
    use std::os::unix::fs::PermissionsExt;

    let node = Node::new();
    let script = node.path("fake-systemctl");
    fs::write(
        &script,
        "#!/bin/sh\ncase \"$1\" in\n  restart) exit 0 ;;\n  *) exit 3 ;;\nesac\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    let config = node.write_config(&node.config(&script));

    node.rulesync(&config)
        .arg("deploy")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ROLLED BACK"));

    assert!(!node.path("live/rules/rule_9999.xml").exists());
    assert_eq!(
        fs::read_to_string(node.path("live/rules/local_rules.xml")).unwrap(),
        "<group name=\"local\"/>"
    );

    let stats = node.json_output(&config, &["stats", "--json"]);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["rolled_back"], 1);
}

#[test]
fn held_lock_exits_with_code_3() {
    let node = Node::new();
    let config = node.healthy_config();
    let _lock = LockGuard::try_acquire(&node.path("state/rulesync.lock")).unwrap();

    node.rulesync(&config)
        .arg("deploy")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already running"));

    assert!(!node.path("live/rules/rule_9999.xml").exists());
}

#[test]
fn ledger_commands_reflect_deployments() {
    let node = Node::new();
    let config = node.healthy_config();
    node.rulesync(&config).arg("deploy").assert().success();
    node.rulesync(&config).arg("deploy").assert().success();

    let stats = node.json_output(&config, &["stats", "--days", "1", "--json"]);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["successful"], 2);
    assert_eq!(stats["success_rate"], 100.0);

    let nodes = node.json_output(&config, &["nodes", "--json"]);
    assert_eq!(nodes[0]["node_id"], "edge-01");
    assert_eq!(nodes[0]["deployment_count"], 2);

    let history = node.json_output(&config, &["history", "--json"]);
    let actions: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["noop", "deploy"]);
}

#[test]
fn node_command_registers_and_deactivates() {
    let node = Node::new();
    let config = node.healthy_config();

    node.rulesync(&config)
        .args(["node", "edge-02", "--description", "lab manager", "--inactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inactive"));

    let nodes = node.json_output(&config, &["nodes", "--json"]);
    assert_eq!(nodes[0]["node_id"], "edge-02");
    assert_eq!(nodes[0]["description"], "lab manager");
    assert_eq!(nodes[0]["active"], false);
}

#[test]
fn repository_source_without_url_is_rejected() {
    let node = Node::new();
    let mut config = node.config(Path::new("true"));
    config["source"]["url"] = json!("");
    let config = node.write_config(&config);

    node.rulesync(&config)
        .arg("deploy")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source.url"));
}

#[test]
fn remote_hash_reads_the_bundle() {
    let node = Node::new();
    let config = node.healthy_config();
    let expected = compute_content_checksum(b"<group name=\"new\"/>");

    node.rulesync(&config)
        .args(["remote-hash", "rule_9999.xml"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected))
        .stdout(predicate::str::contains("rule_9999.xml"));

    node.rulesync(&config)
        .args(["remote-hash", "missing.xml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing.xml"));
}
