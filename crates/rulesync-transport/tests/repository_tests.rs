//! Repository transport against a local origin

use pretty_assertions::assert_eq;
use rulesync_fs::FilePattern;
use rulesync_test_utils::git::{commit_files, init_origin, remove_file};
use rulesync_transport::{BundleTransport, Category, RepositoryTransport, TransportError};
use std::fs;
use tempfile::TempDir;

fn transport(origin: &std::path::Path, checkout: &std::path::Path) -> RepositoryTransport {
    RepositoryTransport::new(
        origin.to_string_lossy(),
        "main",
        checkout,
        FilePattern::new("*.xml").unwrap(),
    )
}

fn names(files: &[rulesync_fs::FileDescriptor]) -> Vec<&str> {
    files.iter().map(|f| f.name.as_str()).collect()
}

#[test]
fn first_fetch_clones_and_scans() {
    let temp = TempDir::new().unwrap();
    let origin = temp.path().join("origin");
    let repo = init_origin(&origin);
    let commit = commit_files(
        &repo,
        &[
            ("rules/local_rules.xml", "<group/>"),
            ("decoders/local_decoder.xml", "<decoder/>"),
            ("README.md", "bundle"),
        ],
        "initial",
    );

    let checkout = temp.path().join("nodes").join("checkout");
    let bundle = transport(&origin, &checkout).fetch_bundle().unwrap();

    assert_eq!(bundle.root(), checkout.as_path());
    assert_eq!(bundle.manifest().generation, commit.to_string());
    assert_eq!(names(bundle.manifest().files(Category::Rules)), vec!["local_rules.xml"]);
    assert_eq!(
        names(bundle.manifest().files(Category::Decoders)),
        vec!["local_decoder.xml"]
    );
}

#[test]
fn later_fetch_follows_branch_tip() {
    let temp = TempDir::new().unwrap();
    let origin = temp.path().join("origin");
    let repo = init_origin(&origin);
    commit_files(
        &repo,
        &[("rules/a.xml", "<a/>"), ("rules/b.xml", "<b/>")],
        "initial",
    );

    let checkout = temp.path().join("checkout");
    let transport = transport(&origin, &checkout);
    transport.fetch_manifest().unwrap();

    commit_files(&repo, &[("rules/rule_9999.xml", "<rule id=\"9999\"/>")], "add rule");
    let tip = remove_file(&repo, "rules/b.xml", "drop b");
    // Local edits and strays in the checkout are discarded.
    fs::write(checkout.join("rules/a.xml"), "<edited/>").unwrap();
    fs::write(checkout.join("rules/stray.xml"), "<stray/>").unwrap();

    let manifest = transport.fetch_manifest().unwrap();

    assert_eq!(manifest.generation, tip.to_string());
    assert_eq!(names(&manifest.rules), vec!["a.xml", "rule_9999.xml"]);
    assert_eq!(fs::read_to_string(checkout.join("rules/a.xml")).unwrap(), "<a/>");
}

#[test]
fn file_hash_lookup() {
    let temp = TempDir::new().unwrap();
    let origin = temp.path().join("origin");
    let repo = init_origin(&origin);
    commit_files(&repo, &[("decoders/d.xml", "<d/>")], "initial");

    let transport = transport(&origin, &temp.path().join("checkout"));
    let hash = transport.fetch_file_hash("d.xml").unwrap();
    assert!(hash.starts_with("sha256:"));

    let err = transport.fetch_file_hash("missing.xml").unwrap_err();
    assert!(matches!(err, TransportError::FileNotFound { .. }));
}

#[test]
fn missing_origin_is_a_git_error() {
    let temp = TempDir::new().unwrap();
    let transport = transport(&temp.path().join("nowhere"), &temp.path().join("checkout"));
    assert!(matches!(
        transport.fetch_manifest(),
        Err(TransportError::Git(_))
    ));
}
