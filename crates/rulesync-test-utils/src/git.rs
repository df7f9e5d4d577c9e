//! Local git origins for the repository transport

use git2::{IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::Path;

/// Initialise a non-bare repository whose initial branch is `main`.
pub fn init_origin(path: &Path) -> Repository {
    let mut options = RepositoryInitOptions::new();
    options.initial_head("main");
    Repository::init_opts(path, &options)
        .unwrap_or_else(|e| panic!("init_origin: init {}: {e}", path.display()))
}

/// Write `files` into the working tree, stage every change (including
/// deletions) and commit on the current branch.
pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo
        .workdir()
        .unwrap_or_else(|| panic!("commit_files: repository is bare"))
        .to_path_buf();
    for (relative, content) in files {
        let path = workdir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("commit_files: create {}: {e}", parent.display()));
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("commit_files: write {}: {e}", path.display()));
    }
    commit_all(repo, message)
}

/// Delete `relative` from the working tree and commit the removal.
pub fn remove_file(repo: &Repository, relative: &str, message: &str) -> Oid {
    let workdir = repo
        .workdir()
        .unwrap_or_else(|| panic!("remove_file: repository is bare"));
    let path = workdir.join(relative);
    fs::remove_file(&path).unwrap_or_else(|e| panic!("remove_file: {}: {e}", path.display()));
    commit_all(repo, message)
}

fn commit_all(repo: &Repository, message: &str) -> Oid {
    let mut index = repo
        .index()
        .unwrap_or_else(|e| panic!("commit_all: index: {e}"));
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap_or_else(|e| panic!("commit_all: add: {e}"));
    index
        .update_all(["*"].iter(), None)
        .unwrap_or_else(|e| panic!("commit_all: update: {e}"));
    index
        .write()
        .unwrap_or_else(|e| panic!("commit_all: write index: {e}"));
    let tree_id = index
        .write_tree()
        .unwrap_or_else(|e| panic!("commit_all: write tree: {e}"));
    let tree = repo
        .find_tree(tree_id)
        .unwrap_or_else(|e| panic!("commit_all: find tree: {e}"));

    let signature = Signature::now("rulesync tests", "tests@rulesync.invalid")
        .unwrap_or_else(|e| panic!("commit_all: signature: {e}"));
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_all: commit: {e}"))
}
