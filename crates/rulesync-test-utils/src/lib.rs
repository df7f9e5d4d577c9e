//! Shared test fixtures for the rulesync workspace.
//!
//! Dev-dependency only. Helpers panic with a descriptive message instead
//! of returning errors.
//!
//! - [`tree`]: write and snapshot directory trees
//! - [`transport`]: in-process bundle transport over a directory
//! - [`control`]: scripted process control with call counters
//! - [`faults`]: directory operations, ledgers and reporters that fail on demand
//! - [`git`]: local git origins for the repository transport
//! - [`authority`]: minimal HTTP authority on a loopback port
//! - [`package`]: in-memory zip and tar.gz bundles
//! - [`node`]: a temporary node layout with a matching config

pub mod authority;
pub mod control;
pub mod faults;
pub mod git;
pub mod node;
pub mod package;
pub mod transport;
pub mod tree;
