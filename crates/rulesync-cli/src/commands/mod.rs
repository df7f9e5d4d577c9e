//! Command implementations for the rulesync CLI

pub mod config;
pub mod deploy;
pub mod ledger;
pub mod remote;

pub use config::run_show_config;
pub use deploy::run_deploy;
pub use ledger::{run_history, run_node, run_nodes, run_stats};
pub use remote::run_remote_hash;
