//! Bundle transports for rulesync
//!
//! A transport turns "the latest bundle" into a local directory tree plus
//! a [`Manifest`] describing it. Two strategies are provided:
//!
//! - [`RepositoryTransport`]: a git working copy synced to a branch or tag
//! - [`PackageTransport`]: a zip or tar.gz archive downloaded from the
//!   authority and unpacked into a scratch directory
//!
//! Transports never write to live configuration directories.

pub mod archive;
pub mod client;
pub mod error;
pub mod manifest;
pub mod package;
pub mod report;
pub mod repository;
pub mod transport;

pub use archive::PackageFormat;
pub use client::AuthorityClient;
pub use error::{Result, TransportError};
pub use manifest::{Category, Manifest};
pub use package::PackageTransport;
pub use report::{DeploymentReport, DeploymentReporter};
pub use repository::RepositoryTransport;
pub use transport::{BundleTransport, BundleTree};
