//! Push-pull transport: download an archive from the authority

use crate::archive::{self, PackageFormat};
use crate::{AuthorityClient, BundleTransport, BundleTree, Manifest, Result, TransportError};
use rulesync_fs::{FilePattern, compute_content_checksum};

/// Downloads the packaged bundle and unpacks it into a scratch
/// directory owned by the returned [`BundleTree`].
///
/// Manifests and file hashes always come from scanning the unpacked
/// archive, so they compare directly with live scans and with
/// [`RepositoryTransport`](crate::RepositoryTransport). The authority's own
/// listing stays available through [`AuthorityClient::manifest`].
#[derive(Debug, Clone)]
pub struct PackageTransport {
    client: AuthorityClient,
    format: PackageFormat,
    pattern: FilePattern,
}

impl PackageTransport {
    pub fn new(client: AuthorityClient, format: PackageFormat, pattern: FilePattern) -> Self {
        Self {
            client,
            format,
            pattern,
        }
    }

    pub fn client(&self) -> &AuthorityClient {
        &self.client
    }
}

impl BundleTransport for PackageTransport {
    fn describe(&self) -> String {
        format!("package {} ({})", self.client.base_url(), self.format)
    }

    fn fetch_manifest(&self) -> Result<Manifest> {
        Ok(self.fetch_bundle()?.manifest().clone())
    }

    fn fetch_bundle(&self) -> Result<BundleTree> {
        let bytes = self.client.bundle(self.format)?;
        let scratch = tempfile::Builder::new()
            .prefix("rulesync-bundle-")
            .tempdir()
            .map_err(|e| rulesync_fs::Error::io(std::env::temp_dir(), e))?;

        let files = archive::unpack(&bytes, self.format, scratch.path())?;
        let manifest = Manifest::scan(scratch.path(), &self.pattern, compute_content_checksum(&bytes))?;
        tracing::info!(
            files,
            generation = %manifest.generation,
            "Unpacked bundle package"
        );
        Ok(BundleTree::with_scratch(scratch, manifest))
    }

    fn fetch_file_hash(&self, name: &str) -> Result<String> {
        let manifest = self.fetch_manifest()?;
        manifest
            .find(name)
            .map(|(_, file)| file.content_hash.clone())
            .ok_or_else(|| TransportError::FileNotFound {
                name: name.to_string(),
            })
    }
}
