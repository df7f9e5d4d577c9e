//! HTTP client for the central authority

use crate::report::{DeploymentReport, DeploymentReporter};
use crate::{Manifest, PackageFormat, Result, TransportError};
use backoff::ExponentialBackoffBuilder;
use rulesync_fs::FileDescriptor;
use std::io::Read;
use std::time::Duration;

const MANIFEST_PATH: &str = "rules";
const BUNDLE_PATH: &str = "rules/latest";
const FILE_HASH_PATH: &str = "rules/hash";
const DEPLOY_PATH: &str = "deploy";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(30);
const MAX_BUNDLE_BYTES: u64 = 256 * 1024 * 1024;

/// Authenticated client for the authority's rules API.
///
/// Every request carries the bearer credential and the node id. GET
/// requests are retried with exponential backoff on connection errors
/// and 5xx responses; the deployment report is sent once.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    base_url: String,
    api_key: String,
    node_id: String,
    agent: ureq::Agent,
    retry_window: Duration,
    max_bundle_bytes: u64,
}

impl AuthorityClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            node_id: node_id.into(),
            agent,
            retry_window: DEFAULT_RETRY_WINDOW,
            max_bundle_bytes: MAX_BUNDLE_BYTES,
        }
    }

    /// Total time budget for retrying a failed GET. Zero disables retries.
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// Largest bundle download accepted, in bytes.
    pub fn with_bundle_limit(mut self, max_bytes: u64) -> Self {
        self.max_bundle_bytes = max_bytes;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// `GET /rules`: the current manifest.
    pub fn manifest(&self) -> Result<Manifest> {
        let url = self.url(MANIFEST_PATH);
        let body = self.get_string(&url, &[])?;
        let mut manifest: Manifest =
            serde_json::from_str(&body).map_err(|e| TransportError::InvalidResponse {
                url: url.clone(),
                message: e.to_string(),
            })?;
        manifest.sort();
        Ok(manifest)
    }

    /// `GET /rules/latest?format=`: the packaged bundle bytes.
    pub fn bundle(&self, format: PackageFormat) -> Result<Vec<u8>> {
        let url = self.url(BUNDLE_PATH);
        let response = self.get(&url, &[("format", format.as_str())])?;

        // One byte past the limit tells an oversized body from one that fits exactly.
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bundle_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| TransportError::InvalidResponse {
                url: url.clone(),
                message: e.to_string(),
            })?;
        if bytes.len() as u64 > self.max_bundle_bytes {
            return Err(TransportError::InvalidResponse {
                url,
                message: format!("bundle exceeds limit of {} bytes", self.max_bundle_bytes),
            });
        }

        tracing::debug!(url = %url, bytes = bytes.len(), format = %format, "Downloaded bundle");
        Ok(bytes)
    }

    /// `GET /rules/hash/{name}`: descriptor of a single file.
    pub fn file_hash(&self, name: &str) -> Result<FileDescriptor> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(TransportError::FileNotFound {
                name: name.to_string(),
            });
        }

        let url = self.url(&format!("{}/{}", FILE_HASH_PATH, name));
        let body = match self.get_string(&url, &[]) {
            Err(TransportError::Http { status: 404, .. }) => {
                return Err(TransportError::FileNotFound {
                    name: name.to_string(),
                });
            }
            other => other?,
        };
        serde_json::from_str(&body).map_err(|e| TransportError::InvalidResponse {
            url,
            message: e.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("X-Server-ID", &self.node_id)
            .set("User-Agent", &format!("rulesync/{}", self.node_id))
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<ureq::Response> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(Some(self.retry_window))
            .build();

        let attempt = || {
            let mut request = self.authorize(self.agent.get(url));
            for (key, value) in query {
                request = request.query(key, value);
            }
            request.call().map_err(|e| {
                let error = classify(url, e);
                if let backoff::Error::Transient { err, .. } = &error {
                    tracing::warn!(url = %url, error = %err, "Request failed, retrying");
                }
                error
            })
        };

        backoff::retry(policy, attempt).map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    fn get_string(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.get(url, query)?
            .into_string()
            .map_err(|e| TransportError::InvalidResponse {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// Sort a ureq failure into retryable and final.
fn classify(url: &str, error: ureq::Error) -> backoff::Error<TransportError> {
    match error {
        ureq::Error::Status(status @ (401 | 403), _) => {
            backoff::Error::permanent(TransportError::Unauthorized {
                url: url.to_string(),
                status,
            })
        }
        ureq::Error::Status(status, response) => {
            let message = response
                .into_string()
                .unwrap_or_default()
                .trim()
                .to_string();
            let error = TransportError::Http {
                url: url.to_string(),
                status,
                message,
            };
            if status >= 500 {
                backoff::Error::transient(error)
            } else {
                backoff::Error::permanent(error)
            }
        }
        ureq::Error::Transport(transport) => backoff::Error::transient(TransportError::Network {
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}

impl DeploymentReporter for AuthorityClient {
    fn report(&self, report: &DeploymentReport) -> Result<()> {
        let url = self.url(DEPLOY_PATH);
        let body = serde_json::to_string(report).map_err(|e| TransportError::InvalidResponse {
            url: url.clone(),
            message: e.to_string(),
        })?;

        self.authorize(self.agent.post(&url))
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| match classify(&url, e) {
                backoff::Error::Permanent(err) => err,
                backoff::Error::Transient { err, .. } => err,
            })?;

        tracing::debug!(url = %url, success = report.success, "Reported deployment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = AuthorityClient::new("http://authority:8000/", "key", "node-1");
        assert_eq!(client.url(MANIFEST_PATH), "http://authority:8000/rules");
        assert_eq!(client.url(BUNDLE_PATH), "http://authority:8000/rules/latest");
    }

    #[test]
    fn path_like_names_are_refused_without_a_request() {
        let client = AuthorityClient::new("http://127.0.0.1:9", "key", "node-1")
            .with_retry_window(Duration::ZERO);
        let err = client.file_hash("../etc/passwd").unwrap_err();
        assert!(matches!(err, TransportError::FileNotFound { .. }));
    }
}
