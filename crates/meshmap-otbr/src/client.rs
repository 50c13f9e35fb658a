//! OTBR REST client

use meshmap_core::{FailureKind, RawDiagnostics};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const NODE_PATH: &str = "/node";
const DIAGNOSTICS_PATH: &str = "/diagnostics";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid OTBR URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Cannot reach OTBR at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("OTBR returned {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("OTBR returned malformed JSON from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    /// How the failure is reported on the snapshot store
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Malformed { .. } => FailureKind::MalformedData,
            _ => FailureKind::Transport,
        }
    }
}

/// Anything that can produce one poll's worth of diagnostics
pub trait DiagnosticSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<RawDiagnostics, FetchError>> + Send;
}

/// Client for one border router
#[derive(Debug, Clone)]
pub struct OtbrClient {
    base: String,
    client: Client,
    timeout: Duration,
}

impl OtbrClient {
    /// Create a client for `base_url` (e.g. `http://192.168.1.10:8081`).
    /// Trailing slashes are dropped.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base = base_url.trim().trim_end_matches('/').to_string();
        let invalid = |reason: String| FetchError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };

        let parsed = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", parsed.scheme())));
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            base,
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, FetchError> {
        let url = format!("{}{}", self.base, path);
        trace!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
            url,
            reason: e.to_string(),
        })
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Connect {
                url: url.to_string(),
                source: e,
            }
        }
    }

    /// Fetch `/node` only and return the network name, as a connection check
    pub async fn probe(&self) -> Result<Option<String>, FetchError> {
        let node = self.get_json(NODE_PATH).await?;
        Ok(node
            .get("NetworkName")
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }
}

impl DiagnosticSource for OtbrClient {
    async fn fetch(&self) -> Result<RawDiagnostics, FetchError> {
        let node = self.get_json(NODE_PATH).await?;
        let diagnostics = self.get_json(DIAGNOSTICS_PATH).await?;
        debug!(
            base = %self.base,
            entries = diagnostics.as_array().map(|a| a.len()),
            "Fetched OTBR diagnostics"
        );
        Ok(RawDiagnostics::new(node, diagnostics))
    }
}
