//! HTTP seam between the platform operations and the network
//!
//! `ApiBackend` executes one request and hands back the raw status and body.
//! Status interpretation lives in `PlatformApi`, so a backend never decides
//! what a 404 or 409 means. `ReqwestBackend` is the production backend;
//! tests swap in `fakes::MemoryPlatform`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::TransportError;
use crate::TransportResult;

/// Commit discovery before a push.
pub const COMMIT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);
/// Prompt reference checks.
pub const PROMPT_CHECK_TIMEOUT: Duration = Duration::from_secs(20);
/// Metadata lookups and resource creation.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
/// Run create/end, which may carry large payloads.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Path prefix of the REST surface.
pub const API_PREFIX: &str = "/api/v1";

/// A single platform request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute path including `API_PREFIX`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        Self {
            method,
            path: format!("{}{}", API_PREFIX, path.as_ref()),
            query: Vec::new(),
            body: None,
            timeout: METADATA_TIMEOUT,
        }
    }

    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl AsRef<str>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl AsRef<str>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> TransportResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// Turn any non-2xx status into `TransportError::Status`.
    pub fn require_success(self, operation: &str) -> TransportResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_status_error(operation))
        }
    }

    pub fn into_status_error(self, operation: &str) -> TransportError {
        TransportError::Status {
            operation: operation.to_string(),
            status: self.status,
            body: self.body,
        }
    }

    pub fn json<T: DeserializeOwned>(&self, operation: &str) -> TransportResult<T> {
        serde_json::from_str(&self.body).map_err(|e| TransportError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}

/// Executes platform requests.
#[async_trait]
pub trait ApiBackend: Send + Sync {
    /// Base URL used to build user-facing links.
    fn base_url(&self) -> &str;

    /// Send one request. Only I/O failures are errors; every status code is
    /// returned as a response.
    async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse>;
}

/// Production backend over `reqwest`.
pub struct ReqwestBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Create a backend for `base_url`.
    ///
    /// A missing `api_key` is accepted here and reported by every call.
    pub fn new(base_url: &str, api_key: Option<String>) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tracekit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(ReqwestBackend {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ApiBackend for ReqwestBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(TransportError::MissingApiKey)?;

        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, url = %url, "platform request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .timeout(request.timeout)
            .header("x-api-key", api_key)
            .header(CONTENT_TYPE, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}
