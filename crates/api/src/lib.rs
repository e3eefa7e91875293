//! Graphrun API client utilities.
//!
//! This module provides a lightweight client for the remote execution
//! service. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Validating the configured base URL
//! - Fetching the `init` metadata as a single JSON document
//! - Opening the `stream` endpoint for new and resumed executions and handing
//!   the raw response body back as a byte stream
//!
//! The primary entry point is [`GraphClient`]. Decoding the streamed body into
//! JSON documents is left to `graphrun_util::json_stream`.
//!
//! # Example
//!
//! ```ignore
//! use graphrun_api::{ClientOptions, GraphClient, StreamRequest};
//!
//! let client = GraphClient::new("http://localhost:8080", ClientOptions::default())?;
//! let init = client.fetch_init().await?;
//! let body = client.open_stream(&StreamRequest::submit("t1".into(), serde_json::json!({"q": "hello"}))).await?;
//! ```

use std::time::Duration;
use std::{env, fmt};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use graphrun_types::{InitData, ThreadId, UpdatedState};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url, header};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Raw response body of the `stream` endpoint.
pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Errors raised while talking to the execution service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response body read failed: {message}")]
    Body { message: String },

    #[error("invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn invalid_base_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBaseUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self::Body { message: message.into() }
    }
}

/// Tuning applied when building the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on connecting, and on the whole `init` request. Streams are not bounded here.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Where a resumed execution picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub node: String,
    pub checkpoint: Option<String>,
}

/// One call to the `stream` endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub thread_id: ThreadId,
    /// JSON body: input values for a new execution, checkpoint data when resuming.
    pub body: Value,
    pub resume: Option<ResumePoint>,
}

impl StreamRequest {
    /// Start a new execution on `thread_id` with the given input values.
    pub fn submit(thread_id: ThreadId, inputs: Value) -> Self {
        Self {
            thread_id,
            body: inputs,
            resume: None,
        }
    }

    /// Resume `thread_id` from the checkpoint captured in `state`.
    pub fn resume(thread_id: ThreadId, state: UpdatedState) -> Self {
        Self {
            thread_id,
            body: state.data,
            resume: Some(ResumePoint {
                node: state.node,
                checkpoint: state.checkpoint,
            }),
        }
    }

    /// Query parameters in the order the service documents them.
    ///
    /// A missing checkpoint is sent as an empty value; the service decides what that means.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("thread", self.thread_id.to_string())];
        if let Some(resume) = &self.resume {
            pairs.push(("resume", "true".to_string()));
            pairs.push(("node", resume.node.clone()));
            pairs.push(("checkpoint", resume.checkpoint.clone().unwrap_or_default()));
        }
        pairs
    }
}

#[derive(Clone)]
/// Thin wrapper around a configured `reqwest::Client` for the execution service.
///
/// The client pre-configures default headers and builds requests against a
/// validated base URL.
pub struct GraphClient {
    base_url: String,
    http: Client,
    user_agent: String,
    request_timeout: Option<Duration>,
}

impl fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl GraphClient {
    /// Construct a [`GraphClient`] for `base_url`.
    ///
    /// The URL must use `http` or `https` and include a host. A trailing slash
    /// is ignored so endpoint paths can be appended directly.
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self, ApiError> {
        let base_url = validate_base_url(base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(default_headers);
        if let Some(timeout) = options.request_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("graphrun/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
            request_timeout: options.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a `reqwest::RequestBuilder` for a method and service-relative path.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "building request");

        self.http.request(method, url).header(header::USER_AGENT, &self.user_agent)
    }

    /// Fetch the service's argument metadata from `GET /init`.
    pub async fn fetch_init(&self) -> Result<InitData, ApiError> {
        let mut builder = self.request(Method::GET, "/init");
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let response = ensure_success(builder.send().await?).await?;
        let text = response.text().await?;
        let init: InitData = serde_json::from_str(&text)?;
        debug!(arg_count = init.args.len(), "init metadata received");
        Ok(init)
    }

    /// Build the `POST /stream` request without sending it.
    pub fn stream_request(&self, request: &StreamRequest) -> RequestBuilder {
        self.request(Method::POST, "/stream")
            .query(&request.query_pairs())
            .header(header::CONTENT_TYPE, "application/json")
            .body(request.body.to_string())
    }

    /// Send a `POST /stream` request and return its body as raw bytes.
    ///
    /// The returned stream is not decoded; every item is one network read.
    pub async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, ApiError> {
        debug!(
            thread = %request.thread_id,
            resume = request.resume.is_some(),
            "opening execution stream"
        );
        let response = ensure_success(self.stream_request(request).send().await?).await?;
        let body = response
            .bytes_stream()
            .map(|read| read.map_err(|error| ApiError::body(error.to_string())))
            .boxed();
        Ok(body)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    warn!(%url, status = %status, "request rejected by execution service");
    Err(ApiError::Status {
        status: status.as_u16(),
        body: status_body(status, body),
    })
}

fn status_body(status: StatusCode, body: String) -> String {
    if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body
    }
}

/// Validate that a base URL is acceptable for use by the client and return
/// it without a trailing slash.
fn validate_base_url(base: &str) -> Result<String, ApiError> {
    let trimmed = base.trim();
    let parsed = Url::parse(trimmed).map_err(|error| ApiError::invalid_base_url(trimmed, error.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::invalid_base_url(
            trimmed,
            format!("scheme must be http or https; got '{}://'", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ApiError::invalid_base_url(trimmed, "a host is required"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ApiError::invalid_base_url(trimmed, "query strings and fragments are not allowed"));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}
