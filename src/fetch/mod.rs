//! HTTP fetching.
//!
//! The core only sees the [`HttpFetcher`] trait: fetch a URL, get a status
//! and a body back. [`ReqwestFetcher`] is the production implementation;
//! tests substitute an in-memory fetcher.
//!
//! [`fetch_text`] is the helper every suspension point uses: it applies the
//! request deadline and turns non-success statuses into
//! [`GadgetError::HttpStatus`].

mod deadline;

pub use deadline::RequestDeadline;

use anyhow::Result;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::debug;

use crate::core::GadgetError;

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute URL.
    pub url: String,
    /// HTTP method, upper case.
    pub method: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// A plain `GET` of `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl FetchResponse {
    /// A `200 OK` response with `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Capability to fetch remote resources.
pub trait HttpFetcher: Send + Sync {
    /// Perform `request`.
    ///
    /// Transport failures are errors; any HTTP status, including 4xx and
    /// 5xx, is a successful fetch.
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>>;
}

/// [`HttpFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher whose individual requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gadget-container/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
        })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
                GadgetError::FetchFailed {
                    url: request.url.clone(),
                    reason: e.to_string(),
                }
            })?;
            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| GadgetError::FetchFailed {
                url: request.url.clone(),
                reason: e.to_string(),
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| GadgetError::FetchFailed {
                url: request.url.clone(),
                reason: e.to_string(),
            })?;
            Ok(FetchResponse {
                status,
                body,
            })
        })
    }
}

/// Fetch `request` within `deadline` and return the body of a 2xx response.
///
/// # Errors
///
/// Returns [`GadgetError::Timeout`] when the deadline passes,
/// [`GadgetError::HttpStatus`] for non-2xx statuses and the fetcher's error
/// for transport failures.
pub async fn fetch_text(
    fetcher: &dyn HttpFetcher,
    deadline: &RequestDeadline,
    request: &FetchRequest,
    operation: &str,
) -> Result<String> {
    debug!("Fetching {} ({})", request.url, operation);
    let response = deadline.run(operation, fetcher.fetch(request)).await?;
    if !response.is_success() {
        return Err(GadgetError::HttpStatus {
            url: request.url.clone(),
            status: response.status,
        }
        .into());
    }
    Ok(response.body)
}
