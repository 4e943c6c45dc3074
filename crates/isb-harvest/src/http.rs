//! Shared HTTP client setup
//!
//! Every provider call is a plain GET with a per-request timeout. Non-2xx
//! responses are turned into [`HttpError::Status`] so callers can treat them
//! like any other transient failure.

use reqwest::{header, Client};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("isb-harvest/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl HttpError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Request { source, .. } if source.is_timeout())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            HttpError::Request { source, .. } => source.status().map(|s| s.as_u16()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub fn build_client(config: &HttpConfig) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
}

/// A successful (2xx) response body
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

/// GET `url`, failing on transport errors and non-2xx statuses
pub async fn get(client: &Client, url: &str, accept: Option<&str>) -> Result<Fetched, HttpError> {
    let request_error = |source| HttpError::Request {
        url: url.to_string(),
        source,
    };

    let mut request = client.get(url);
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }

    let response = request.send().await.map_err(request_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(HttpError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let final_url = response.url().to_string();
    let body = response.bytes().await.map_err(request_error)?;

    Ok(Fetched {
        url: final_url,
        status: status.as_u16(),
        content_type,
        body: body.to_vec(),
    })
}
