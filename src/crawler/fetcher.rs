//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building per-site HTTP clients routed through the network's proxy
//! - GET requests for HTML pages
//! - Error classification for the retry policy

use crate::config::{ProxyConfig, UserAgentConfig};
use crate::url::NetworkType;
use reqwest::{redirect::Policy, Client, Proxy, Response, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// A single failed fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} is not an HTML page ({content_type})")]
    NotHtml { url: String, content_type: String },

    #[error("Body of {url} exceeds the {limit} byte cap ({size} bytes read or declared)")]
    TooLarge { url: String, size: u64, limit: u64 },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::Connect {
                url,
                message: err.to_string(),
            }
        } else {
            Self::Request {
                url,
                message: err.to_string(),
            }
        }
    }

    /// Returns true for failures another attempt may fix
    ///
    /// | Condition | Retry |
    /// |-----------|-------|
    /// | HTTP 429, 500, 502, 503, 504 | yes |
    /// | Timeout | yes |
    /// | Connection error | yes |
    /// | Any other status, non-HTML or oversized body | no |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(
                StatusCode::from_u16(*status),
                Ok(StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT)
            ),
            Self::Timeout { .. } | Self::Connect { .. } => true,
            Self::Request { .. } | Self::NotHtml { .. } | Self::TooLarge { .. } => false,
        }
    }
}

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
    pub response_time: Duration,
}

/// Proxy URL for crawls on a network
///
/// Clearnet goes direct, Tor through its SOCKS port with remote DNS so
/// `.onion` names resolve inside Tor, I2P through its HTTP proxy.
pub fn configure_proxy(network: NetworkType, proxy: &ProxyConfig) -> Option<String> {
    match network {
        NetworkType::Clearnet => None,
        NetworkType::Tor => Some(proxy.tor.proxy_url()),
        NetworkType::I2p => Some(proxy.i2p.proxy_url()),
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `proxy_url` - Proxy every request goes through, if any
/// * `timeout` - Budget for one whole request
///
/// # Example
///
/// ```no_run
/// use umbra_crawler::config::UserAgentConfig;
/// use umbra_crawler::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "UmbraCrawler".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client =
///     build_http_client(&config, Some("socks5h://127.0.0.1:9050"), Duration::from_secs(60))
///         .unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(30)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = proxy_url {
        builder = builder.proxy(Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Fetches one HTML page, a single attempt
///
/// Non-2xx statuses are errors; the caller's retry policy decides whether
/// they are worth another attempt. Bodies larger than `max_bytes` are
/// abandoned mid-stream.
pub async fn fetch_page(
    client: &Client,
    url: &Url,
    max_bytes: u64,
) -> Result<FetchedPage, FetchError> {
    let started = Instant::now();
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_html(&content_type) {
        return Err(FetchError::NotHtml {
            url: url.to_string(),
            content_type,
        });
    }

    let final_url = response.url().clone();
    let bytes = read_capped(response, url, max_bytes).await?;
    let body = String::from_utf8_lossy(&bytes).into_owned();

    Ok(FetchedPage {
        url: final_url,
        status_code: status.as_u16(),
        content_type,
        body,
        response_time: started.elapsed(),
    })
}

/// Reads a response body, failing as soon as it is known to exceed `limit`
///
/// The declared Content-Length is checked first; the streamed body is
/// counted as well since the header may be missing or wrong.
pub(crate) async fn read_capped(
    mut response: Response,
    url: &Url,
    limit: u64,
) -> Result<Vec<u8>, FetchError> {
    let too_large = |size| FetchError::TooLarge {
        url: url.to_string(),
        size,
        limit,
    };

    if let Some(declared) = response.content_length() {
        if declared > limit {
            return Err(too_large(declared));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?
    {
        let size = (body.len() + chunk.len()) as u64;
        if size > limit {
            return Err(too_large(size));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Missing Content-Type is treated as HTML; small hidden services often omit it
fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
}
