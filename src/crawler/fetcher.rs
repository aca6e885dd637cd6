//! HTTP fetcher implementation
//!
//! This module handles the default HTTP transport of the crawler:
//! - Building the shared HTTP client, with redirects disabled so that every
//!   hop goes back through the crawler's filtering
//! - HEAD and GET requests with the configured user agent
//! - Buffering the response into a [`Response`]

use crate::url::UrlContext;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Method};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// URL that was requested
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body, empty for HEAD requests
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response with no headers
    pub fn new(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Content-Type header value
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// `charset` parameter of the Content-Type header, lowercased
    pub fn charset(&self) -> Option<String> {
        self.content_type()?
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
    }

    /// Location header value of a redirect
    pub fn redirect_location(&self) -> Option<&str> {
        if !self.is_redirect() {
            return None;
        }
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Whether the body should be parsed as an HTML document
    pub fn looks_like_html(&self) -> bool {
        let declared = self
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"));

        declared
            || strip_bom(&self.body)
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'<')
    }
}

/// Drops a leading UTF-8 byte order mark
pub(crate) fn strip_bom(body: &[u8]) -> &[u8] {
    body.strip_prefix(UTF8_BOM).unwrap_or(body)
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Errors of the fetch capability
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response arrived but its body could not be read
    #[error("Failed to read body: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent sent with every request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_crawl::crawler::build_http_client;
///
/// let client = build_http_client("sumi-crawl/0.1").unwrap();
/// ```
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Redirects are crawled as new URLs
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches the raw URL of a context
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `ctx` - The context whose raw URL is requested
/// * `user_agent` - User agent for this request
/// * `is_head` - Send a HEAD request instead of a GET
///
/// A non-2xx status is not an error here; it is returned in the response.
pub async fn fetch_url(
    client: &Client,
    ctx: &UrlContext,
    user_agent: &str,
    is_head: bool,
) -> Result<Response, FetchError> {
    let method = if is_head { Method::HEAD } else { Method::GET };

    let response = client
        .request(method, ctx.url().clone())
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await?;

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = if is_head {
        Vec::new()
    } else {
        response
            .bytes()
            .await
            .map_err(FetchError::ReadBody)?
            .to_vec()
    };

    Ok(Response {
        url: ctx.url().clone(),
        status,
        headers,
        body,
    })
}
