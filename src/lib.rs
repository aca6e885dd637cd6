//! Sumi-Crawl: a polite, extensible crawl engine
//!
//! This crate implements a web crawler engine that partitions discovered URLs
//! across one sequential worker per host, respects robots.txt and crawl delays,
//! deduplicates visited URLs, and terminates when no work remains anywhere or
//! a visit budget is exhausted. Behavior is customized through the
//! [`Extender`](crawler::Extender) trait.

pub mod config;
pub mod crawler;
pub mod robots;
pub mod url;

use std::fmt;
use thiserror::Error;

/// Fatal errors for a crawl run
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// The stage of URL processing at which a [`CrawlError`] occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlErrorKind {
    /// A seed could not be turned into a URL
    Seed,
    /// The fetch capability failed
    Fetch,
    /// robots.txt could not be obtained or parsed
    ParseRobots,
    /// Non-2xx, non-redirect status
    HttpStatus,
    /// The response body could not be read
    ReadBody,
    /// The response body could not be parsed as a document
    ParseBody,
    /// A harvested or enqueued link could not be parsed
    ParseUrl,
    /// Link extraction was requested without a document
    ProcessLinks,
    /// The Location header of a redirect could not be resolved
    ParseRedirectUrl,
}

impl fmt::Display for CrawlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Seed => "seed",
            Self::Fetch => "fetch",
            Self::ParseRobots => "parse robots",
            Self::HttpStatus => "http status",
            Self::ReadBody => "read body",
            Self::ParseBody => "parse body",
            Self::ParseUrl => "parse url",
            Self::ProcessLinks => "process links",
            Self::ParseRedirectUrl => "parse redirect url",
        };
        f.write_str(label)
    }
}

/// A per-URL error
///
/// These never abort the crawl. They are delivered to
/// [`Extender::error`](crawler::Extender::error) and the URL is treated as
/// not visited.
#[derive(Debug, Clone, Error)]
#[error("{kind} error for {}: {message}", display_url(.url))]
pub struct CrawlError {
    /// The URL being processed, if one could be determined
    pub url: Option<::url::Url>,

    /// Where in the pipeline the error happened
    pub kind: CrawlErrorKind,

    /// Human readable description
    pub message: String,
}

fn display_url(url: &Option<::url::Url>) -> &str {
    url.as_ref().map(|u| u.as_str()).unwrap_or("<none>")
}

impl CrawlError {
    pub fn new(url: Option<&::url::Url>, kind: CrawlErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.cloned(),
            kind,
            message: message.into(),
        }
    }
}

// Re-export commonly used types
pub use config::{CrawlerOptions, LogCategory, LogFlags};
pub use crawler::{
    Crawler, DefaultExtender, EndReason, Enqueuer, Extender, FetchError, InterruptHandle, Response,
};
pub use crate::url::{Links, NormalizationFlags, UrlContext, UrlState};
