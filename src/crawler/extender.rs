//! The extension surface of the crawler
//!
//! Every hook of [`Extender`] has a default, so an implementation only
//! overrides what it needs. [`DefaultExtender`] overrides nothing but the
//! HTTP client, which it builds from the crawler options.

use crate::config::{LogCategory, DEFAULT_USER_AGENT};
use crate::crawler::fetcher::{build_http_client, fetch_url, FetchError, Response};
use crate::url::{Links, UrlContext};
use crate::CrawlError;
use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc;

/// Why a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No work left anywhere
    Done,
    /// The visit budget was reached
    MaxVisitsReached,
    /// The run was interrupted through an [`InterruptHandle`](crate::crawler::InterruptHandle)
    Interrupted,
    /// A worker task was aborted
    Error,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Done => "done",
            Self::MaxVisitsReached => "max visits reached",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Inputs of a crawl delay computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayInfo {
    /// Delay from the crawler options
    pub opts_delay: Duration,
    /// `Crawl-delay` from the host's robots.txt
    pub robots_delay: Option<Duration>,
    /// Delay used before the previous fetch of this host
    pub last_delay: Duration,
}

/// What happened on the previous fetch of a host
#[derive(Debug, Clone)]
pub struct FetchInfo {
    pub ctx: UrlContext,
    pub duration: Duration,
    pub status_code: u16,
    pub is_head_request: bool,
}

/// Handle for adding URLs to a running crawl from outside the harvest flow
///
/// Enqueued links have no source; relative links are rejected.
#[derive(Debug, Clone)]
pub struct Enqueuer {
    tx: mpsc::UnboundedSender<Links>,
}

impl Enqueuer {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Links>) -> Self {
        Self { tx }
    }

    /// Sends links to the crawler
    ///
    /// Returns `false` once the crawl has ended.
    pub fn enqueue(&self, links: impl Into<Links>) -> bool {
        self.tx.send(links.into()).is_ok()
    }
}

static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();

fn default_client() -> Result<&'static Client, FetchError> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = build_http_client(DEFAULT_USER_AGENT)?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// Capabilities the crawler calls into while it runs
///
/// Hooks are called from the crawler task and from host worker tasks, so an
/// implementation must be `Send + Sync`. Hooks of a single host are never
/// called concurrently with each other; hooks of different hosts may be.
#[async_trait]
pub trait Extender: Send + Sync + 'static {
    /// Called once before crawling; may rewrite the seeds
    fn start(&self, seeds: Links, _enqueuer: Enqueuer) -> Links {
        seeds
    }

    /// Called once after every worker has stopped
    fn end(&self, _reason: &EndReason) {}

    /// Called for every per-URL error
    fn error(&self, _err: &CrawlError) {}

    /// Receives engine messages of the enabled log categories
    fn log(&self, category: LogCategory, message: &str) {
        match category {
            LogCategory::Error => tracing::error!("{}", message),
            LogCategory::Info => tracing::info!("{}", message),
            LogCategory::Enqueued | LogCategory::Ignored => tracing::debug!("{}", message),
            LogCategory::Trace => tracing::trace!("{}", message),
        }
    }

    /// Computes the delay to wait after the next fetch of `host`
    ///
    /// The default honors robots.txt `Crawl-delay` over the configured delay.
    fn compute_delay(
        &self,
        _host: &str,
        info: &DelayInfo,
        _last_fetch: Option<&FetchInfo>,
    ) -> Duration {
        info.robots_delay.unwrap_or(info.opts_delay)
    }

    /// Fetches the raw URL of a context
    ///
    /// Redirects must not be followed; a 3xx response is returned as is.
    async fn fetch(
        &self,
        ctx: &UrlContext,
        user_agent: &str,
        is_head: bool,
    ) -> Result<Response, FetchError> {
        fetch_url(default_client()?, ctx, user_agent, is_head).await
    }

    /// Decides whether the GET follows a HEAD request
    fn request_get(&self, _ctx: &UrlContext, head_response: &Response) -> bool {
        head_response.is_success()
    }

    /// Supplies robots.txt content without fetching it
    ///
    /// Returns the content to use and whether the robots.txt should still be
    /// requested. When no request is made the returned content (if any) is
    /// parsed instead.
    fn request_robots(&self, _ctx: &UrlContext, _robot_agent: &str) -> (Option<String>, bool) {
        (None, true)
    }

    /// Called with every fetched robots.txt response
    fn fetched_robots(&self, _ctx: &UrlContext, _response: &Response) {}

    /// Decides whether a URL is crawled; may also adjust the context
    fn filter(&self, _ctx: &mut UrlContext, is_visited: bool) -> bool {
        !is_visited
    }

    /// Called for every URL pushed to a host worker
    fn enqueued(&self, _ctx: &UrlContext) {}

    /// Called for every successfully fetched page
    ///
    /// Returns links to harvest and whether the default link extraction
    /// should run instead.
    fn visit(
        &self,
        _ctx: &UrlContext,
        _response: &Response,
        _document: Option<&Html>,
    ) -> (Option<Links>, bool) {
        (None, true)
    }

    /// Called after a page has been visited, with its harvested links
    fn visited(&self, _ctx: &UrlContext, _harvested: Option<&Links>) {}

    /// Called for every URL blocked by robots.txt
    fn disallowed(&self, _ctx: &UrlContext) {}
}

/// Extender using one HTTP client for all hosts
#[derive(Debug, Clone)]
pub struct DefaultExtender {
    client: Client,
}

impl DefaultExtender {
    /// Uses a caller-built client, e.g. one with a proxy
    ///
    /// The client should not follow redirects itself, or redirect targets
    /// bypass filtering and deduplication.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds an extender whose client sends `user_agent`
    pub fn with_user_agent(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent)?))
    }
}

#[async_trait]
impl Extender for DefaultExtender {
    async fn fetch(
        &self,
        ctx: &UrlContext,
        user_agent: &str,
        is_head: bool,
    ) -> Result<Response, FetchError> {
        fetch_url(&self.client, ctx, user_agent, is_head).await
    }
}
