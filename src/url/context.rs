//! URL contexts and link sets
//!
//! A [`UrlContext`] is the unit of work that flows from the crawler to a host
//! worker and back. It keeps the raw URL (what gets fetched), its normalized
//! form (what gets deduplicated and assigned to a host), the page it was
//! found on, and opaque caller state.

use crate::url::domain::extract_host;
use crate::url::normalize::{normalize_url, NormalizationFlags};
use crate::UrlError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Opaque per-URL state attached by seeds or harvested links
pub type UrlState = Arc<dyn Any + Send + Sync>;

/// Path of the robots.txt file on every host
pub const ROBOTS_PATH: &str = "/robots.txt";

/// One URL to process, with its provenance
#[derive(Clone)]
pub struct UrlContext {
    /// Issue a HEAD request before the GET for this URL
    pub head_before_get: bool,

    /// Crawl delay to use for this URL's fetch, overriding every other source
    pub crawl_delay: Option<Duration>,

    /// Caller state, carried unchanged across redirects
    pub state: Option<UrlState>,

    url: Url,
    normalized_url: Url,
    source_url: Option<Url>,
    normalized_source_url: Option<Url>,
    is_robots: bool,
}

impl UrlContext {
    /// Creates a context for an already parsed URL
    ///
    /// The normalized forms of `url` and `source` are computed immediately.
    pub fn new(
        url: Url,
        source: Option<&Url>,
        flags: &NormalizationFlags,
    ) -> Result<Self, UrlError> {
        let normalized_url = normalize_url(&url, flags)?;
        let (source_url, normalized_source_url) = match source {
            Some(src) => (Some(src.clone()), Some(normalize_url(src, flags)?)),
            None => (None, None),
        };

        Ok(Self {
            head_before_get: false,
            crawl_delay: None,
            state: None,
            url,
            normalized_url,
            source_url,
            normalized_source_url,
            is_robots: false,
        })
    }

    /// Creates a context from a link string, resolving it against `source`
    ///
    /// Without a source the string must be an absolute URL.
    pub fn parse(
        link: &str,
        source: Option<&Url>,
        flags: &NormalizationFlags,
    ) -> Result<Self, UrlError> {
        let link = link.trim();
        let url = match source {
            Some(src) => src.join(link),
            None => Url::parse(link),
        }
        .map_err(|e| UrlError::Parse(format!("{}: {}", link, e)))?;

        Self::new(url, source, flags)
    }

    /// The raw URL, as it will be fetched
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalized URL, used for deduplication and host assignment
    pub fn normalized_url(&self) -> &Url {
        &self.normalized_url
    }

    /// The page this URL was found on, `None` for seeds
    pub fn source_url(&self) -> Option<&Url> {
        self.source_url.as_ref()
    }

    pub fn normalized_source_url(&self) -> Option<&Url> {
        self.normalized_source_url.as_ref()
    }

    /// Whether this is the synthetic robots.txt request of a host worker
    pub fn is_robots_url(&self) -> bool {
        self.is_robots
    }

    /// Host key of the normalized URL (`host[:port]`)
    pub fn host(&self) -> Option<String> {
        extract_host(&self.normalized_url)
    }

    /// Seeds have no source and always count as same-host
    pub fn same_host_as_source(&self) -> bool {
        match &self.normalized_source_url {
            Some(src) => extract_host(src) == extract_host(&self.normalized_url),
            None => true,
        }
    }

    /// Derives the context of a redirect target
    ///
    /// The source of the new context is the source of this one, so a chain of
    /// redirects keeps pointing at the page that originally linked to it. A
    /// seed has no source, so its own URL becomes the source. A robots.txt
    /// context stays a robots.txt context.
    pub fn clone_for_redirect(
        &self,
        target: Url,
        flags: &NormalizationFlags,
    ) -> Result<Self, UrlError> {
        let source = self.source_url.as_ref().unwrap_or(&self.url);
        let mut ctx = Self::new(target, Some(source), flags)?;
        ctx.head_before_get = self.head_before_get;
        ctx.crawl_delay = self.crawl_delay;
        ctx.state = self.state.clone();
        ctx.is_robots = self.is_robots;
        Ok(ctx)
    }

    /// Derives the robots.txt context for this URL's host
    pub fn robots_context(&self, flags: &NormalizationFlags) -> Result<Self, UrlError> {
        let mut robots_url = self.normalized_url.clone();
        robots_url.set_path(ROBOTS_PATH);
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        let mut ctx = Self::new(robots_url, Some(&self.url), flags)?;
        ctx.is_robots = true;
        Ok(ctx)
    }

    /// Path and query of the raw URL, as matched by robots.txt rules
    pub fn robots_path(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

impl fmt::Debug for UrlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlContext")
            .field("url", &self.url.as_str())
            .field("normalized_url", &self.normalized_url.as_str())
            .field("source_url", &self.source_url.as_ref().map(Url::as_str))
            .field("head_before_get", &self.head_before_get)
            .field("crawl_delay", &self.crawl_delay)
            .field("has_state", &self.state.is_some())
            .field("is_robots", &self.is_robots)
            .finish()
    }
}

/// A set of links: seeds, harvested links or externally enqueued URLs
///
/// Relative links are resolved against the page they were harvested from.
#[derive(Clone)]
pub enum Links {
    Single(String),
    Many(Vec<String>),
    /// Each link with the state to attach to its future context
    Keyed(Vec<(String, Option<UrlState>)>),
}

impl Links {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(links) => links.len(),
            Self::Keyed(links) => links.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens into `(link, state)` pairs
    pub fn into_pairs(self) -> Vec<(String, Option<UrlState>)> {
        match self {
            Self::Single(link) => vec![(link, None)],
            Self::Many(links) => links.into_iter().map(|l| (l, None)).collect(),
            Self::Keyed(links) => links,
        }
    }

    /// Iterates over the link strings
    pub fn iter(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Single(link) => Box::new(std::iter::once(link.as_str())),
            Self::Many(links) => Box::new(links.iter().map(String::as_str)),
            Self::Keyed(links) => Box::new(links.iter().map(|(l, _)| l.as_str())),
        }
    }
}

impl fmt::Debug for Links {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl From<&str> for Links {
    fn from(link: &str) -> Self {
        Self::Single(link.to_string())
    }
}

impl From<String> for Links {
    fn from(link: String) -> Self {
        Self::Single(link)
    }
}

impl From<Url> for Links {
    fn from(url: Url) -> Self {
        Self::Single(url.into())
    }
}

impl From<Vec<String>> for Links {
    fn from(links: Vec<String>) -> Self {
        Self::Many(links)
    }
}

impl From<Vec<&str>> for Links {
    fn from(links: Vec<&str>) -> Self {
        Self::Many(links.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Url>> for Links {
    fn from(urls: Vec<Url>) -> Self {
        Self::Many(urls.into_iter().map(String::from).collect())
    }
}

impl From<Vec<(String, Option<UrlState>)>> for Links {
    fn from(links: Vec<(String, Option<UrlState>)>) -> Self {
        Self::Keyed(links)
    }
}
