use crate::url::NormalizationFlags;
use serde::Deserialize;
use std::time::Duration;

/// Default user agent sent with every real fetch
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; rv:15.0) sumi-crawl/0.1 Firefox/15.0";

/// Default token used to pick the robots.txt group
pub const DEFAULT_ROBOT_USER_AGENT: &str = "sumi-crawl";

/// Crawler options
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerOptions {
    /// User agent sent with real fetches (pages and robots.txt)
    pub user_agent: String,

    /// Agent token used only to interpret robots.txt rules
    pub robot_user_agent: String,

    /// Maximum number of visited pages, 0 means unlimited
    pub max_visits: usize,

    /// Default delay between two fetches to the same host (milliseconds)
    pub crawl_delay_ms: u64,

    /// Idle time after which a host worker stops itself (milliseconds)
    pub worker_idle_ttl_ms: u64,

    /// Only follow links whose host matches the source page's host
    pub same_host_only: bool,

    /// Issue a HEAD request before each GET
    pub head_before_get: bool,

    /// Capacity of the worker-to-crawler result channel
    pub result_buffer: usize,

    /// URL normalization applied to every context
    pub normalization: NormalizationFlags,

    /// Engine message categories forwarded to the extender's log hook
    pub log: LogFlags,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robot_user_agent: DEFAULT_ROBOT_USER_AGENT.to_string(),
            max_visits: 0,
            crawl_delay_ms: 5_000,
            worker_idle_ttl_ms: 10_000,
            same_host_only: true,
            head_before_get: false,
            result_buffer: 100,
            normalization: NormalizationFlags::default(),
            log: LogFlags::default(),
        }
    }
}

impl CrawlerOptions {
    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }

    pub fn worker_idle_ttl(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ttl_ms)
    }

    /// Returns the visit budget, if any
    pub fn visit_budget(&self) -> Option<usize> {
        (self.max_visits > 0).then_some(self.max_visits)
    }
}

/// Categories of engine messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Per-URL failures
    Error,
    /// Lifecycle messages (start, end, worker launch)
    Info,
    /// Every admitted URL
    Enqueued,
    /// Every discarded URL with the reason
    Ignored,
    /// Fine-grained worker steps
    Trace,
}

/// Which [`LogCategory`] messages reach the extender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogFlags {
    pub error: bool,
    pub info: bool,
    pub enqueued: bool,
    pub ignored: bool,
    pub trace: bool,
}

impl Default for LogFlags {
    fn default() -> Self {
        Self {
            error: true,
            info: true,
            enqueued: false,
            ignored: false,
            trace: false,
        }
    }
}

impl LogFlags {
    /// Every category enabled
    pub fn all() -> Self {
        Self {
            error: true,
            info: true,
            enqueued: true,
            ignored: true,
            trace: true,
        }
    }

    /// Every category disabled
    pub fn none() -> Self {
        Self {
            error: false,
            info: false,
            enqueued: false,
            ignored: false,
            trace: false,
        }
    }

    pub fn enabled(&self, category: LogCategory) -> bool {
        match category {
            LogCategory::Error => self.error,
            LogCategory::Info => self.info,
            LogCategory::Enqueued => self.enqueued,
            LogCategory::Ignored => self.ignored,
            LogCategory::Trace => self.trace,
        }
    }
}
