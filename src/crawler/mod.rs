//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The coordinator that owns the crawl state and decides termination
//! - One sequential worker per host, fed through a stacking mailbox
//! - HTTP fetching and HTML link extraction
//! - The [`Extender`] hooks through which callers customize a crawl

mod coordinator;
mod extender;
mod fetcher;
mod host_queue;
mod parser;
mod worker;

pub use coordinator::{Crawler, InterruptHandle};
pub use extender::{DefaultExtender, DelayInfo, EndReason, Enqueuer, Extender, FetchInfo};
pub use fetcher::{build_http_client, fetch_url, FetchError, Response};
pub use host_queue::HostQueue;
pub use parser::{extract_links, parse_html, ExtractedLinks};
