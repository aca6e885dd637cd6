//! URL handling module for Sumi-Crawl
//!
//! This module provides URL normalization, host extraction, URL contexts and
//! the link sets exchanged between the crawler and its extender.

mod context;
mod domain;
mod normalize;

// Re-export main types and functions
pub use context::{Links, UrlContext, UrlState, ROBOTS_PATH};
pub use domain::extract_host;
pub use normalize::{normalize_url, NormalizationFlags};

use crate::UrlError;
use url::Url;

/// Checks the structural admission rules every crawled URL must pass
///
/// A URL must be absolute with a host, and its scheme must start with `http`.
/// Returns the reason for rejection, if any.
pub fn structural_rejection(url: &Url) -> Option<UrlError> {
    if url.cannot_be_a_base() || !url.has_host() {
        return Some(UrlError::MissingDomain);
    }

    if !url.scheme().starts_with("http") {
        return Some(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    None
}
