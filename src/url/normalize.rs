use crate::UrlError;
use serde::Deserialize;
use url::Url;

/// List of tracking query parameters removed when `remove_tracking_params` is set
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Which normalization steps to apply to a URL
///
/// Two URLs that normalize to the same string are treated as the same page
/// for deduplication and host assignment. The raw URL is still the one that
/// gets fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NormalizationFlags {
    /// Lowercase the host
    pub lowercase_host: bool,

    /// Strip a leading `www.` from the host
    pub remove_www: bool,

    /// Drop everything after `#`
    pub remove_fragment: bool,

    /// Collapse `//` into `/` and resolve `.` and `..` segments
    pub remove_duplicate_slashes: bool,

    /// Remove a trailing slash from non-root paths
    pub remove_trailing_slash: bool,

    /// Drop `utm_*` and other tracking parameters
    pub remove_tracking_params: bool,

    /// Sort query parameters by key
    pub sort_query: bool,

    /// Remove an empty `?`
    pub remove_empty_query: bool,
}

impl Default for NormalizationFlags {
    fn default() -> Self {
        Self::greedy()
    }
}

impl NormalizationFlags {
    /// No normalization at all
    pub fn none() -> Self {
        Self {
            lowercase_host: false,
            remove_www: false,
            remove_fragment: false,
            remove_duplicate_slashes: false,
            remove_trailing_slash: false,
            remove_tracking_params: false,
            sort_query: false,
            remove_empty_query: false,
        }
    }

    /// Only steps that can never change which resource is addressed
    pub fn safe() -> Self {
        Self {
            lowercase_host: true,
            remove_empty_query: true,
            ..Self::none()
        }
    }

    /// Every step
    pub fn greedy() -> Self {
        Self {
            lowercase_host: true,
            remove_www: true,
            remove_fragment: true,
            remove_duplicate_slashes: true,
            remove_trailing_slash: true,
            remove_tracking_params: true,
            sort_query: true,
            remove_empty_query: true,
        }
    }
}

/// Normalizes a URL according to the given flags
///
/// URLs without a host (e.g. `mailto:`) only get the fragment and query steps;
/// rejecting them is left to the crawler's admission policy.
///
/// # Examples
///
/// ```
/// use sumi_crawl::url::{normalize_url, NormalizationFlags};
/// use url::Url;
///
/// let raw = Url::parse("http://WWW.EXAMPLE.COM/page/?b=2&a=1#top").unwrap();
/// let url = normalize_url(&raw, &NormalizationFlags::greedy()).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(raw: &Url, flags: &NormalizationFlags) -> Result<Url, UrlError> {
    let mut url = raw.clone();

    if let Some(host) = url.host_str() {
        let mut normalized_host = if flags.lowercase_host {
            host.to_lowercase()
        } else {
            host.to_string()
        };

        if flags.remove_www {
            if let Some(stripped) = normalized_host.strip_prefix("www.") {
                normalized_host = stripped.to_string();
            }
        }

        if normalized_host != host {
            url.set_host(Some(&normalized_host))
                .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
        }
    }

    if !url.cannot_be_a_base() {
        let normalized_path = normalize_path(url.path(), flags);
        url.set_path(&normalized_path);
    }

    if flags.remove_fragment {
        url.set_fragment(None);
    }

    if let Some(query) = url.query() {
        if query.is_empty() {
            if flags.remove_empty_query {
                url.set_query(None);
            }
        } else if flags.remove_tracking_params || flags.sort_query {
            let params = filter_and_sort_query_params(&url, flags);

            if params.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(params);
            }
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments, duplicate and trailing slashes
fn normalize_path(path: &str, flags: &NormalizationFlags) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized = if flags.remove_duplicate_slashes {
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    segments.pop();
                }
                _ => segments.push(segment),
            }
        }

        let mut joined = format!("/{}", segments.join("/"));
        if path.ends_with('/') && joined != "/" {
            joined.push('/');
        }
        joined
    } else {
        path.to_string()
    };

    if flags.remove_trailing_slash {
        while normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }
    }

    normalized
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url, flags: &NormalizationFlags) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !(flags.remove_tracking_params && is_tracking_param(key)))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if flags.sort_query {
        params.sort();
    }

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
