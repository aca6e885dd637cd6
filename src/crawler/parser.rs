//! HTML link extraction
//!
//! This is the default harvesting step run on every visited HTML page when
//! the extender asks for link extraction:
//! - Links come from `<a href="...">` tags
//! - A `<base href="...">` tag changes the URL links are resolved against
//! - Fragment-only links (same page anchors) are skipped
//! - Links that cannot be resolved are returned separately so they can be logged

use scraper::{Html, Selector};
use url::Url;

/// Links harvested from one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedLinks {
    /// Absolute URLs, in document order
    pub links: Vec<String>,

    /// `(href, reason)` for every href that could not be resolved
    pub unparsable: Vec<(String, String)>,
}

/// Parses an HTML string into a document
///
/// `Html` is not `Send`, so a document must be created and dropped without
/// crossing an await point.
pub fn parse_html(html: &str) -> Html {
    Html::parse_document(html)
}

/// Extracts all links of a document, resolved to absolute URLs
///
/// # Arguments
///
/// * `document` - The parsed HTML document
/// * `page_url` - The URL the document was fetched from
///
/// # Example
///
/// ```
/// use sumi_crawl::crawler::{extract_links, parse_html};
/// use url::Url;
///
/// let html = r#"<html><head><base href="/docs/"></head><body><a href="intro">Intro</a></body></html>"#;
/// let page = Url::parse("https://example.com/index.html").unwrap();
/// let extracted = extract_links(&parse_html(html), &page);
/// assert_eq!(extracted.links, vec!["https://example.com/docs/intro"]);
/// ```
pub fn extract_links(document: &Html, page_url: &Url) -> ExtractedLinks {
    let base_url = effective_base(document, page_url);
    let mut extracted = ExtractedLinks::default();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return extracted;
    };

    for element in document.select(&a_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        match resolve_link(href, &base_url) {
            Ok(Some(url)) => extracted.links.push(url.into()),
            Ok(None) => {}
            Err(reason) => extracted.unparsable.push((href.to_string(), reason)),
        }
    }

    extracted
}

/// Determines the URL links are resolved against
///
/// An absolute `<base href>` replaces the page URL, a protocol-relative one
/// inherits the page scheme, an absolute path replaces the path only, and a
/// relative one resolves against the page URL. An unusable base tag leaves
/// the page URL in place.
fn effective_base(document: &Html, page_url: &Url) -> Url {
    let Ok(base_selector) = Selector::parse("base[href]") else {
        return page_url.clone();
    };

    document
        .select(&base_selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// Resolves a link href against the base URL
///
/// Returns `Ok(None)` for links that are skipped on purpose (empty or
/// fragment-only) and `Err` with the parse failure for broken links.
fn resolve_link(href: &str, base_url: &Url) -> Result<Option<Url>, String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return Ok(None);
    }

    base_url.join(href).map(Some).map_err(|e| e.to_string())
}
