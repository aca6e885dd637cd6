use url::Url;

/// Extracts the host key used to assign a URL to a worker
///
/// The key is the lowercase host, followed by `:port` when the URL carries a
/// non-default port, so two servers on the same machine get separate workers
/// and separate politeness.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawl::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_host(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
