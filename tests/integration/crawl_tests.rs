//! Integration tests for the crawler
//!
//! These tests drive full crawl runs, either against wiremock servers or
//! against an in-memory site served by a custom `fetch` hook.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_crawl::crawler::{build_http_client, Enqueuer};
use sumi_crawl::{
    CrawlError, CrawlErrorKind, Crawler, CrawlerOptions, DefaultExtender, EndReason, Extender,
    FetchError, Links, LogFlags, Response, UrlContext,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One resource of an in-memory site
#[derive(Clone)]
enum Page {
    Html(String),
    /// HTML bytes declared as ISO-8859-1
    Latin1(Vec<u8>),
    Redirect(u16, String),
    Status(u16),
}

/// Records every hook call of a crawl run
struct Recorder {
    http: DefaultExtender,
    site: Option<HashMap<String, Page>>,
    extra_on_first_visit: Option<String>,
    enqueuer: Mutex<Option<Enqueuer>>,
    filtered: Mutex<Vec<String>>,
    visited: Mutex<Vec<(String, Option<String>)>>,
    disallowed: Mutex<Vec<String>>,
    fetches: Mutex<Vec<(String, bool, Instant)>>,
    errors: Mutex<Vec<CrawlErrorKind>>,
    ended: Mutex<Option<EndReason>>,
}

impl Recorder {
    fn http() -> Self {
        Self {
            http: DefaultExtender::new(build_http_client("TestBot/1.0").unwrap()),
            site: None,
            extra_on_first_visit: None,
            enqueuer: Mutex::new(None),
            filtered: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
            disallowed: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            ended: Mutex::new(None),
        }
    }

    fn in_memory(pages: Vec<(&str, Page)>) -> Self {
        let site = pages
            .into_iter()
            .map(|(url, page)| (url.to_string(), page))
            .collect();
        Self {
            site: Some(site),
            ..Self::http()
        }
    }

    fn visited_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .visited
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    fn filtered_count(&self, url: &str) -> usize {
        self.filtered
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    fn serve(&self, site: &HashMap<String, Page>, ctx: &UrlContext) -> Response {
        let url = ctx.url().clone();
        match site.get(url.as_str()) {
            Some(Page::Html(body)) => {
                let mut res = Response::new(url, 200, body.clone());
                res.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
                res
            }
            Some(Page::Latin1(body)) => {
                let mut res = Response::new(url, 200, body.clone());
                res.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=iso-8859-1"),
                );
                res
            }
            Some(Page::Redirect(status, target)) => {
                let mut res = Response::new(url, *status, "");
                res.headers
                    .insert(LOCATION, HeaderValue::from_str(target).unwrap());
                res
            }
            Some(Page::Status(status)) => Response::new(url, *status, ""),
            None => Response::new(url, 404, ""),
        }
    }
}

#[async_trait]
impl Extender for Recorder {
    fn start(&self, seeds: Links, enqueuer: Enqueuer) -> Links {
        *self.enqueuer.lock().unwrap() = Some(enqueuer);
        seeds
    }

    fn end(&self, reason: &EndReason) {
        *self.ended.lock().unwrap() = Some(*reason);
    }

    fn error(&self, err: &CrawlError) {
        self.errors.lock().unwrap().push(err.kind);
    }

    async fn fetch(
        &self,
        ctx: &UrlContext,
        user_agent: &str,
        is_head: bool,
    ) -> Result<Response, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((ctx.url().to_string(), is_head, Instant::now()));

        match &self.site {
            Some(site) => Ok(self.serve(site, ctx)),
            None => self.http.fetch(ctx, user_agent, is_head).await,
        }
    }

    fn filter(&self, ctx: &mut UrlContext, is_visited: bool) -> bool {
        self.filtered.lock().unwrap().push(ctx.url().to_string());
        !is_visited
    }

    fn visited(&self, ctx: &UrlContext, _harvested: Option<&Links>) {
        let first = {
            let mut visited = self.visited.lock().unwrap();
            visited.push((
                ctx.url().to_string(),
                ctx.source_url().map(|u| u.to_string()),
            ));
            visited.len() == 1
        };

        if first {
            if let (Some(extra), Some(enqueuer)) =
                (&self.extra_on_first_visit, &*self.enqueuer.lock().unwrap())
            {
                enqueuer.enqueue(extra.as_str());
            }
        }
    }

    fn disallowed(&self, ctx: &UrlContext) {
        self.disallowed.lock().unwrap().push(ctx.url().to_string());
    }
}

fn test_options() -> CrawlerOptions {
    CrawlerOptions {
        user_agent: "TestBot/1.0".to_string(),
        robot_user_agent: "TestBot".to_string(),
        crawl_delay_ms: 0,
        worker_idle_ttl_ms: 1_000,
        log: LogFlags::none(),
        ..CrawlerOptions::default()
    }
}

async fn crawl(
    recorder: Arc<Recorder>,
    options: CrawlerOptions,
    seeds: impl Into<Links>,
) -> EndReason {
    let crawler = Crawler::new(options, recorder).unwrap();
    tokio::time::timeout(Duration::from_secs(20), crawler.run(seeds))
        .await
        .expect("crawl did not terminate")
}

fn html(links: &[&str]) -> Page {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">link</a>"#, l))
        .collect();
    Page::Html(format!("<html><body>{}</body></html>", anchors))
}

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_html(
        &mock_server,
        "/",
        format!(
            r#"<html><body><a href="{}/page1">Page 1</a><a href="/page2">Page 2</a></body></html>"#,
            base_url
        ),
    )
    .await;
    mount_html(
        &mock_server,
        "/page1",
        r#"<html><body><a href="/">Home</a><a href="/missing">Gone</a></body></html>"#.to_string(),
    )
    .await;
    mount_html(
        &mock_server,
        "/page2",
        r#"<html><body><a href="page1">Page 1</a></body></html>"#.to_string(),
    )
    .await;

    let recorder = Arc::new(Recorder::http());
    let reason = crawl(recorder.clone(), test_options(), format!("{}/", base_url)).await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(*recorder.ended.lock().unwrap(), Some(EndReason::Done));
    assert_eq!(
        recorder.visited_urls(),
        vec![
            format!("{}/", base_url),
            format!("{}/page1", base_url),
            format!("{}/page2", base_url),
        ]
    );
    assert_eq!(
        recorder.errors.lock().unwrap().clone(),
        vec![CrawlErrorKind::HttpStatus]
    );
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /page2.html"),
        )
        .mount(&mock_server)
        .await;

    mount_html(
        &mock_server,
        "/",
        r#"<html><body><a href="/page1.html">1</a><a href="/page2.html">2</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_html(&mock_server, "/page1.html", "<html></html>".to_string()).await;

    // Disallowed page must never be requested
    Mock::given(method("GET"))
        .and(path("/page2.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let recorder = Arc::new(Recorder::http());
    let reason = crawl(recorder.clone(), test_options(), format!("{}/", base_url)).await;

    let page2 = format!("{}/page2.html", base_url);
    assert_eq!(reason, EndReason::Done);
    assert_eq!(recorder.filtered_count(&page2), 1);
    assert_eq!(*recorder.disallowed.lock().unwrap(), vec![page2]);
    assert_eq!(
        recorder.visited_urls(),
        vec![format!("{}/", base_url), format!("{}/page1.html", base_url)]
    );
}

#[tokio::test]
async fn test_head_before_get() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&mock_server)
        .await;
    mount_html(
        &mock_server,
        "/",
        r#"<html><body><a href="/private">P</a></body></html>"#.to_string(),
    )
    .await;

    Mock::given(method("HEAD"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let options = CrawlerOptions {
        head_before_get: true,
        ..test_options()
    };
    let recorder = Arc::new(Recorder::http());
    let reason = crawl(recorder.clone(), options, format!("{}/", base_url)).await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(recorder.visited_urls(), vec![format!("{}/", base_url)]);

    let heads: Vec<String> = recorder
        .fetches
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, is_head, _)| *is_head)
        .map(|(url, _, _)| url.clone())
        .collect();
    assert_eq!(
        heads,
        vec![format!("{}/", base_url), format!("{}/private", base_url)]
    );
}

#[tokio::test]
async fn test_redirect_chain_collapses_to_one_visit() {
    let recorder = Arc::new(Recorder::in_memory(vec![
        ("http://site.test/p1", Page::Redirect(301, "/p2".to_string())),
        ("http://site.test/p2", Page::Redirect(302, "http://site.test/p3".to_string())),
        ("http://site.test/p3", html(&[])),
    ]));

    let reason = crawl(recorder.clone(), test_options(), "http://site.test/p1").await;

    assert_eq!(reason, EndReason::Done);
    let visited = recorder.visited.lock().unwrap().clone();
    assert_eq!(
        visited,
        vec![(
            "http://site.test/p3".to_string(),
            Some("http://site.test/p1".to_string())
        )]
    );
    assert_eq!(recorder.filtered.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_max_visits_stops_crawl() {
    let pages: Vec<(String, Page)> = (0..10)
        .map(|i| {
            let next = format!("/n{}", i + 1);
            (format!("http://chain.test/n{}", i), html(&[next.as_str()]))
        })
        .collect();
    let recorder = Arc::new(Recorder::in_memory(
        pages.iter().map(|(u, p)| (u.as_str(), p.clone())).collect(),
    ));

    let options = CrawlerOptions {
        max_visits: 3,
        crawl_delay_ms: 200,
        ..test_options()
    };
    let reason = crawl(recorder.clone(), options, "http://chain.test/n0").await;

    assert_eq!(reason, EndReason::MaxVisitsReached);
    assert_eq!(recorder.visited.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_crawl_delay_spaces_same_host_fetches() {
    let recorder = Arc::new(Recorder::in_memory(vec![
        ("http://slow.test/", html(&["/a", "/b", "/c"])),
        ("http://slow.test/a", html(&[])),
        ("http://slow.test/b", html(&[])),
        ("http://slow.test/c", html(&[])),
    ]));

    let options = CrawlerOptions {
        crawl_delay_ms: 100,
        ..test_options()
    };
    let reason = crawl(recorder.clone(), options, "http://slow.test/").await;
    assert_eq!(reason, EndReason::Done);

    let fetches = recorder.fetches.lock().unwrap().clone();
    assert_eq!(fetches.len(), 5);
    let span = fetches[4].2.duration_since(fetches[0].2);
    assert!(span >= Duration::from_millis(400), "fetches spanned {:?}", span);
}

#[tokio::test]
async fn test_cyclic_graph_terminates() {
    let recorder = Arc::new(Recorder::in_memory(vec![
        ("http://loop.test/a", html(&["/b", "/c"])),
        ("http://loop.test/b", html(&["/c", "/a"])),
        ("http://loop.test/c", html(&["/a", "/b", "/c"])),
    ]));

    let reason = crawl(recorder.clone(), test_options(), "http://loop.test/a").await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(
        recorder.visited_urls(),
        vec!["http://loop.test/a", "http://loop.test/b", "http://loop.test/c"]
    );
}

#[tokio::test]
async fn test_identical_runs_visit_identical_sets() {
    let site = || {
        Recorder::in_memory(vec![
            ("http://same.test/", html(&["/x", "/y", "http://other.test/"])),
            ("http://same.test/x", html(&["/y", "/z"])),
            ("http://same.test/y", html(&["/x"])),
            ("http://same.test/z", html(&["/"])),
        ])
    };

    let first = Arc::new(site());
    let second = Arc::new(site());
    crawl(first.clone(), test_options(), "http://same.test/").await;
    crawl(second.clone(), test_options(), "http://same.test/").await;

    assert_eq!(first.visited_urls().len(), 4);
    assert_eq!(first.visited_urls(), second.visited_urls());
}

#[tokio::test]
async fn test_same_host_only() {
    let pages = || {
        vec![
            ("http://a.test/", html(&["http://b.test/x"])),
            ("http://b.test/x", html(&[])),
        ]
    };

    let restricted = Arc::new(Recorder::in_memory(pages()));
    crawl(restricted.clone(), test_options(), "http://a.test/").await;
    assert_eq!(restricted.visited_urls(), vec!["http://a.test/"]);
    assert_eq!(restricted.filtered_count("http://b.test/x"), 1);

    let open = Arc::new(Recorder::in_memory(pages()));
    let options = CrawlerOptions {
        same_host_only: false,
        ..test_options()
    };
    crawl(open.clone(), options, "http://a.test/").await;
    assert_eq!(open.visited_urls(), vec!["http://a.test/", "http://b.test/x"]);
}

#[tokio::test]
async fn test_external_enqueuer_adds_work() {
    let mut recorder = Recorder::in_memory(vec![
        ("http://ext.test/", html(&[])),
        ("http://ext.test/hidden", html(&[])),
    ]);
    recorder.extra_on_first_visit = Some("http://ext.test/hidden".to_string());
    let recorder = Arc::new(recorder);

    let reason = crawl(recorder.clone(), test_options(), "http://ext.test/").await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(
        recorder.visited_urls(),
        vec!["http://ext.test/", "http://ext.test/hidden"]
    );
}

#[tokio::test]
async fn test_interrupt_ends_crawl() {
    let recorder = Arc::new(Recorder::in_memory(vec![
        ("http://int.test/", html(&["/1", "/2", "/3"])),
        ("http://int.test/1", html(&[])),
        ("http://int.test/2", html(&[])),
        ("http://int.test/3", html(&[])),
    ]));

    let options = CrawlerOptions {
        crawl_delay_ms: 5_000,
        ..test_options()
    };
    let crawler = Arc::new(Crawler::new(options, recorder.clone()).unwrap());
    let handle = crawler.interrupt_handle();

    let started = Instant::now();
    let running = {
        let crawler = Arc::clone(&crawler);
        tokio::spawn(async move { crawler.run("http://int.test/").await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.interrupt();

    let reason = tokio::time::timeout(Duration::from_secs(3), running)
        .await
        .expect("interrupted crawl did not stop")
        .unwrap();

    assert_eq!(reason, EndReason::Interrupted);
    assert_eq!(*recorder.ended.lock().unwrap(), Some(EndReason::Interrupted));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(recorder.visited.lock().unwrap().len() <= 1);
}

#[tokio::test]
async fn test_invalid_seed_is_reported() {
    let recorder = Arc::new(Recorder::in_memory(vec![
        ("http://ok.test/robots.txt", Page::Status(503)),
        ("http://ok.test/", html(&[])),
    ]));

    let seeds = Links::from(vec!["not a url", "http://ok.test/"]);
    let reason = crawl(recorder.clone(), test_options(), seeds).await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(recorder.errors.lock().unwrap().clone(), vec![CrawlErrorKind::Seed]);
    assert_eq!(recorder.visited_urls(), vec!["http://ok.test/"]);
}

#[tokio::test]
async fn test_no_admissible_seed_ends_immediately() {
    let recorder = Arc::new(Recorder::in_memory(Vec::new()));

    let reason = crawl(recorder.clone(), test_options(), "ftp://files.test/").await;

    assert_eq!(reason, EndReason::Done);
    assert!(recorder.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_redirected_robots_txt_is_honored() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", "/real-robots.txt"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/real-robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /secret"))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(
        &mock_server,
        "/",
        r#"<html><body><a href="/secret">Secret</a></body></html>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let recorder = Arc::new(Recorder::http());
    let reason = crawl(recorder.clone(), test_options(), format!("{}/", base_url)).await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(recorder.visited_urls(), vec![format!("{}/", base_url)]);
    assert_eq!(
        *recorder.disallowed.lock().unwrap(),
        vec![format!("{}/secret", base_url)]
    );
    assert!(recorder.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_latin1_page_still_yields_links() {
    let mut body = b"<html><body><p>caf".to_vec();
    body.push(0xE9);
    body.extend_from_slice(br#"</p><a href="/next">next</a></body></html>"#);

    let recorder = Arc::new(Recorder::in_memory(vec![
        ("http://latin.test/", Page::Latin1(body)),
        ("http://latin.test/next", html(&[])),
    ]));
    let reason = crawl(recorder.clone(), test_options(), "http://latin.test/").await;

    assert_eq!(reason, EndReason::Done);
    assert_eq!(
        recorder.visited_urls(),
        vec!["http://latin.test/", "http://latin.test/next"]
    );
    assert!(recorder.errors.lock().unwrap().is_empty());
}
