//! Per-host worker
//!
//! Each host gets one worker task that processes its URLs strictly one at a
//! time. The first item of every worker is the host's robots.txt. After each
//! URL the worker reports back to the crawler and then waits out the crawl
//! delay before taking the next item. A worker that sees no work for the
//! idle TTL closes its queue and stops.

use crate::config::{CrawlerOptions, LogCategory};
use crate::crawler::extender::{DelayInfo, Extender, FetchInfo};
use crate::crawler::fetcher::{strip_bom, FetchError, Response};
use crate::crawler::host_queue::HostQueue;
use crate::crawler::parser::{extract_links, parse_html};
use crate::robots::{policy_from_response, RobotsPolicy};
use crate::url::{Links, UrlContext};
use crate::{CrawlError, CrawlErrorKind};
use scraper::Html;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};

/// Redirect hops followed when fetching robots.txt
const MAX_ROBOTS_REDIRECTS: usize = 10;

/// Links discovered while processing one URL
#[derive(Debug)]
pub(crate) enum Discovered {
    /// Links harvested from a page, resolved against the page URL
    Links(Links),
    /// Target of a redirect, with its context already prepared
    Redirect(UrlContext),
}

/// Outcome of one processed URL
#[derive(Debug)]
pub(crate) struct WorkerResult {
    pub host: String,
    pub ctx: UrlContext,
    pub visited: bool,
    pub harvested: Option<Discovered>,
}

/// Messages from host workers to the crawler
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Result(WorkerResult),
    /// The worker closed its empty queue after idling and is exiting
    IdleDeath { host: String, index: usize },
}

pub(crate) struct HostWorker {
    host: String,
    index: usize,
    queue: Arc<HostQueue>,
    stop: watch::Receiver<bool>,
    results: mpsc::Sender<WorkerMessage>,
    extender: Arc<dyn Extender>,
    options: Arc<CrawlerOptions>,
    robots: Option<RobotsPolicy>,
    last_delay: Duration,
    delay_until: Option<Instant>,
    last_fetch: Option<FetchInfo>,
}

impl HostWorker {
    pub fn new(
        host: String,
        index: usize,
        queue: Arc<HostQueue>,
        stop: watch::Receiver<bool>,
        results: mpsc::Sender<WorkerMessage>,
        extender: Arc<dyn Extender>,
        options: Arc<CrawlerOptions>,
    ) -> Self {
        Self {
            host,
            index,
            queue,
            stop,
            results,
            extender,
            options,
            robots: None,
            last_delay: Duration::ZERO,
            delay_until: None,
            last_fetch: None,
        }
    }

    /// Processes URLs until stopped, closed or idle
    pub async fn run(mut self) {
        let idle_ttl = self.options.worker_idle_ttl();
        tracing::debug!("Worker {} for {} started", self.index, self.host);

        loop {
            if *self.stop.borrow() {
                break;
            }

            let popped = tokio::select! {
                biased;
                _ = wait_for_stop(&mut self.stop) => break,
                popped = timeout(idle_ttl, self.queue.pop()) => popped,
            };

            match popped {
                Ok(Some(ctx)) => {
                    if !self.process(ctx).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    if !self.queue.close_if_empty() {
                        continue;
                    }
                    self.log(
                        LogCategory::Info,
                        format!("worker {} for host {} idle, stopping", self.index, self.host),
                    );
                    let death = WorkerMessage::IdleDeath {
                        host: self.host.clone(),
                        index: self.index,
                    };
                    self.send(death).await;
                    break;
                }
            }
        }

        tracing::debug!("Worker {} for {} stopped", self.index, self.host);
    }

    /// Processes one item; returns `false` if the worker must exit
    async fn process(&mut self, ctx: UrlContext) -> bool {
        if !self.wait_out_delay().await {
            return false;
        }

        if ctx.is_robots_url() {
            self.request_robots_txt(ctx).await;
            return true;
        }

        let result = if self.is_allowed_per_robots_policies(&ctx) {
            self.request_url(ctx).await
        } else {
            self.log(
                LogCategory::Ignored,
                format!("disallowed by robots.txt: {}", ctx.url()),
            );
            self.extender.disallowed(&ctx);
            self.not_visited(ctx)
        };

        if !self.send(WorkerMessage::Result(result)).await {
            return false;
        }

        self.wait_out_delay().await
    }

    async fn request_robots_txt(&mut self, ctx: UrlContext) {
        let robot_agent = self.options.robot_user_agent.clone();
        let (data, do_request) = self.extender.request_robots(&ctx, &robot_agent);

        if !do_request {
            self.log(
                LogCategory::Trace,
                format!("using supplied robots.txt for host {}", self.host),
            );
            self.robots = data.map(|content| RobotsPolicy::from_content(&content, &robot_agent));
            return;
        }

        let Some(res) = self.fetch_robots_txt(&ctx).await else {
            return;
        };

        self.extender.fetched_robots(&ctx, &res);
        match policy_from_response(res.status, &res.body, &robot_agent) {
            Ok(policy) => self.robots = policy,
            Err(e) => self.report_error(CrawlError::new(
                Some(ctx.url()),
                CrawlErrorKind::ParseRobots,
                e.to_string(),
            )),
        }
    }

    /// Fetches robots.txt, following redirects
    ///
    /// Page redirects go back to the crawler as new URLs, but robots.txt
    /// belongs to this worker, so its redirects are followed here. Returns
    /// `None` after reporting an error, in which case everything is allowed.
    async fn fetch_robots_txt(&mut self, ctx: &UrlContext) -> Option<Response> {
        let user_agent = self.options.user_agent.clone();
        let mut target = ctx.clone();

        for _ in 0..=MAX_ROBOTS_REDIRECTS {
            let res = match self.fetch(&target, &user_agent, false).await {
                Ok(res) => res,
                Err(e) => {
                    self.report_error(CrawlError::new(
                        Some(target.url()),
                        CrawlErrorKind::Fetch,
                        e.to_string(),
                    ));
                    return None;
                }
            };

            let location = res.redirect_location().map(str::to_string);
            let Some(location) = location else {
                return Some(res);
            };

            let next = res
                .url
                .join(&location)
                .map_err(|e| e.to_string())
                .and_then(|next| {
                    target
                        .clone_for_redirect(next, &self.options.normalization)
                        .map_err(|e| e.to_string())
                });
            match next {
                Ok(next) => {
                    self.log(
                        LogCategory::Trace,
                        format!("robots.txt redirect {} -> {}", target.url(), next.url()),
                    );
                    target = next;
                }
                Err(e) => {
                    self.report_error(CrawlError::new(
                        Some(target.url()),
                        CrawlErrorKind::ParseRedirectUrl,
                        format!("{}: {}", location, e),
                    ));
                    return None;
                }
            }
        }

        self.report_error(CrawlError::new(
            Some(ctx.url()),
            CrawlErrorKind::ParseRobots,
            format!("more than {} redirects", MAX_ROBOTS_REDIRECTS),
        ));
        None
    }

    fn is_allowed_per_robots_policies(&self, ctx: &UrlContext) -> bool {
        match &self.robots {
            Some(policy) => policy.is_allowed(&ctx.robots_path()),
            None => true,
        }
    }

    async fn request_url(&mut self, ctx: UrlContext) -> WorkerResult {
        let user_agent = self.options.user_agent.clone();

        if ctx.head_before_get {
            match self.fetch(&ctx, &user_agent, true).await {
                Ok(head) => {
                    if let Some(location) = head.redirect_location() {
                        return self.redirect_result(ctx, &head.url, location);
                    }
                    if !self.extender.request_get(&ctx, &head) {
                        self.log(
                            LogCategory::Ignored,
                            format!("GET refused after HEAD ({}): {}", head.status, ctx.url()),
                        );
                        return self.not_visited(ctx);
                    }
                }
                Err(e) => return self.fetch_failed(ctx, e),
            }
        }

        let res = match self.fetch(&ctx, &user_agent, false).await {
            Ok(res) => res,
            Err(e) => return self.fetch_failed(ctx, e),
        };

        if let Some(location) = res.redirect_location() {
            return self.redirect_result(ctx, &res.url, location);
        }

        if res.is_success() {
            return self.visit_url(ctx, &res);
        }

        let message = format!("unexpected status {} for {}", res.status, ctx.url());
        self.report_error(CrawlError::new(
            Some(ctx.url()),
            CrawlErrorKind::HttpStatus,
            message,
        ));
        self.not_visited(ctx)
    }

    /// Fetches after the outstanding crawl delay and schedules the next one
    async fn fetch(
        &mut self,
        ctx: &UrlContext,
        user_agent: &str,
        is_head: bool,
    ) -> Result<Response, FetchError> {
        if let Some(deadline) = self.delay_until {
            sleep_until(deadline).await;
        }

        let delay = self.compute_delay(ctx);
        let started = Instant::now();
        self.delay_until = Some(started + delay);

        self.log(
            LogCategory::Trace,
            format!(
                "{} {} (delay {:?})",
                if is_head { "HEAD" } else { "GET" },
                ctx.url(),
                delay
            ),
        );

        let result = self.extender.fetch(ctx, user_agent, is_head).await;
        if let Ok(res) = &result {
            self.last_fetch = Some(FetchInfo {
                ctx: ctx.clone(),
                duration: started.elapsed(),
                status_code: res.status,
                is_head_request: is_head,
            });
        }
        result
    }

    fn compute_delay(&mut self, ctx: &UrlContext) -> Duration {
        let delay = match ctx.crawl_delay {
            Some(delay) => delay,
            None => {
                let info = DelayInfo {
                    opts_delay: self.options.crawl_delay(),
                    robots_delay: self.robots.as_ref().and_then(|p| p.crawl_delay),
                    last_delay: self.last_delay,
                };
                self.extender
                    .compute_delay(&self.host, &info, self.last_fetch.as_ref())
            }
        };
        self.last_delay = delay;
        delay
    }

    /// Waits until the crawl delay of the last fetch has passed
    ///
    /// Returns `false` if a stop was requested meanwhile.
    async fn wait_out_delay(&mut self) -> bool {
        let Some(deadline) = self.delay_until else {
            return true;
        };

        tokio::select! {
            biased;
            _ = wait_for_stop(&mut self.stop) => false,
            _ = sleep_until(deadline) => true,
        }
    }

    fn redirect_result(&self, ctx: UrlContext, fetched: &url::Url, location: &str) -> WorkerResult {
        let target = fetched
            .join(location)
            .map_err(|e| e.to_string())
            .and_then(|target| {
                ctx.clone_for_redirect(target, &self.options.normalization)
                    .map_err(|e| e.to_string())
            });

        match target {
            Ok(next) => {
                self.log(
                    LogCategory::Trace,
                    format!("redirect {} -> {}", ctx.url(), next.url()),
                );
                WorkerResult {
                    host: self.host.clone(),
                    ctx,
                    visited: false,
                    harvested: Some(Discovered::Redirect(next)),
                }
            }
            Err(e) => {
                self.report_error(CrawlError::new(
                    Some(ctx.url()),
                    CrawlErrorKind::ParseRedirectUrl,
                    format!("{}: {}", location, e),
                ));
                self.not_visited(ctx)
            }
        }
    }

    /// Runs the visit hooks on a successful response
    ///
    /// The document never outlives this call, so it is never held across an
    /// await point.
    fn visit_url(&self, ctx: UrlContext, res: &Response) -> WorkerResult {
        let document = self.parse_document(&ctx, res);
        let (mut harvested, extract) = self.extender.visit(&ctx, res, document.as_ref());

        if extract {
            match &document {
                Some(doc) => harvested = Some(self.harvest_links(doc, &ctx)),
                None => self.report_error(CrawlError::new(
                    Some(ctx.url()),
                    CrawlErrorKind::ProcessLinks,
                    "no document to extract links from",
                )),
            }
        }
        drop(document);

        self.extender.visited(&ctx, harvested.as_ref());

        WorkerResult {
            host: self.host.clone(),
            ctx,
            visited: true,
            harvested: harvested.map(Discovered::Links),
        }
    }

    /// Parses an HTML body
    ///
    /// ASCII-compatible charsets are decoded as UTF-8 with invalid bytes
    /// replaced, which keeps markup and links intact. UTF-16 bodies cannot be
    /// read that way and give no document.
    fn parse_document(&self, ctx: &UrlContext, res: &Response) -> Option<Html> {
        if !res.looks_like_html() {
            return None;
        }

        if let Some(charset) = res.charset().filter(|c| c.starts_with("utf-16")) {
            self.report_error(CrawlError::new(
                Some(ctx.url()),
                CrawlErrorKind::ParseBody,
                format!("unsupported charset {}", charset),
            ));
            return None;
        }

        let body = String::from_utf8_lossy(strip_bom(&res.body));
        if let Cow::Owned(_) = body {
            self.log(
                LogCategory::Info,
                format!("replaced invalid UTF-8 in body of {}", ctx.url()),
            );
        }
        Some(parse_html(&body))
    }

    fn harvest_links(&self, document: &Html, ctx: &UrlContext) -> Links {
        let extracted = extract_links(document, ctx.url());
        for (href, reason) in &extracted.unparsable {
            self.log(
                LogCategory::Error,
                format!("skipping unparsable link {:?} on {}: {}", href, ctx.url(), reason),
            );
        }
        Links::Many(extracted.links)
    }

    fn fetch_failed(&self, ctx: UrlContext, err: FetchError) -> WorkerResult {
        let kind = match err {
            FetchError::ReadBody(_) => CrawlErrorKind::ReadBody,
            _ => CrawlErrorKind::Fetch,
        };
        self.report_error(CrawlError::new(Some(ctx.url()), kind, err.to_string()));
        self.not_visited(ctx)
    }

    fn not_visited(&self, ctx: UrlContext) -> WorkerResult {
        WorkerResult {
            host: self.host.clone(),
            ctx,
            visited: false,
            harvested: None,
        }
    }

    /// Sends a message to the crawler unless a stop comes first
    async fn send(&mut self, message: WorkerMessage) -> bool {
        tokio::select! {
            sent = self.results.send(message) => sent.is_ok(),
            _ = wait_for_stop(&mut self.stop) => false,
        }
    }

    fn report_error(&self, err: CrawlError) {
        self.log(LogCategory::Error, err.to_string());
        self.extender.error(&err);
    }

    fn log(&self, category: LogCategory, message: impl AsRef<str>) {
        if self.options.log.enabled(category) {
            self.extender.log(category, message.as_ref());
        }
    }
}

/// Resolves once a stop is requested or the crawler is gone
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
