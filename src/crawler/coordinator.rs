//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator owns every piece of shared crawl state (visited set,
//! pending count, visit count, host workers) inside a single receive loop, so
//! none of it needs a lock. It:
//! - Turns seeds and harvested links into URL contexts
//! - Filters and deduplicates them, then hands them to per-host workers,
//!   launching a worker the first time a host is seen
//! - Tracks how much work is outstanding to detect the end of the crawl
//! - Stops every worker and waits for all of them before returning

use crate::config::{validate, CrawlerOptions, LogCategory};
use crate::crawler::extender::{DefaultExtender, EndReason, Enqueuer, Extender};
use crate::crawler::host_queue::HostQueue;
use crate::crawler::worker::{Discovered, HostWorker, WorkerMessage, WorkerResult};
use crate::url::{structural_rejection, Links, UrlContext, ROBOTS_PATH};
use crate::{CrawlError, CrawlErrorKind, CrawlerError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use url::Url;

/// How often the coordinator checks whether the crawl is complete
const COMPLETION_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Handle for interrupting a running crawl from another task
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl InterruptHandle {
    /// Ends the current run with [`EndReason::Interrupted`]
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }
}

/// Main crawler structure
///
/// A crawler can run several times; each run starts with empty state.
///
/// # Example
///
/// ```no_run
/// use sumi_crawl::{Crawler, CrawlerOptions, EndReason};
///
/// # async fn example() -> Result<(), sumi_crawl::CrawlerError> {
/// let crawler = Crawler::with_default_extender(CrawlerOptions::default())?;
/// let reason = crawler.run("https://example.com/").await;
/// assert_eq!(reason, EndReason::Done);
/// # Ok(())
/// # }
/// ```
pub struct Crawler {
    options: Arc<CrawlerOptions>,
    extender: Arc<dyn Extender>,
    interrupt: Arc<watch::Sender<bool>>,
}

impl Crawler {
    /// Creates a crawler with a custom extender
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - The options are valid
    /// * `Err(CrawlerError::Config)` - The options failed validation
    pub fn new(options: CrawlerOptions, extender: Arc<dyn Extender>) -> Result<Self, CrawlerError> {
        validate(&options)?;
        let (tx, _) = watch::channel(false);

        Ok(Self {
            options: Arc::new(options),
            extender,
            interrupt: Arc::new(tx),
        })
    }

    /// Creates a crawler using [`DefaultExtender`] with the configured user agent
    pub fn with_default_extender(options: CrawlerOptions) -> Result<Self, CrawlerError> {
        let extender = DefaultExtender::with_user_agent(&options.user_agent)?;
        Self::new(options, Arc::new(extender))
    }

    pub fn options(&self) -> &CrawlerOptions {
        &self.options
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            tx: Arc::clone(&self.interrupt),
        }
    }

    /// Runs a crawl from the given seeds until it ends
    ///
    /// The extender's `end` hook has been called when this returns, and no
    /// worker task is left running.
    pub async fn run(&self, seeds: impl Into<Links>) -> EndReason {
        self.interrupt.send_replace(false);

        let (enqueue_tx, enqueue_rx) = mpsc::unbounded_channel();
        let seeds = self.extender.start(seeds.into(), Enqueuer::new(enqueue_tx));

        let mut run = CrawlRun::new(self, enqueue_rx);
        let contexts = run.to_contexts(seeds, None, CrawlErrorKind::Seed);
        run.init(&contexts);
        run.log(
            LogCategory::Info,
            format!("starting crawl with {} seed(s)", contexts.len()),
        );
        run.enqueue_urls(contexts);

        let reason = run.collect_urls().await;
        run.stop_all().await;

        run.log(
            LogCategory::Info,
            format!("crawl ended ({}) after {} visit(s)", reason, run.visits),
        );
        self.extender.end(&reason);
        reason
    }
}

struct WorkerHandle {
    index: usize,
    queue: Arc<HostQueue>,
    stop: watch::Sender<bool>,
}

/// State of one crawl run
struct CrawlRun {
    options: Arc<CrawlerOptions>,
    extender: Arc<dyn Extender>,
    interrupt: watch::Receiver<bool>,
    workers: HashMap<String, WorkerHandle>,
    tasks: JoinSet<()>,
    results_tx: mpsc::Sender<WorkerMessage>,
    results_rx: mpsc::Receiver<WorkerMessage>,
    enqueue_rx: mpsc::UnboundedReceiver<Links>,
    visited: HashSet<String>,
    pending: usize,
    visits: usize,
    next_index: usize,
}

impl CrawlRun {
    fn new(crawler: &Crawler, enqueue_rx: mpsc::UnboundedReceiver<Links>) -> Self {
        let (results_tx, results_rx) = mpsc::channel(crawler.options.result_buffer.max(1));

        Self {
            options: Arc::clone(&crawler.options),
            extender: Arc::clone(&crawler.extender),
            interrupt: crawler.interrupt.subscribe(),
            workers: HashMap::new(),
            tasks: JoinSet::new(),
            results_tx,
            results_rx,
            enqueue_rx,
            visited: HashSet::new(),
            pending: 0,
            visits: 0,
            next_index: 0,
        }
    }

    /// Sizes the run's maps for the seeds
    fn init(&mut self, seeds: &[UrlContext]) {
        let hosts: HashSet<String> = seeds.iter().filter_map(UrlContext::host).collect();
        self.workers.reserve(hosts.len());
        self.visited.reserve(seeds.len());
    }

    /// Turns links into contexts, resolving relative links against `source`
    fn to_contexts(
        &self,
        links: Links,
        source: Option<&Url>,
        error_kind: CrawlErrorKind,
    ) -> Vec<UrlContext> {
        let mut contexts = Vec::with_capacity(links.len());

        for (link, state) in links.into_pairs() {
            match UrlContext::parse(&link, source, &self.options.normalization) {
                Ok(mut ctx) => {
                    ctx.head_before_get = self.options.head_before_get;
                    ctx.state = state;
                    contexts.push(ctx);
                }
                Err(e) => self.report_error(CrawlError::new(
                    source,
                    error_kind,
                    format!("{}: {}", link, e),
                )),
            }
        }

        contexts
    }

    /// Filters contexts and pushes the admitted ones to their host workers
    fn enqueue_urls(&mut self, contexts: Vec<UrlContext>) {
        for mut ctx in contexts {
            if ctx.is_robots_url() || ctx.normalized_url().path() == ROBOTS_PATH {
                self.log(LogCategory::Ignored, format!("robots.txt link: {}", ctx.url()));
                continue;
            }

            let key = ctx.normalized_url().as_str().to_string();
            let is_visited = self.visited.contains(&key);

            if !self.extender.filter(&mut ctx, is_visited) {
                self.log(LogCategory::Ignored, format!("filtered: {}", ctx.url()));
                continue;
            }

            if let Some(reason) = structural_rejection(ctx.url()) {
                self.log(LogCategory::Ignored, format!("{}: {}", reason, ctx.url()));
                continue;
            }

            if self.options.same_host_only && !ctx.same_host_as_source() {
                self.log(LogCategory::Ignored, format!("other host: {}", ctx.url()));
                continue;
            }

            let Some(host) = ctx.host() else {
                self.log(LogCategory::Ignored, format!("no host: {}", ctx.url()));
                continue;
            };

            self.push_to_host(&host, ctx);
            self.pending += 1;
            self.visited.insert(key);
        }
    }

    fn push_to_host(&mut self, host: &str, ctx: UrlContext) {
        let queue = match self.workers.get(host) {
            Some(worker) => Arc::clone(&worker.queue),
            None => self.launch_worker(host, &ctx),
        };

        self.extender.enqueued(&ctx);
        self.log(LogCategory::Enqueued, format!("enqueued: {}", ctx.url()));

        let Err(batch) = queue.push(vec![ctx]) else {
            return;
        };

        // The worker closed its queue on idle timeout; start a new one.
        self.log(
            LogCategory::Info,
            format!("worker for host {} stopped while idle, relaunching", host),
        );
        let Some(trigger) = batch.first() else {
            return;
        };
        let queue = self.launch_worker(host, trigger);
        if queue.push(batch).is_err() {
            tracing::error!("Fresh queue for {} rejected a push", host);
        }
    }

    /// Starts a worker for `host` with its robots.txt as the first item
    fn launch_worker(&mut self, host: &str, trigger: &UrlContext) -> Arc<HostQueue> {
        self.next_index += 1;
        let index = self.next_index;
        let queue = Arc::new(HostQueue::new());

        match trigger.robots_context(&self.options.normalization) {
            Ok(robots) => {
                self.extender.enqueued(&robots);
                let _ = queue.push(vec![robots]);
            }
            Err(e) => self.report_error(CrawlError::new(
                Some(trigger.url()),
                CrawlErrorKind::ParseRobots,
                e.to_string(),
            )),
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = HostWorker::new(
            host.to_string(),
            index,
            Arc::clone(&queue),
            stop_rx,
            self.results_tx.clone(),
            Arc::clone(&self.extender),
            Arc::clone(&self.options),
        );
        self.tasks.spawn(worker.run());

        self.workers.insert(
            host.to_string(),
            WorkerHandle {
                index,
                queue: Arc::clone(&queue),
                stop: stop_tx,
            },
        );
        self.log(
            LogCategory::Info,
            format!("launching worker {} for host {}", index, host),
        );

        queue
    }

    /// Receives worker results and external links until the crawl ends
    async fn collect_urls(&mut self) -> EndReason {
        let mut completion_check = interval(COMPLETION_CHECK_INTERVAL);
        completion_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(message) = self.results_rx.recv() => {
                    if let Some(reason) = self.handle_message(message) {
                        return reason;
                    }
                }
                Some(links) = self.enqueue_rx.recv() => self.enqueue_external(links),
                _ = wait_for_interrupt(&mut self.interrupt) => {
                    return EndReason::Interrupted;
                }
                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            std::panic::resume_unwind(e.into_panic());
                        }
                        tracing::error!("Worker task aborted: {}", e);
                        return EndReason::Error;
                    }
                }
                _ = completion_check.tick() => {
                    if self.pending > 0 {
                        continue;
                    }
                    match self.enqueue_rx.try_recv() {
                        Ok(links) => self.enqueue_external(links),
                        Err(_) => return EndReason::Done,
                    }
                }
            }
        }
    }

    fn handle_message(&mut self, message: WorkerMessage) -> Option<EndReason> {
        match message {
            WorkerMessage::IdleDeath { host, index } => {
                if self.workers.get(&host).is_some_and(|w| w.index == index) {
                    self.workers.remove(&host);
                    self.log(
                        LogCategory::Trace,
                        format!("worker {} for host {} removed", index, host),
                    );
                }
                None
            }
            WorkerMessage::Result(result) => self.handle_result(result),
        }
    }

    fn handle_result(&mut self, result: WorkerResult) -> Option<EndReason> {
        if result.visited {
            self.visits += 1;
            if self
                .options
                .visit_budget()
                .is_some_and(|max| self.visits >= max)
            {
                self.log(
                    LogCategory::Info,
                    format!("visit budget of {} reached", self.visits),
                );
                return Some(EndReason::MaxVisitsReached);
            }
        }

        match self.pending.checked_sub(1) {
            Some(pending) => self.pending = pending,
            None => tracing::error!(
                "Result for {} from {} with no pending work",
                result.ctx.url(),
                result.host
            ),
        }

        let contexts = match result.harvested {
            Some(Discovered::Links(links)) => {
                self.to_contexts(links, Some(result.ctx.url()), CrawlErrorKind::ParseUrl)
            }
            Some(Discovered::Redirect(next)) => vec![next],
            None => return None,
        };
        self.enqueue_urls(contexts);

        None
    }

    fn enqueue_external(&mut self, links: Links) {
        let contexts = self.to_contexts(links, None, CrawlErrorKind::ParseUrl);
        self.enqueue_urls(contexts);
    }

    /// Stops every worker and waits for all of them to exit
    async fn stop_all(&mut self) {
        for worker in self.workers.values() {
            worker.stop.send_replace(true);
            worker.queue.close();
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                tracing::error!("Worker task aborted during shutdown: {}", e);
            }
        }

        self.workers.clear();
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

async fn wait_for_interrupt(interrupt: &mut watch::Receiver<bool>) {
    let _ = interrupt.wait_for(|interrupted| *interrupted).await;
}
