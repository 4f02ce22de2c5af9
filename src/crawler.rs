//! Worker pool executing jobs from a shared priority queue.
//!
//! Each worker owns one browser page and loops: pop the most urgent job,
//! fetch it (browser actions, or plain HTTP for email jobs), process it,
//! then report to the [`ExitMonitor`]. Children are registered with the
//! monitor before their parent counts as completed.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::{Result, ScrapeError};
use crate::domain::Entry;
use crate::exiter::ExitMonitor;
use crate::fetcher::Fetcher;
use crate::jobs::{Job, JobContext, JobOutput, Priority, Response};
use crate::scraper::BrowserPage;

/// Pause before a failed job is attempted again.
const JOB_RETRY_DELAY: Duration = Duration::from_secs(2);

struct QueuedJob {
    priority: Priority,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Max-heap: higher priority first, then lower sequence number.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
}

/// Priority queue of pending jobs, FIFO within one priority
#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: Job) {
        {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueuedJob {
                priority: job.meta().priority,
                seq,
                job,
            });
        }
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<Job> {
        self.lock().heap.pop().map(|queued| queued.job)
    }

    /// Wait for the next job. Returns `None` once `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<Job> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed.
            notified.as_mut().enable();

            if let Some(job) = self.try_pop() {
                return Some(job);
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Totals of one crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Crawler {
    ctx: JobContext,
    monitor: Arc<ExitMonitor>,
    fetcher: Arc<dyn Fetcher>,
    queue: JobQueue,
    retry_delay: Duration,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl Crawler {
    pub fn new(ctx: JobContext, monitor: Arc<ExitMonitor>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            ctx,
            monitor,
            fetcher,
            queue: JobQueue::new(),
            retry_delay: JOB_RETRY_DELAY,
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Register the seed jobs with the monitor and queue them.
    pub fn seed(&self, jobs: Vec<Job>) {
        self.monitor.set_seed_count(jobs.len());
        for job in jobs {
            self.queue.push(job);
        }
    }

    /// Run one worker per page until the run is cancelled.
    ///
    /// Entries are sent to `results`; the channel closes once every worker
    /// has exited.
    pub async fn run(
        self: Arc<Self>,
        pages: Vec<Arc<dyn BrowserPage>>,
        results: mpsc::Sender<Entry>,
    ) -> CrawlStats {
        info!("Starting {} workers", pages.len());

        let mut handles = Vec::with_capacity(pages.len());
        for (worker, page) in pages.into_iter().enumerate() {
            let crawler = self.clone();
            let results = results.clone();
            handles.push(tokio::spawn(async move {
                crawler.work(worker, page.as_ref(), &results).await;
                if let Err(e) = page.close().await {
                    debug!(worker, "Failed to close page: {}", e);
                }
            }));
        }
        drop(results);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }

        let stats = self.stats();
        info!(
            "Crawl finished: {} jobs succeeded, {} failed, {} left in queue",
            stats.succeeded,
            stats.failed,
            self.queue.len()
        );
        stats
    }

    pub fn stats(&self) -> CrawlStats {
        CrawlStats {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    async fn work(&self, worker: usize, page: &dyn BrowserPage, results: &mpsc::Sender<Entry>) {
        while let Some(job) = self.queue.pop(&self.ctx.cancel).await {
            debug!(worker, kind = job.kind(), url = %job.meta().url, "Picked job");
            self.execute(job, page, results).await;
        }
        debug!(worker, "Worker stopped");
    }

    async fn execute(&self, job: Job, page: &dyn BrowserPage, results: &mpsc::Sender<Entry>) {
        let max_retries = job.meta().max_retries;
        let mut attempt = 0;

        loop {
            match self.attempt(&job, page).await {
                Ok(output) => {
                    self.finish(output, results).await;
                    self.succeeded.fetch_add(1, Ordering::Relaxed);
                    self.monitor.incr_completed(1);
                    return;
                }
                Err(e)
                    if e.is_transient()
                        && attempt < max_retries
                        && !self.ctx.cancel.is_cancelled() =>
                {
                    attempt += 1;
                    warn!(
                        "{} job {} failed (retry {}/{}): {}",
                        job.kind(),
                        job.meta().url,
                        attempt,
                        max_retries,
                        e
                    );

                    tokio::select! {
                        _ = self.ctx.cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
                Err(e) => {
                    if matches!(e, ScrapeError::Cancelled) {
                        debug!("{} job {} cancelled", job.kind(), job.meta().url);
                    } else {
                        error!("{} job {} failed: {}", job.kind(), job.meta().url, e);
                    }
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    self.monitor.incr_completed(1);
                    return;
                }
            }
        }
    }

    async fn attempt(&self, job: &Job, page: &dyn BrowserPage) -> Result<JobOutput> {
        let mut response = if job.uses_browser() {
            job.browser_actions(page, &self.ctx).await
        } else {
            let url = job.meta().full_url();
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => Response::failed(ScrapeError::Cancelled),
                fetched = self.fetcher.fetch(&url) => match fetched {
                    Ok(fetched) => Response::from(fetched),
                    Err(e) => Response::failed(e),
                },
            }
        };

        match response.error.take() {
            Some(ScrapeError::Cancelled) => Err(ScrapeError::Cancelled),
            Some(e) if !job.process_on_fetch_error() => Err(e),
            error => {
                response.error = error;
                job.process(response, &self.ctx)
            }
        }
    }

    async fn finish(&self, output: JobOutput, results: &mpsc::Sender<Entry>) {
        if let Some(entry) = output.result {
            if results.send(entry).await.is_err() {
                warn!("Result receiver dropped, discarding entry");
            }
        }

        self.monitor.incr_expected(output.children.len());
        for child in output.children {
            self.queue.push(child);
        }
    }
}
