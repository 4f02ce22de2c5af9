use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::{Result, RunContext};
use crate::crawler::{CrawlStats, Crawler};
use crate::exiter::StopReason;
use crate::fetcher::HttpFetcher;
use crate::jobs::create_seed_jobs;
use crate::output::{write_all, CsvWriter, JsonLinesWriter, ResultWriter};
use crate::scraper::{BrowserPage, ChromeBrowser};

/// Entries buffered between the workers and the writer.
const RESULT_BUFFER: usize = 256;

/// Outcome of one scrape run
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub stats: CrawlStats,
    pub written: usize,
    pub stop_reason: Option<StopReason>,
}

/// Read seed queries from `path`, or from stdin when it is absent or `-`.
pub async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => Ok(tokio::fs::read_to_string(path).await?),
        _ => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            Ok(input)
        }
    }
}

/// CSV by default, JSON lines when `json` is set.
pub async fn open_writer(path: Option<&Path>, json: bool) -> Result<Box<dyn ResultWriter>> {
    Ok(match (path, json) {
        (Some(path), true) => Box::new(JsonLinesWriter::create(path).await?),
        (None, true) => Box::new(JsonLinesWriter::stdout()),
        (Some(path), false) => Box::new(CsvWriter::create(path).await?),
        (None, false) => Box::new(CsvWriter::stdout()),
    })
}

/// Crawl every query in `input` and write the entries to `writer`.
pub async fn scrape(
    ctx: &RunContext,
    input: &str,
    writer: Box<dyn ResultWriter>,
) -> Result<RunSummary> {
    let jobs = create_seed_jobs(input, &ctx.seed_options())?;
    if jobs.is_empty() {
        warn!("No queries in input");
    }

    let browser = ChromeBrowser::launch(ctx.config.browser.clone()).await?;
    let mut pages: Vec<Arc<dyn BrowserPage>> = Vec::with_capacity(ctx.config.crawl.concurrency);
    for _ in 0..ctx.config.crawl.concurrency {
        pages.push(Arc::new(browser.new_page().await?));
    }

    let fetcher = Arc::new(HttpFetcher::new(&ctx.config.http)?);
    let crawler = Arc::new(Crawler::new(ctx.job_context(), ctx.monitor.clone(), fetcher));
    crawler.seed(jobs);

    let (tx, rx) = mpsc::channel(RESULT_BUFFER);
    let writer_task = tokio::spawn(write_all(rx, writer));

    let monitor = ctx.monitor.clone();
    let monitor_task = tokio::spawn(async move { monitor.run().await });

    let stats = crawler.run(pages, tx).await;

    // Workers only exit once the run is cancelled; this releases the monitor
    // when the cancellation came from outside.
    ctx.cancel.cancel();
    if let Err(e) = monitor_task.await {
        warn!("Exit monitor task failed: {}", e);
    }

    let written = match writer_task.await {
        Ok(written) => written?,
        Err(e) => {
            warn!("Writer task failed: {}", e);
            0
        }
    };

    if let Err(e) = browser.close().await {
        warn!("{}", e);
    }

    let progress = ctx.monitor.progress();
    info!(
        "Run finished: {} entries written, {}/{} jobs completed",
        written, progress.completed, progress.expected
    );

    Ok(RunSummary {
        stats,
        written,
        stop_reason: progress.stop_reason,
    })
}
