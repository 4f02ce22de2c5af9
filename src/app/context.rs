use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::app::error::{Result, ScrapeError};
use crate::config::Config;
use crate::dedup::Deduper;
use crate::exiter::ExitMonitor;
use crate::jobs::{JobContext, SeedOptions};
use crate::scraper::{PageStateExtractor, ReviewCollector, ScrollPaginator};

/// State scoped to exactly one run.
///
/// Dedup set, completion counters and the cancellation token live here
/// rather than in globals, so two runs in one process never share them.
pub struct RunContext {
    pub config: Config,
    pub deduper: Arc<Deduper>,
    pub monitor: Arc<ExitMonitor>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ScrapeError::Config(e.to_string()))?;
        let inactivity = config
            .crawl
            .inactivity()
            .map_err(|e| ScrapeError::Config(e.to_string()))?;

        let cancel = CancellationToken::new();
        let monitor = Arc::new(ExitMonitor::new(cancel.clone(), inactivity));

        Ok(Self {
            config,
            deduper: Arc::new(Deduper::new()),
            monitor,
            cancel,
        })
    }

    pub fn job_context(&self) -> JobContext {
        let paginator = ScrollPaginator::new(self.config.scroll.clone());
        JobContext {
            deduper: self.deduper.clone(),
            extractor: PageStateExtractor::new(self.config.extract.clone()),
            reviews: ReviewCollector::new(
                paginator.clone(),
                self.config.crawl.review_feed_selector.as_str(),
            ),
            paginator,
            review_threshold: self.config.crawl.review_threshold,
            cancel: self.cancel.clone(),
        }
    }

    pub fn seed_options(&self) -> SeedOptions {
        self.config.crawl.seed_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_context_shares_run_state() {
        let run = RunContext::new(Config::default()).unwrap();
        let ctx = run.job_context();

        assert!(ctx.deduper.try_claim("place"));
        assert!(!run.deduper.try_claim("place"));

        run.cancel.cancel();
        assert!(ctx.cancel.is_cancelled());
    }

    #[test]
    fn test_runs_are_isolated() {
        let first = RunContext::new(Config::default()).unwrap();
        let second = RunContext::new(Config::default()).unwrap();

        assert!(first.deduper.try_claim("place"));
        assert!(second.deduper.try_claim("place"));

        first.cancel.cancel();
        assert!(!second.cancel.is_cancelled());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.crawl.concurrency = 0;
        assert!(matches!(RunContext::new(config), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn test_stopping_monitor_cancels_run() {
        let run = RunContext::new(Config::default()).unwrap();
        run.monitor.set_seed_count(0);
        assert!(run.cancel.is_cancelled());
    }
}
