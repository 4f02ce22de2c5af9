use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{Result, ScrapeError};
use crate::scraper::config::ScrollConfig;
use crate::scraper::page::BrowserPage;

/// Scrollable container holding search results.
pub const RESULTS_FEED_SELECTOR: &str = "div[role='feed']";

/// Scrollable container holding the reviews of a place.
pub const REVIEWS_FEED_SELECTOR: &str = "div.m6QErb.DxyBCb.kA9KIf.dS8AEf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// Height stopped growing; nothing more to load.
    Exhausted,
    MaxIterations,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    /// Rounds that grew the feed.
    pub iterations: usize,
    /// Last scroll height observed.
    pub height: u64,
    pub stop: ScrollStop,
}

/// Reveals lazily loaded feed content by scrolling until its height settles.
#[derive(Debug, Clone, Default)]
pub struct ScrollPaginator {
    config: ScrollConfig,
}

impl ScrollPaginator {
    pub fn new(config: ScrollConfig) -> Self {
        Self { config }
    }

    /// Scroll `selector` to its bottom up to `max_iterations` times.
    ///
    /// Stops early once a round reports the same height as the previous
    /// one. A missing container or a round failing all of its attempts is a
    /// pagination error; cancellation is not an error and reports the
    /// progress made so far.
    pub async fn scroll(
        &self,
        page: &dyn BrowserPage,
        selector: &str,
        max_iterations: usize,
        cancel: &CancellationToken,
    ) -> Result<ScrollOutcome> {
        page.wait_for_selector(selector, self.config.container_timeout())
            .await
            .map_err(|e| {
                ScrapeError::Pagination(format!("feed container {} not found: {}", selector, e))
            })?;

        let mut outcome = ScrollOutcome {
            iterations: 0,
            height: 0,
            stop: ScrollStop::MaxIterations,
        };
        let mut wait = self.config.base_wait();

        for _ in 0..max_iterations {
            if cancel.is_cancelled() {
                outcome.stop = ScrollStop::Cancelled;
                return Ok(outcome);
            }

            let Some(height) = self.scroll_round(page, selector, cancel).await? else {
                outcome.stop = ScrollStop::Cancelled;
                return Ok(outcome);
            };

            if height == outcome.height {
                debug!(height, iterations = outcome.iterations, "Feed exhausted");
                outcome.stop = ScrollStop::Exhausted;
                return Ok(outcome);
            }

            outcome.height = height;
            outcome.iterations += 1;
            debug!(height, round = outcome.iterations, wait = ?wait, "Feed grew");

            // Lazily loaded items attach during this pause; the next round's
            // height reflects them.
            tokio::select! {
                _ = cancel.cancelled() => {
                    outcome.stop = ScrollStop::Cancelled;
                    return Ok(outcome);
                }
                _ = tokio::time::sleep(wait) => {}
            }

            wait = self.config.next_wait(wait);
        }

        Ok(outcome)
    }

    /// One scroll round with retries. `None` means the run was cancelled.
    async fn scroll_round(
        &self,
        page: &dyn BrowserPage,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>> {
        let script = scroll_script(selector);
        let attempts = self.config.round_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match page.evaluate(&script).await {
                Ok(value) => {
                    return value.as_height().map(Some).ok_or_else(|| {
                        ScrapeError::Pagination(format!("scroll height is not a number: {:?}", value))
                    });
                }
                Err(e) => {
                    warn!("Scroll round failed (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(self.config.retry_backoff()) => {}
                }
            }
        }

        Err(ScrapeError::Pagination(format!(
            "scroll failed after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

/// Script scrolling `selector` to its end and returning its height.
pub fn scroll_script(selector: &str) -> String {
    let selector = serde_json::Value::String(selector.to_string());
    format!(
        r#"
        (() => {{
            const el = document.querySelector({selector});
            if (!el) {{
                throw new Error('Scroll element not found: ' + {selector});
            }}
            el.scrollTop = el.scrollHeight;
            return el.scrollHeight;
        }})()
        "#
    )
}
