use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{Result, ScrapeError};
use crate::domain::Review;
use crate::scraper::page::{BrowserPage, EvalValue};
use crate::scraper::paginator::{ScrollPaginator, ScrollStop};

/// Reviews shown per scroll round, used to size the pagination budget.
const REVIEWS_PER_ROUND: usize = 10;

/// Switches the place panel to its review list.
pub const OPEN_REVIEWS_SCRIPT: &str = r#"
(() => {
    const button = document.querySelector('button[jsaction*="pane.reviewChart.moreReviews"]')
        || document.querySelector('button[aria-label*="Reviews"]');
    if (!button) {
        return false;
    }
    button.click();
    return true;
})()
"#;

/// Reads every review currently attached to the review feed.
pub const REVIEWS_SCRIPT: &str = r#"
(() => {
    const text = (el, selector) => {
        const node = el.querySelector(selector);
        return node ? node.innerText.trim() : '';
    };
    return Array.from(document.querySelectorAll('div.jftiEf')).map((el) => {
        const profile = el.querySelector('button.WEBjve, button.al6Kxe');
        const stars = el.querySelector('span.kvMYJc');
        const label = stars ? (stars.getAttribute('aria-label') || '') : '';
        const rating = parseFloat(label.replace(',', '.'));
        return {
            author_name: el.getAttribute('aria-label') || text(el, 'div.d4r55'),
            author_url: profile ? (profile.getAttribute('data-href') || '') : '',
            rating: Number.isFinite(rating) ? rating : 0,
            relative_time: text(el, 'span.rsqaWe'),
            text: text(el, 'span.wiI7pd'),
        };
    });
})()
"#;

/// Paginates a place's review feed and reads the reviews out of the DOM
#[derive(Debug, Clone)]
pub struct ReviewCollector {
    paginator: ScrollPaginator,
    selector: String,
}

impl ReviewCollector {
    pub fn new(paginator: ScrollPaginator, selector: impl Into<String>) -> Self {
        Self {
            paginator,
            selector: selector.into(),
        }
    }

    /// Collect up to `limit` reviews in feed order.
    pub async fn collect(
        &self,
        page: &dyn BrowserPage,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Review>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        match page.evaluate(OPEN_REVIEWS_SCRIPT).await {
            Ok(EvalValue::Other(serde_json::Value::Bool(true))) => {}
            Ok(_) => debug!("No reviews button, assuming review feed is already open"),
            Err(e) => warn!("Failed to open reviews: {}", e),
        }

        let rounds = limit / REVIEWS_PER_ROUND + 1;
        let outcome = self
            .paginator
            .scroll(page, &self.selector, rounds, cancel)
            .await?;
        if outcome.stop == ScrollStop::Cancelled {
            return Err(ScrapeError::Cancelled);
        }
        debug!(rounds = outcome.iterations, "Review feed scrolled");

        let items = match page.evaluate(REVIEWS_SCRIPT).await? {
            EvalValue::Array(items) => items,
            EvalValue::Null => Vec::new(),
            other => {
                return Err(ScrapeError::Extraction(format!(
                    "unexpected review list: {:?}",
                    other
                )))
            }
        };

        let mut reviews: Vec<Review> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(review) => Some(review),
                Err(e) => {
                    debug!("Skipping malformed review: {}", e);
                    None
                }
            })
            .collect();
        reviews.truncate(limit);

        Ok(reviews)
    }
}
