//! Browser-side building blocks of the scraping pipeline.
//!
//! # Architecture
//!
//! ```text
//! BrowserPage ─┬─► consent            → cookie wall dismissed
//!              ├─► PageStateExtractor → raw place payload
//!              ├─► ScrollPaginator    → lazily loaded feed content
//!              └─► ReviewCollector    → reviews of one place
//! ```
//!
//! [`BrowserPage`] is the seam towards the automation driver; the
//! chromiumoxide implementation lives in [`ChromeBrowser`] / [`ChromePage`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use mapscout::scraper::{ChromeBrowser, BrowserConfig, PageStateExtractor};
//!
//! let browser = ChromeBrowser::launch(BrowserConfig::default()).await?;
//! let page = browser.new_page().await?;
//! page.goto("https://www.google.com/maps/place/...").await?;
//!
//! let raw = PageStateExtractor::default().extract(&page, &cancel).await?;
//! ```

mod chrome;
mod config;
mod consent;
mod extractor;
mod page;
mod paginator;
mod reviews;

pub use chrome::{ChromeBrowser, ChromePage};
pub use config::{BrowserConfig, ExtractConfig, ScrollConfig};
pub use consent::{is_consent_url, reject_cookies_if_required, REJECT_COOKIES_SCRIPT};
pub use extractor::{normalize_payload, PageStateExtractor, PAGE_STATE_SCRIPT, XSSI_PREFIX};
pub use page::{BrowserPage, EvalValue, Navigation};
pub use paginator::{
    scroll_script, ScrollOutcome, ScrollPaginator, ScrollStop, RESULTS_FEED_SELECTOR,
    REVIEWS_FEED_SELECTOR,
};
pub use reviews::{ReviewCollector, OPEN_REVIEWS_SCRIPT, REVIEWS_SCRIPT};
