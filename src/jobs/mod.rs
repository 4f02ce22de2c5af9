//! Job model and fan-out.
//!
//! ```text
//! SearchJob ──► PlaceJob (one per distinct result, deduplicated)
//!                  └──► EmailJob (at most one, when a usable website exists)
//! ```
//!
//! Browser-driven jobs first run [`Job::browser_actions`] to produce a
//! [`Response`], then [`Job::process`] turns it into a result and child
//! jobs. Email jobs are fetched over plain HTTP by the crawler instead.

pub mod email;
pub mod place;
pub mod search;
pub mod seed;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::app::{Result, ScrapeError};
use crate::dedup::Deduper;
use crate::domain::Entry;
use crate::fetcher::FetchedPage;
use crate::scraper::{
    reject_cookies_if_required, BrowserPage, Navigation, PageStateExtractor, ReviewCollector,
    ScrollPaginator,
};

pub use email::EmailJob;
pub use place::{PlaceJob, PlaceOptions};
pub use search::SearchJob;
pub use seed::{create_seed_jobs, SeedOptions};

/// Side-channel key of the raw page-state payload.
pub const META_JSON: &str = "json";
/// Side-channel key of reviews collected during browser actions.
pub const META_REVIEWS: &str = "reviews";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Attributes shared by every job variant
#[derive(Debug, Clone)]
pub struct JobMeta {
    pub id: String,
    pub parent_id: String,
    pub url: String,
    pub method: String,
    pub priority: Priority,
    pub max_retries: u32,
    pub url_params: BTreeMap<String, String>,
}

impl JobMeta {
    pub fn new(parent_id: &str, url: &str, priority: Priority, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            priority,
            max_retries,
            url_params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.url_params.insert(key.to_string(), value.to_string());
        self
    }

    /// URL including `url_params`, replacing existing keys of the same name.
    pub fn full_url(&self) -> String {
        if self.url_params.is_empty() {
            return self.url.clone();
        }

        let Ok(mut url) = Url::parse(&self.url) else {
            return self.url.clone();
        };

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !self.url_params.contains_key(k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .extend_pairs(&self.url_params);

        url.to_string()
    }
}

/// What a job fetched, handed from the fetch step to [`Job::process`]
#[derive(Debug, Default)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Pre-extracted payloads, keyed by [`META_JSON`] / [`META_REVIEWS`].
    pub meta: HashMap<&'static str, Vec<u8>>,
    pub error: Option<ScrapeError>,
}

impl Response {
    pub fn failed(error: ScrapeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn from_navigation(navigation: Navigation) -> Self {
        Self {
            url: navigation.url,
            status: navigation.status,
            headers: navigation.headers,
            ..Default::default()
        }
    }
}

impl From<FetchedPage> for Response {
    fn from(page: FetchedPage) -> Self {
        Self {
            url: page.url,
            status: page.status,
            headers: page.headers,
            body: Some(page.body),
            ..Default::default()
        }
    }
}

/// Result of processing one job
#[derive(Debug, Default)]
pub struct JobOutput {
    /// Entry ready for output, if this job finishes one.
    pub result: Option<Entry>,
    pub children: Vec<Job>,
}

/// Collaborators shared by all jobs of one run
#[derive(Clone)]
pub struct JobContext {
    pub deduper: Arc<Deduper>,
    pub extractor: PageStateExtractor,
    pub paginator: ScrollPaginator,
    pub reviews: ReviewCollector,
    /// Review count a place needs before its review feed gets paginated.
    pub review_threshold: u32,
    pub cancel: CancellationToken,
}

/// Navigate `page` to `url` and get past a cookie consent page, giving up
/// as soon as the run is cancelled.
pub(crate) async fn open_page(
    page: &dyn BrowserPage,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Navigation> {
    if cancel.is_cancelled() {
        return Err(ScrapeError::Cancelled);
    }

    let mut navigation = tokio::select! {
        _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
        navigation = page.goto(url) => navigation?,
    };

    if reject_cookies_if_required(page, cancel).await? {
        if let Ok(current) = page.current_url().await {
            if !current.is_empty() {
                navigation.url = current;
            }
        }
    }

    Ok(navigation)
}

#[derive(Debug)]
pub enum Job {
    Search(SearchJob),
    Place(PlaceJob),
    Email(EmailJob),
}

impl Job {
    pub fn meta(&self) -> &JobMeta {
        match self {
            Job::Search(job) => &job.meta,
            Job::Place(job) => &job.meta,
            Job::Email(job) => &job.meta,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::Search(_) => "search",
            Job::Place(_) => "place",
            Job::Email(_) => "email",
        }
    }

    pub fn uses_browser(&self) -> bool {
        !matches!(self, Job::Email(_))
    }

    /// Whether [`Job::process`] runs even when fetching failed.
    pub fn process_on_fetch_error(&self) -> bool {
        matches!(self, Job::Email(_))
    }

    pub async fn browser_actions(&self, page: &dyn BrowserPage, ctx: &JobContext) -> Response {
        match self {
            Job::Search(job) => job.browser_actions(page, ctx).await,
            Job::Place(job) => job.browser_actions(page, ctx).await,
            Job::Email(job) => Response::failed(ScrapeError::Config(format!(
                "email job {} is not browser-driven",
                job.meta.id
            ))),
        }
    }

    pub fn process(&self, response: Response, ctx: &JobContext) -> Result<JobOutput> {
        match self {
            Job::Search(job) => job.process(response, ctx),
            Job::Place(job) => job.process(response),
            Job::Email(job) => Ok(job.process(response)),
        }
    }
}
