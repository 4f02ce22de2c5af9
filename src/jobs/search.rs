use std::sync::LazyLock;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::app::{Result, ScrapeError};
use crate::dedup::place_key;
use crate::jobs::{open_page, Job, JobContext, JobMeta, JobOutput, PlaceJob, PlaceOptions, Priority, Response};
use crate::scraper::{BrowserPage, ScrollStop, RESULTS_FEED_SELECTOR};

const SEARCH_MAX_RETRIES: u32 = 3;

/// How long a search page gets to show its result feed before the job
/// checks whether it landed on a single place instead.
const FEED_APPEAR_TIMEOUT: Duration = Duration::from_secs(2);

static RESULT_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[role='feed'] div[jsaction] > a").expect("result selector is valid")
});

/// Lists the places matching one query
#[derive(Debug, Clone)]
pub struct SearchJob {
    pub meta: JobMeta,
    pub query: String,
    /// Scroll rounds allowed on the result feed.
    pub max_depth: usize,
    pub place_options: PlaceOptions,
}

impl SearchJob {
    /// `id` overrides the generated job id; entries found through this
    /// search carry it as their id.
    pub fn new(
        id: Option<String>,
        query: &str,
        url: &str,
        max_depth: usize,
        place_options: PlaceOptions,
    ) -> Self {
        let mut meta = JobMeta::new("", url, Priority::Low, SEARCH_MAX_RETRIES)
            .with_param("hl", &place_options.lang);
        if let Some(id) = id {
            meta.id = id;
        }

        Self {
            meta,
            query: query.to_string(),
            max_depth,
            place_options,
        }
    }

    pub async fn browser_actions(&self, page: &dyn BrowserPage, ctx: &JobContext) -> Response {
        let navigation = match open_page(page, &self.meta.full_url(), &ctx.cancel).await {
            Ok(navigation) => navigation,
            Err(e) => return Response::failed(e),
        };
        let mut response = Response::from_navigation(navigation);

        if page
            .wait_for_selector(RESULTS_FEED_SELECTOR, FEED_APPEAR_TIMEOUT)
            .await
            .is_err()
        {
            debug!("No result feed yet for {:?}", self.query);
        }

        if let Ok(current) = page.current_url().await {
            if !current.is_empty() {
                response.url = current;
            }
        }

        if !is_place_url(&response.url) {
            match ctx
                .paginator
                .scroll(page, RESULTS_FEED_SELECTOR, self.max_depth, &ctx.cancel)
                .await
            {
                Ok(outcome) if outcome.stop == ScrollStop::Cancelled => {
                    return Response::failed(ScrapeError::Cancelled);
                }
                Ok(outcome) => {
                    debug!(rounds = outcome.iterations, "Scrolled results of {:?}", self.query);
                }
                Err(e) => return Response::failed(e),
            }
        }

        match page.content().await {
            Ok(body) => response.body = Some(body),
            Err(e) => return Response::failed(e),
        }

        response
    }

    /// One place job per result link not claimed by an earlier job.
    pub fn process(&self, response: Response, ctx: &JobContext) -> Result<JobOutput> {
        let links = if is_place_url(&response.url) {
            vec![response.url.clone()]
        } else {
            let body = response
                .body
                .as_deref()
                .ok_or_else(|| ScrapeError::Extraction("search response has no body".into()))?;
            result_links(body, &response.url)
        };

        let found = links.len();
        let children: Vec<Job> = links
            .into_iter()
            .filter(|link| ctx.deduper.try_claim(&place_key(link)))
            .map(|link| Job::Place(PlaceJob::new(&self.meta.id, &link, self.place_options.clone())))
            .collect();

        info!(
            "Search {:?} found {} places, {} new",
            self.query,
            found,
            children.len()
        );

        Ok(JobOutput {
            result: None,
            children,
        })
    }
}

fn is_place_url(url: &str) -> bool {
    url.contains("/maps/place/")
}

/// Absolute result links in document order, without repeats.
fn result_links(html: &str, base: &str) -> Vec<String> {
    let base = Url::parse(base).ok();
    let document = Html::parse_document(html);

    let mut links: Vec<String> = Vec::new();
    for href in document
        .select(&RESULT_LINKS)
        .filter_map(|a| a.value().attr("href"))
    {
        let absolute = match &base {
            Some(base) => base.join(href).map(|u| u.to_string()).ok(),
            None => Url::parse(href).map(|u| u.to_string()).ok(),
        };
        if let Some(link) = absolute {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    links
}
