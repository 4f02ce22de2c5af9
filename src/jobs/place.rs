use tracing::{debug, info, warn};

use crate::app::{Result, ScrapeError};
use crate::domain::{review_count_from_json, Entry, Review};
use crate::jobs::{open_page, EmailJob, Job, JobContext, JobMeta, JobOutput, Priority, Response, META_JSON, META_REVIEWS};
use crate::scraper::BrowserPage;

const PLACE_MAX_RETRIES: u32 = 3;

/// Per-place behaviour, decided once per run
#[derive(Debug, Clone)]
pub struct PlaceOptions {
    pub lang: String,
    pub extract_email: bool,
    pub extra_reviews: bool,
    /// Upper bound of reviews collected per place; 0 disables collection.
    pub reviews_limit: usize,
}

impl Default for PlaceOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            extract_email: false,
            extra_reviews: false,
            reviews_limit: 300,
        }
    }
}

/// Extracts one business listing from its place page
#[derive(Debug, Clone)]
pub struct PlaceJob {
    pub meta: JobMeta,
    pub options: PlaceOptions,
}

impl PlaceJob {
    pub fn new(parent_id: &str, url: &str, options: PlaceOptions) -> Self {
        let meta = JobMeta::new(parent_id, url, Priority::Medium, PLACE_MAX_RETRIES)
            .with_param("hl", &options.lang);
        Self { meta, options }
    }

    pub async fn browser_actions(&self, page: &dyn BrowserPage, ctx: &JobContext) -> Response {
        let url = self.meta.full_url();
        let navigation = match open_page(page, &url, &ctx.cancel).await {
            Ok(navigation) => navigation,
            Err(e) => return Response::failed(e),
        };
        let mut response = Response::from_navigation(navigation);

        let raw = match ctx.extractor.extract(page, &ctx.cancel).await {
            Ok(raw) => raw,
            Err(e) => return Response::failed(e),
        };

        if self.options.extra_reviews && self.options.reviews_limit > 0 {
            let review_count = review_count_from_json(&raw);
            if review_count > ctx.review_threshold {
                self.collect_reviews(page, ctx, &mut response).await;
            } else {
                debug!(review_count, "Too few reviews to paginate");
            }
        }

        response.meta.insert(META_JSON, raw);
        response
    }

    async fn collect_reviews(&self, page: &dyn BrowserPage, ctx: &JobContext, response: &mut Response) {
        match ctx
            .reviews
            .collect(page, self.options.reviews_limit, &ctx.cancel)
            .await
        {
            Ok(reviews) => {
                info!("Collected {} reviews from {}", reviews.len(), self.meta.url);
                match serde_json::to_vec(&reviews) {
                    Ok(encoded) => {
                        response.meta.insert(META_REVIEWS, encoded);
                    }
                    Err(e) => warn!("Failed to encode reviews: {}", e),
                }
            }
            Err(e) => warn!("Failed to collect reviews from {}: {}", self.meta.url, e),
        }
    }

    /// Build the entry, and hand it to an email job when its website
    /// qualifies for one.
    pub fn process(&self, response: Response) -> Result<JobOutput> {
        let raw = response
            .meta
            .get(META_JSON)
            .ok_or_else(|| ScrapeError::Extraction("response carries no page state".into()))?;

        let mut entry = Entry::from_json(raw)?;
        entry.finalize(&self.meta.parent_id, &self.meta.full_url());

        if let Some(encoded) = response.meta.get(META_REVIEWS) {
            match serde_json::from_slice::<Vec<Review>>(encoded) {
                Ok(reviews) => reviews.into_iter().for_each(|r| entry.add_review(r)),
                Err(e) => warn!("Discarding undecodable reviews: {}", e),
            }
        }

        if self.options.extract_email && entry.is_website_valid_for_email() {
            let email_job = EmailJob::new(&self.meta.parent_id, entry);
            return Ok(JobOutput {
                result: None,
                children: vec![Job::Email(email_job)],
            });
        }

        Ok(JobOutput {
            result: Some(entry),
            children: Vec::new(),
        })
    }
}
