use tracing::{debug, info};
use url::Url;

use crate::app::{Result, ScrapeError};
use crate::jobs::{Job, PlaceOptions, SearchJob};

const SEARCH_BASE_URL: &str = "https://www.google.com/maps/search/";

/// Separates a query from its custom id on a seed line.
const CUSTOM_ID_MARKER: &str = "#!#";

/// How seed queries become search jobs
#[derive(Debug, Clone)]
pub struct SeedOptions {
    /// Map centre as (latitude, longitude).
    pub geo: Option<(f64, f64)>,
    pub zoom: u8,
    pub max_depth: usize,
    pub place_options: PlaceOptions,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            geo: None,
            zoom: 15,
            max_depth: 10,
            place_options: PlaceOptions::default(),
        }
    }
}

/// A query and its optional custom id, or `None` for blank and comment lines.
pub fn parse_seed_line(line: &str) -> Option<(String, Option<String>)> {
    let line = line.trim();

    if let Some((query, id)) = line.split_once(CUSTOM_ID_MARKER) {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let id = id.trim();
        let id = (!id.is_empty()).then(|| id.to_string());
        return Some((query.to_string(), id));
    }

    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some((line.to_string(), None))
}

/// Search page URL for `query`, centred on `geo` when given.
pub fn search_url(query: &str, geo: Option<(f64, f64)>, zoom: u8) -> Result<String> {
    let mut url = Url::parse(SEARCH_BASE_URL)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ScrapeError::Config(format!("{} cannot be a base", SEARCH_BASE_URL)))?;
        segments.pop_if_empty().push(query);
        if let Some((lat, lon)) = geo {
            segments.push(&format!("@{},{},{}z", lat, lon, zoom));
        }
    }
    Ok(url.to_string())
}

/// One search job per query line of `input`.
pub fn create_seed_jobs(input: &str, options: &SeedOptions) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();

    for line in input.lines() {
        let Some((query, id)) = parse_seed_line(line) else {
            continue;
        };

        let url = search_url(&query, options.geo, options.zoom)?;
        debug!("Seed {:?} -> {}", query, url);

        jobs.push(Job::Search(SearchJob::new(
            id,
            &query,
            &url,
            options.max_depth,
            options.place_options.clone(),
        )));
    }

    info!("Created {} seed jobs", jobs.len());
    Ok(jobs)
}
