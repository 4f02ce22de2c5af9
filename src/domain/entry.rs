use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::{Result, ScrapeError};

/// Index of the place record inside the page-state payload.
const PLACE_INDEX: usize = 6;

/// Website hosts that never carry a contact address worth crawling.
const SKIPPED_WEBSITE_HOSTS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
    pub author_name: String,
    pub author_url: String,
    pub rating: f64,
    /// Free text such as "3 weeks ago", never parsed.
    pub relative_time: String,
    pub text: String,
}

/// A business listing extracted from a place page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub category: String,
    pub categories: Vec<String>,
    pub address: String,
    pub link: String,
    pub coordinates: Option<Coordinates>,
    pub review_count: u32,
    pub rating: Option<f64>,
    pub phone: String,
    pub data_id: String,
    pub website: Option<String>,
    pub reviews: Vec<Review>,
    pub emails: BTreeSet<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Entry {
    /// Build an entry from the raw page-state payload.
    ///
    /// Only the outer shape is checked. Individual fields that are missing
    /// or of an unexpected type fall back to empty values, since the
    /// payload layout shifts between listings.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(raw)?;
        let place = place_record(&root)?;

        let title = string_at(place, &[11]);
        let categories: Vec<String> = place
            .get(13)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let full_address = string_at(place, &[18]);
        let address = full_address
            .strip_prefix(&format!("{},", title))
            .unwrap_or(&full_address)
            .trim()
            .to_string();

        let website = Some(string_at(place, &[7, 0])).filter(|w| !w.is_empty());

        let coordinates = match (float_at(place, &[9, 2]), float_at(place, &[9, 3])) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(Self {
            id: String::new(),
            category: categories.first().cloned().unwrap_or_default(),
            categories,
            address,
            link: string_at(place, &[27]),
            coordinates,
            review_count: review_count_of(place),
            rating: float_at(place, &[4, 7]),
            phone: string_at(place, &[178, 0, 0]),
            data_id: string_at(place, &[10]),
            website,
            reviews: Vec::new(),
            emails: BTreeSet::new(),
            fetched_at: Utc::now(),
            title,
        })
    }

    /// Fill in the fields that come from the owning job rather than the
    /// payload. `link` is never empty afterwards.
    pub fn finalize(&mut self, id: &str, source_url: &str) {
        self.id = id.to_string();
        if self.link.trim().is_empty() {
            self.link = source_url.to_string();
        }
    }

    pub fn add_review(&mut self, review: Review) {
        self.reviews.push(review);
    }

    /// Whether the website is worth an email crawl.
    pub fn is_website_valid_for_email(&self) -> bool {
        let Some(website) = self.website.as_deref() else {
            return false;
        };

        let Ok(url) = url::Url::parse(website.trim()) else {
            return false;
        };

        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        !SKIPPED_WEBSITE_HOSTS
            .iter()
            .any(|skipped| host == *skipped || host.ends_with(&format!(".{}", skipped)))
    }
}

/// Read only the review count from a raw payload.
///
/// Used to decide whether paginating the review feed is worthwhile
/// without building a full [`Entry`]. Any failure reads as zero.
pub fn review_count_from_json(raw: &[u8]) -> u32 {
    serde_json::from_slice::<Value>(raw)
        .ok()
        .as_ref()
        .and_then(|root| place_record(root).ok())
        .map(review_count_of)
        .unwrap_or(0)
}

fn place_record(root: &Value) -> Result<&Value> {
    let items = root
        .as_array()
        .ok_or_else(|| ScrapeError::Extraction("page state is not an array".into()))?;

    items
        .get(PLACE_INDEX)
        .filter(|place| place.is_array())
        .ok_or_else(|| ScrapeError::Extraction("page state has no place record".into()))
}

fn review_count_of(place: &Value) -> u32 {
    float_at(place, &[4, 8])
        .filter(|count| *count >= 0.0)
        .map(|count| count as u32)
        .unwrap_or(0)
}

fn value_at<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, index| current.as_array()?.get(*index))
}

fn string_at(value: &Value, path: &[usize]) -> String {
    value_at(value, path)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn float_at(value: &Value, path: &[usize]) -> Option<f64> {
    value_at(value, path).and_then(Value::as_f64)
}
