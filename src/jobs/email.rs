use std::collections::BTreeSet;
use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::domain::Entry;
use crate::jobs::{JobMeta, JobOutput, Priority, Response};

static EMAIL_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,24}")
        .expect("email pattern is valid")
});

static EMAIL_EXACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,24}$")
        .expect("email pattern is valid")
});

static MAILTO_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href^='mailto:']").expect("mailto selector is valid")
});

/// Asset names such as `logo@2x.png` look like addresses.
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".css", ".js"];

/// Looks up contact addresses on a business website
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub meta: JobMeta,
    pub entry: Entry,
}

impl EmailJob {
    /// Email jobs never retry so that dead websites cannot stall a run.
    pub fn new(parent_id: &str, entry: Entry) -> Self {
        let website = entry.website.clone().unwrap_or_default();
        Self {
            meta: JobMeta::new(parent_id, &website, Priority::High, 0),
            entry,
        }
    }

    /// Attach the addresses found in the response. A failed fetch still
    /// yields the entry, just without emails.
    pub fn process(&self, response: Response) -> JobOutput {
        let mut entry = self.entry.clone();

        match (&response.error, &response.body) {
            (None, Some(body)) => {
                let emails = extract_emails(body);
                info!("Found {} emails on {}", emails.len(), self.meta.url);
                entry.emails.extend(emails);
            }
            (Some(e), _) => debug!("Email fetch for {} failed: {}", self.meta.url, e),
            (None, None) => debug!("Email fetch for {} returned no body", self.meta.url),
        }

        JobOutput {
            result: Some(entry),
            children: Vec::new(),
        }
    }
}

/// Addresses from `mailto:` links, or from the page text when there are none.
pub fn extract_emails(html: &str) -> BTreeSet<String> {
    let emails = mailto_emails(html);
    if !emails.is_empty() {
        return emails;
    }
    text_emails(html)
}

fn mailto_emails(html: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    document
        .select(&MAILTO_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            let address = href.trim_start_matches("mailto:");
            let address = address.split('?').next().unwrap_or_default();
            valid_email(&address.replace("%40", "@"))
        })
        .collect()
}

fn text_emails(html: &str) -> BTreeSet<String> {
    let decoded = decode_html_entities(html);
    EMAIL_CANDIDATE
        .find_iter(&decoded)
        .filter_map(|m| valid_email(m.as_str()))
        .collect()
}

/// Normalized address if `candidate` is a plausible email.
pub fn valid_email(candidate: &str) -> Option<String> {
    let email = candidate.trim().to_ascii_lowercase();
    if !EMAIL_EXACT.is_match(&email) {
        return None;
    }
    if ASSET_SUFFIXES.iter().any(|suffix| email.ends_with(suffix)) {
        return None;
    }
    Some(email)
}
