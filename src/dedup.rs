//! Run-scoped deduplication of job targets.
//!
//! A [`Deduper`] is shared by every worker of one run. Identities are
//! claimed right before a child job is built, so two workers that discover
//! the same place concurrently produce exactly one job.

use std::collections::HashSet;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use url::Url;

#[derive(Debug, Default)]
pub struct Deduper {
    seen: Mutex<HashSet<String>>,
}

impl Deduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identity` and return true if it was not seen before.
    ///
    /// Membership is permanent for the lifetime of the deduper.
    pub fn try_claim(&self, identity: &str) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.insert(identity.to_string())
    }

    pub fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive the dedup key of a place URL.
///
/// Query string and fragment carry session noise (`authuser`, `entry`,
/// tracking params) so only host and path participate. Unparseable input
/// falls back to the trimmed raw string.
pub fn place_key(raw_url: &str) -> String {
    let normalized = match Url::parse(raw_url.trim()) {
        Ok(url) => format!(
            "{}{}",
            url.host_str().unwrap_or_default().to_ascii_lowercase(),
            url.path().trim_end_matches('/')
        ),
        Err(_) => raw_url.trim().to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
