pub mod http_fetcher;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::{HttpConfig, HttpFetcher};

/// A page downloaded without a browser
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// URL after redirects
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}
