//! # mapscout
//!
//! Extracts business listings from map searches by driving a headless
//! browser and reading the page state the map application embeds.
//!
//! ## Architecture
//!
//! ```text
//! seed queries → SearchJob → PlaceJob → EmailJob → ResultWriter
//!                    │           │
//!                    └── Deduper └── ExitMonitor (expected / completed)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # One query per line, optional custom id after "#!#"
//! echo "pizza new york #!# nyc-pizza" > queries.txt
//!
//! mapscout --input queries.txt --results entries.jsonl --email
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Run context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration
//! - [`crawler`]: Worker pool and priority queue
//! - [`dedup`]: Run-scoped duplicate detection
//! - [`domain`]: Entry and Review records
//! - [`exiter`]: Completion and inactivity tracking
//! - [`fetcher`]: Plain HTTP fetching for business websites
//! - [`jobs`]: Job variants and their fan-out
//! - [`output`]: Result writers
//! - [`scraper`]: Browser driver, page-state extraction, scroll pagination

/// Run context and error handling.
///
/// [`RunContext`](app::RunContext) owns the state of exactly one run:
/// dedup set, exit monitor and cancellation token.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/mapscout/config.toml`.
pub mod config;

pub mod crawler;

/// Thread-safe claim set keyed by place identity.
pub mod dedup;

/// Core domain models.
///
/// - [`Entry`](domain::Entry): one business listing
/// - [`Review`](domain::Review): one review of a listing
pub mod domain;

pub mod exiter;

/// HTTP fetching without a browser.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for page downloads
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

pub mod jobs;

/// CSV and JSON lines output.
pub mod output;

/// Headless Chrome via chromiumoxide, plus the extraction and pagination
/// logic that runs against any [`BrowserPage`](scraper::BrowserPage).
pub mod scraper;

#[cfg(test)]
mod testing;
