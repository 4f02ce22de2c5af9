use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the browser driving place and search pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// DevTools websocket of an already running browser (e.g. "ws://localhost:9222").
    /// When set, no local browser is launched.
    pub remote_url: Option<String>,

    /// Navigation timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Additional Chrome arguments
    pub chrome_args: Vec<String>,

    /// User agent string to use
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            remote_url: None,
            timeout_secs: 30,
            chrome_args: Vec::new(),
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

impl BrowserConfig {
    /// Get the navigation timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tuning for scroll-driven pagination of feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Wait after the first scroll round in milliseconds (default: 200)
    pub base_wait_ms: u64,

    /// Multiplier applied to the wait after every round (default: 1.3)
    pub wait_growth: f64,

    /// Upper bound for the per-round wait in milliseconds (default: 3000)
    pub max_wait_ms: u64,

    /// Attempts per round when the scroll script fails (default: 3)
    pub round_attempts: u32,

    /// Pause between failed attempts of one round in milliseconds (default: 5000)
    pub retry_backoff_ms: u64,

    /// How long to wait for the feed container in milliseconds (default: 15000)
    pub container_timeout_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            base_wait_ms: 200,
            wait_growth: 1.3,
            max_wait_ms: 3000,
            round_attempts: 3,
            retry_backoff_ms: 5000,
            container_timeout_ms: 15_000,
        }
    }
}

impl ScrollConfig {
    pub fn base_wait(&self) -> Duration {
        Duration::from_millis(self.base_wait_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn container_timeout(&self) -> Duration {
        Duration::from_millis(self.container_timeout_ms)
    }

    /// Wait to use after `current`, grown and capped.
    ///
    /// Saturates at the cap when the growth factor overflows.
    pub fn next_wait(&self, current: Duration) -> Duration {
        let max_wait = self.max_wait();
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.wait_growth.max(1.0))
            .unwrap_or(max_wait);
        grown.min(max_wait).max(current.min(max_wait))
    }
}

/// Retry policy of the page-state extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Evaluation attempts before giving up (default: 3)
    pub attempts: u32,

    /// Pause between attempts in milliseconds (default: 1000)
    pub retry_delay_ms: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl ExtractConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_browser_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.remote_url.is_none());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.user_agent.is_some());
    }

    #[test]
    fn test_default_scroll_config() {
        let config = ScrollConfig::default();
        assert_eq!(config.base_wait(), Duration::from_millis(200));
        assert_eq!(config.max_wait(), Duration::from_millis(3000));
        assert_eq!(config.round_attempts, 3);
        assert_eq!(config.retry_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_wait_growth_is_monotonic_and_capped() {
        let config = ScrollConfig::default();
        let mut wait = config.base_wait();
        let mut previous = wait;
        for _ in 0..50 {
            wait = config.next_wait(wait);
            assert!(wait >= previous);
            assert!(wait <= config.max_wait());
            previous = wait;
        }
        assert_eq!(wait, config.max_wait());
    }

    #[test]
    fn test_wait_growth_below_one_does_not_shrink() {
        let config = ScrollConfig {
            wait_growth: 0.5,
            ..Default::default()
        };
        let wait = config.next_wait(Duration::from_millis(400));
        assert_eq!(wait, Duration::from_millis(400));
    }

    #[test]
    fn test_unbounded_growth_saturates_at_cap() {
        for growth in [f64::INFINITY, 1e20] {
            let config = ScrollConfig {
                wait_growth: growth,
                ..Default::default()
            };
            assert_eq!(config.next_wait(config.base_wait()), config.max_wait());
        }
    }

    #[test]
    fn test_default_extract_config() {
        let config = ExtractConfig::default();
        assert_eq!(config.attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }
}
