//! Configuration management for mapscout.
//!
//! Configuration is read from `~/.config/mapscout/config.toml` (or the path
//! given with `--config`). If the default file doesn't exist, a commented
//! default is created. Command-line flags override file values.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::HttpConfig;
use crate::jobs::{PlaceOptions, SeedOptions};
use crate::scraper::{BrowserConfig, ExtractConfig, ScrollConfig, REVIEWS_FEED_SELECTOR};

/// Largest accepted per-round growth of the scroll wait.
const MAX_WAIT_GROWTH: f64 = 10.0;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub crawl: CrawlConfig,
    pub scroll: ScrollConfig,
    pub extract: ExtractConfig,
    pub http: HttpConfig,
}

/// What to crawl and how much of it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Parallel workers, one browser page each
    pub concurrency: usize,

    /// Language code sent as `hl`
    pub lang: String,

    /// Scroll rounds on a search result feed
    pub depth: usize,

    /// Visit business websites to look for emails
    pub email: bool,

    /// Paginate review feeds beyond the reviews embedded in the page
    pub extra_reviews: bool,

    pub reviews_limit: usize,

    /// Places with at most this many reviews skip review pagination
    pub review_threshold: u32,

    pub review_feed_selector: String,

    /// Map centre as `[latitude, longitude]`
    pub geo: Option<(f64, f64)>,

    pub zoom: u8,

    /// Stop the run after this long without progress, e.g. "5m"
    pub exit_on_inactivity: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            lang: "en".to_string(),
            depth: 10,
            email: false,
            extra_reviews: false,
            reviews_limit: 300,
            review_threshold: 8,
            review_feed_selector: REVIEWS_FEED_SELECTOR.to_string(),
            geo: None,
            zoom: 15,
            exit_on_inactivity: None,
        }
    }
}

impl CrawlConfig {
    pub fn inactivity(&self) -> Result<Option<Duration>, ConfigError> {
        self.exit_on_inactivity
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    pub fn place_options(&self) -> PlaceOptions {
        PlaceOptions {
            lang: self.lang.clone(),
            extract_email: self.email,
            extra_reviews: self.extra_reviews,
            reviews_limit: self.reviews_limit,
        }
    }

    pub fn seed_options(&self) -> SeedOptions {
        SeedOptions {
            geo: self.geo,
            zoom: self.zoom,
            max_depth: self.depth,
            place_options: self.place_options(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// An explicit path must exist. A missing default file is created with
    /// comments. Missing fields use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_config_path()?;
                if !path.exists() {
                    Self::create_default_config(&path)?;
                    return Ok(Self::default());
                }
                path
            }
        };

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/mapscout/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("mapscout").join("config.toml"))
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.concurrency < 1 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.crawl.depth < 1 {
            return Err(ConfigError::Invalid("depth must be at least 1".into()));
        }
        if self.crawl.zoom > 21 {
            return Err(ConfigError::Invalid(format!(
                "zoom must be between 0 and 21, got {}",
                self.crawl.zoom
            )));
        }
        if !(1.0..=MAX_WAIT_GROWTH).contains(&self.scroll.wait_growth) {
            return Err(ConfigError::Invalid(format!(
                "scroll wait_growth must be between 1.0 and {}, got {}",
                MAX_WAIT_GROWTH,
                self.scroll.wait_growth
            )));
        }
        if self.crawl.review_feed_selector.trim().is_empty() {
            return Err(ConfigError::Invalid("review_feed_selector is empty".into()));
        }
        self.crawl.inactivity()?;
        Ok(())
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# mapscout configuration
#
# Every value below is the built-in default. Command-line flags take
# precedence over this file.

[browser]
# Run Chrome without a window
headless = true

# Navigation and CDP request timeout in seconds
timeout_secs = 30

# Connect to an already running browser instead of launching one
# remote_url = "ws://127.0.0.1:9222/devtools/browser/<id>"

# Extra Chrome command-line switches
chrome_args = []

[crawl]
# Parallel workers (one browser tab each)
concurrency = 2

# Language code for result pages
lang = "en"

# Scroll rounds per search result list
depth = 10

# Visit business websites and collect email addresses
email = false

# Scroll review feeds to collect more reviews
extra_reviews = false
reviews_limit = 300

# Places with this many reviews or fewer are not paginated
review_threshold = 8
review_feed_selector = "div.m6QErb.DxyBCb.kA9KIf.dS8AEf"

# Map centre and zoom level (0-21)
# geo = [40.7128, -74.006]
zoom = 15

# Stop when nothing happened for this long ("30s", "5m", "1h")
# exit_on_inactivity = "5m"

[scroll]
base_wait_ms = 200
wait_growth = 1.3
max_wait_ms = 3000
round_attempts = 3
retry_backoff_ms = 5000
container_timeout_ms = 15000

[extract]
attempts = 3
retry_delay_ms = 1000

[http]
timeout_secs = 10
"##
    }
}

/// Parse durations such as `90`, `30s`, `5m` or `1h`; bare numbers are seconds.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::Invalid(format!("invalid duration: {:?}", value));

    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let number: u64 = number.parse().map_err(|_| invalid())?;

    let duration = match unit.trim() {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(number * 60),
        "h" => Duration::from_secs(number * 3600),
        _ => return Err(invalid()),
    };

    if duration.is_zero() {
        return Err(invalid());
    }
    Ok(duration)
}

/// Parse `"lat,lon"` into a coordinate pair.
pub fn parse_geo(value: &str) -> Result<(f64, f64), ConfigError> {
    let invalid = || ConfigError::Invalid(format!("invalid coordinates: {:?}", value));

    let (lat, lon) = value.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(invalid());
    }
    Ok((lat, lon))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_deserializes() {
        let config: Config = toml::from_str(Config::default_config_content())
            .expect("Default config should be valid TOML");

        assert_eq!(config.crawl.concurrency, 2);
        assert_eq!(config.crawl.review_threshold, 8);
        assert_eq!(config.scroll.max_wait_ms, 3000);
        assert_eq!(config.extract.attempts, 3);
        assert!(config.browser.headless);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_config() {
        let content = r#"
[crawl]
lang = "de"
geo = [52.52, 13.405]
exit_on_inactivity = "5m"
"#;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.crawl.lang, "de");
        assert_eq!(config.crawl.geo, Some((52.52, 13.405)));
        assert_eq!(config.crawl.inactivity().unwrap(), Some(Duration::from_secs(300)));
        // untouched sections keep their defaults
        assert_eq!(config.crawl.depth, 10);
        assert_eq!(config.scroll.base_wait_ms, 200);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[crawl]\nconcurrency = 6\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.crawl.concurrency, 6);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[crawl\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.crawl.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.zoom = 22;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scroll.wait_growth = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scroll.wait_growth = 1e20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.exit_on_inactivity = Some("soon".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_infinite_wait_growth_is_rejected() {
        let config: Config = toml::from_str("[scroll]\nwait_growth = inf\n").unwrap();
        assert!(config.scroll.wait_growth.is_infinite());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: Config = toml::from_str("[scroll]\nwait_growth = nan\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("3d").is_err());
    }

    #[test]
    fn test_parse_geo() {
        assert_eq!(parse_geo("40.7128, -74.006").unwrap(), (40.7128, -74.006));
        assert!(parse_geo("40.7128").is_err());
        assert!(parse_geo("91,0").is_err());
        assert!(parse_geo("a,b").is_err());
    }

    #[test]
    fn test_seed_options_follow_crawl_config() {
        let crawl = CrawlConfig {
            email: true,
            lang: "fr".into(),
            depth: 3,
            ..Default::default()
        };
        let options = crawl.seed_options();
        assert_eq!(options.max_depth, 3);
        assert!(options.place_options.extract_email);
        assert_eq!(options.place_options.lang, "fr");
    }
}
