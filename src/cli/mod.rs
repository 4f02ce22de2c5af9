pub mod commands;

use std::path::PathBuf;

use clap::Parser;

use crate::config::{parse_duration, parse_geo, Config, ConfigError};

#[derive(Parser, Debug, Default)]
#[command(name = "mapscout")]
#[command(about = "Scrape business listings from map searches", long_about = None)]
pub struct Cli {
    /// File with one search query per line (default: stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to write results (default: stdout)
    #[arg(short, long)]
    pub results: Option<PathBuf>,

    /// Write JSON lines instead of CSV
    #[arg(long)]
    pub json: bool,

    /// Parallel workers
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Scroll rounds per search result list
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Language code, e.g. "en" or "de"
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Visit business websites to collect emails
    #[arg(long)]
    pub email: bool,

    /// Paginate review feeds
    #[arg(long)]
    pub extra_reviews: bool,

    /// Maximum reviews per place
    #[arg(long)]
    pub reviews_limit: Option<usize>,

    /// Map centre as "lat,lon"
    #[arg(long, allow_hyphen_values = true)]
    pub geo: Option<String>,

    /// Zoom level (0-21)
    #[arg(long)]
    pub zoom: Option<u8>,

    /// Stop after this long without progress (e.g. "30s", "5m", "1h")
    #[arg(long)]
    pub exit_on_inactivity: Option<String>,

    /// DevTools websocket of an already running browser
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Config file (default: ~/.config/mapscout/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Override `config` with every flag that was given.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        let crawl = &mut config.crawl;

        if let Some(concurrency) = self.concurrency {
            crawl.concurrency = concurrency;
        }
        if let Some(depth) = self.depth {
            crawl.depth = depth;
        }
        if let Some(ref lang) = self.lang {
            crawl.lang = lang.clone();
        }
        if self.email {
            crawl.email = true;
        }
        if self.extra_reviews {
            crawl.extra_reviews = true;
        }
        if let Some(limit) = self.reviews_limit {
            crawl.reviews_limit = limit;
        }
        if let Some(ref geo) = self.geo {
            crawl.geo = Some(parse_geo(geo)?);
        }
        if let Some(zoom) = self.zoom {
            crawl.zoom = zoom;
        }
        if let Some(ref window) = self.exit_on_inactivity {
            parse_duration(window)?;
            crawl.exit_on_inactivity = Some(window.clone());
        }
        if let Some(ref url) = self.remote_url {
            config.browser.remote_url = Some(url.clone());
        }

        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "mapscout",
            "--concurrency",
            "4",
            "--lang",
            "de",
            "--email",
            "--geo",
            "52.52,13.405",
            "--exit-on-inactivity",
            "3m",
        ]);

        let mut config = Config::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.crawl.concurrency, 4);
        assert_eq!(config.crawl.lang, "de");
        assert!(config.crawl.email);
        assert!(!config.crawl.extra_reviews);
        assert_eq!(config.crawl.geo, Some((52.52, 13.405)));
        assert_eq!(config.crawl.exit_on_inactivity.as_deref(), Some("3m"));
    }

    #[test]
    fn test_output_format_defaults_to_csv() {
        assert!(!Cli::parse_from(["mapscout"]).json);
        assert!(Cli::parse_from(["mapscout", "--json", "-r", "out.jsonl"]).json);
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let mut config = Config::default();
        config.crawl.depth = 3;
        config.crawl.email = true;

        Cli::parse_from(["mapscout"]).apply(&mut config).unwrap();

        assert_eq!(config.crawl.depth, 3);
        assert!(config.crawl.email);
    }

    #[test]
    fn test_negative_longitude() {
        let cli = Cli::parse_from(["mapscout", "--geo", "-33.86,151.2"]);
        let mut config = Config::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.crawl.geo, Some((-33.86, 151.2)));
    }

    #[test]
    fn test_invalid_flag_values() {
        let mut config = Config::default();
        let cli = Cli::parse_from(["mapscout", "--exit-on-inactivity", "later"]);
        assert!(cli.apply(&mut config).is_err());

        let cli = Cli::parse_from(["mapscout", "--zoom", "30"]);
        assert!(matches!(
            cli.apply(&mut Config::default()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
