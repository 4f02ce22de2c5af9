use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::{Result, ScrapeError};
use crate::scraper::config::BrowserConfig;
use crate::scraper::page::{BrowserPage, EvalValue, Navigation};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Chrome instance driven over the DevTools protocol
pub struct ChromeBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    config: BrowserConfig,
}

impl ChromeBrowser {
    /// Launch a local Chrome, or connect to `remote_url` when configured
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = match config.remote_url {
            Some(ref url) => {
                info!("Connecting to remote browser at {}", url);
                Browser::connect(url.as_str()).await.map_err(|e| {
                    ScrapeError::Browser(format!("Failed to connect to {}: {}", url, e))
                })?
            }
            None => {
                let mut builder = CdpBrowserConfig::builder()
                    .arg("--no-sandbox")
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage")
                    .arg("--disable-software-rasterizer")
                    .request_timeout(config.timeout());

                for arg in &config.chrome_args {
                    builder = builder.arg(arg.as_str());
                }

                if !config.headless {
                    builder = builder.with_head();
                }

                let browser_config = builder.build().map_err(|e| {
                    ScrapeError::Browser(format!("Failed to build browser config: {}", e))
                })?;

                Browser::launch(browser_config).await.map_err(|e| {
                    ScrapeError::Browser(format!(
                        "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                        e
                    ))
                })?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            config,
        })
    }

    /// Open a blank tab for one worker
    pub async fn new_page(&self) -> Result<ChromePage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to create page: {}", e)))?;

        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| ScrapeError::Browser(format!("Failed to set user agent: {}", e)))?;
        }

        Ok(ChromePage {
            page,
            timeout: self.config.timeout(),
        })
    }

    pub async fn close(mut self) -> Result<()> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Browser(format!("Failed to close browser: {}", e)));
        self.handler.abort();
        result
    }
}

/// A single browser tab
pub struct ChromePage {
    page: Page,
    timeout: Duration,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<Navigation> {
        // The timeout covers the navigation response too; a tab that never
        // answers would otherwise hold its worker forever.
        let load = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| ScrapeError::Navigation(format!("Failed to load {}: {}", url, e)))?;
            self.page
                .wait_for_navigation_response()
                .await
                .map_err(|e| ScrapeError::Navigation(format!("Navigation failed: {}", e)))
        };

        let request = tokio::time::timeout(self.timeout, load)
            .await
            .map_err(|_| ScrapeError::Navigation(format!("Timed out loading {}", url)))??;

        let mut navigation = Navigation {
            url: self.current_url().await.unwrap_or_else(|_| url.to_string()),
            status: 200,
            headers: Default::default(),
        };

        if let Some(response) = request.as_ref().and_then(|r| r.response.as_ref()) {
            navigation.status = u16::try_from(response.status).unwrap_or_default();
            if let Ok(serde_json::Value::Object(headers)) = serde_json::to_value(&response.headers) {
                navigation.headers = headers
                    .into_iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.to_ascii_lowercase(), v.to_string())))
                    .collect();
            }
        }

        Ok(navigation)
    }

    async fn evaluate(&self, script: &str) -> Result<EvalValue> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ScrapeError::Browser)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Script execution failed: {}", e)))?;

        Ok(result
            .value()
            .cloned()
            .map(EvalValue::from)
            .unwrap_or(EvalValue::Null))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            ScrapeError::Browser(format!("Timed out waiting for selector {}", selector))
        })
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to read content: {}", e)))
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| ScrapeError::Browser(format!("Failed to read url: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to close page: {}", e)))
    }
}
