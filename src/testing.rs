//! In-memory [`BrowserPage`] for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::app::{Result, ScrapeError};
use crate::scraper::{BrowserPage, EvalValue, Navigation, REJECT_COOKIES_SCRIPT};

/// Page that replays queued script results in order.
#[derive(Default)]
pub struct ScriptedPage {
    evals: Mutex<VecDeque<std::result::Result<EvalValue, String>>>,
    scripts: Mutex<Vec<String>>,
    visited: Mutex<Vec<String>>,
    selectors: HashSet<String>,
    html: String,
    url: Mutex<String>,
    final_url: Option<String>,
    goto_error: Option<String>,
    goto_delay: Option<Duration>,
    consent_wall: bool,
    /// Where the consent page sends the browser once cookies are rejected.
    behind_consent: Mutex<Option<String>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selectors.insert(selector.to_string());
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    /// Pretend navigation always ends up at `url` (e.g. a redirect).
    pub fn with_final_url(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    pub fn with_goto_error(mut self, message: &str) -> Self {
        self.goto_error = Some(message.to_string());
        self
    }

    /// Navigation takes `delay` before it lands.
    pub fn with_goto_delay(mut self, delay: Duration) -> Self {
        self.goto_delay = Some(delay);
        self
    }

    /// Navigation lands on a cookie consent page first; running the reject
    /// script forwards to the requested page.
    pub fn with_consent_wall(mut self) -> Self {
        self.consent_wall = true;
        self
    }

    pub fn push(self, value: EvalValue) -> Self {
        self.evals.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn push_json(self, value: Value) -> Self {
        self.push(EvalValue::from(value))
    }

    pub fn push_error(self, message: &str) -> Self {
        self.evals.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn eval_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.evals.lock().unwrap().len()
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<Navigation> {
        self.visited.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.goto_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref message) = self.goto_error {
            return Err(ScrapeError::Navigation(message.clone()));
        }

        let mut landed = self.final_url.clone().unwrap_or_else(|| url.to_string());
        if self.consent_wall {
            *self.behind_consent.lock().unwrap() = Some(landed.clone());
            landed = format!("https://consent.google.com/ml?continue={}", landed);
        }
        *self.url.lock().unwrap() = landed.clone();
        Ok(Navigation {
            url: landed,
            status: 200,
            headers: Default::default(),
        })
    }

    async fn evaluate(&self, script: &str) -> Result<EvalValue> {
        self.scripts.lock().unwrap().push(script.to_string());
        if script == REJECT_COOKIES_SCRIPT {
            if let Some(target) = self.behind_consent.lock().unwrap().take() {
                *self.url.lock().unwrap() = target;
                return Ok(EvalValue::Other(Value::Bool(true)));
            }
        }
        match self.evals.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(ScrapeError::Browser(message)),
            None => Err(ScrapeError::Browser("no scripted result left".into())),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        if self.selectors.contains(selector) {
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(ScrapeError::Browser(format!("selector {} not found", selector)))
        }
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
