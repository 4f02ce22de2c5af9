use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::app::{Result, ScrapeError};
use crate::scraper::page::{BrowserPage, EvalValue};

/// How long the consent page gets to hand back to the requested page.
const CONSENT_LEAVE_TIMEOUT: Duration = Duration::from_secs(10);
const CONSENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Clicks the reject button of a cookie consent form.
///
/// Evaluates to `true` when a button was clicked.
pub const REJECT_COOKIES_SCRIPT: &str = r#"
(() => {
    const button =
        document.querySelector('form[action*="consent.google"] button[aria-label*="Reject"]') ||
        document.querySelector('button[aria-label="Reject all"]') ||
        document.querySelector('form[action*="consent.google"] button');
    if (!button) {
        return false;
    }
    button.click();
    return true;
})()
"#;

/// Whether `url` is a cookie consent interstitial.
pub fn is_consent_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.starts_with("consent.")))
        .unwrap_or(false)
}

/// Rejects cookies when navigation landed on a consent page, then waits
/// until the browser is sent on to the requested page.
///
/// Returns whether a consent page was dismissed.
pub async fn reject_cookies_if_required(
    page: &dyn BrowserPage,
    cancel: &CancellationToken,
) -> Result<bool> {
    let current = page.current_url().await?;
    if !is_consent_url(&current) {
        return Ok(false);
    }

    debug!("Landed on consent page {}", current);
    let clicked = page.evaluate(REJECT_COOKIES_SCRIPT).await?;
    if clicked != EvalValue::Other(serde_json::Value::Bool(true)) {
        return Err(ScrapeError::Navigation(format!(
            "No reject button on consent page {}",
            current
        )));
    }

    let left = async {
        loop {
            match page.current_url().await {
                Ok(url) if !is_consent_url(&url) => return url,
                _ => tokio::time::sleep(CONSENT_POLL_INTERVAL).await,
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
        left = tokio::time::timeout(CONSENT_LEAVE_TIMEOUT, left) => {
            let url = left.map_err(|_| {
                ScrapeError::Navigation(format!("Consent page {} did not redirect", current))
            })?;
            info!("Rejected cookies, continuing at {}", url);
            Ok(true)
        }
    }
}
