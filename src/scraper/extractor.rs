use serde::de::IgnoredAny;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{Result, ScrapeError};
use crate::scraper::config::ExtractConfig;
use crate::scraper::page::{BrowserPage, EvalValue};

/// Anti JSON-hijacking prefix some endpoints put in front of their payload.
pub const XSSI_PREFIX: &str = ")]}'";

/// Reads the place payload out of the client-side application state.
///
/// The state holds it as a JSON-encoded string. A missing state yields
/// `null`; an unexpected shape yields an error object, which fails the
/// payload checks downstream.
pub const PAGE_STATE_SCRIPT: &str = r#"
(() => {
    try {
        const state = window.APP_INITIALIZATION_STATE;
        if (!state) {
            return null;
        }
        if (!Array.isArray(state) || state.length <= 3 ||
            !Array.isArray(state[3]) || state[3].length <= 6) {
            return JSON.stringify({ error: 'Unexpected data structure' });
        }
        return state[3][6];
    } catch (e) {
        return JSON.stringify({ error: e.message });
    }
})()
"#;

/// Extracts the raw page-state payload of a loaded page
#[derive(Debug, Clone, Default)]
pub struct PageStateExtractor {
    config: ExtractConfig,
}

impl PageStateExtractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Evaluate the page-state script and return validated JSON bytes.
    ///
    /// Evaluation errors, `null` results and invalid JSON are retried with
    /// a fixed delay. Exhausting the attempts is an extraction error.
    pub async fn extract(&self, page: &dyn BrowserPage, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let attempts = self.config.attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!("Retry {}/{} extracting page state", attempt, attempts);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                    _ = tokio::time::sleep(self.config.retry_delay()) => {}
                }
            }

            let value = match page.evaluate(PAGE_STATE_SCRIPT).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Page state evaluation failed (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = e.to_string();
                    continue;
                }
            };

            match normalize_payload(value) {
                Ok(raw) => return Ok(raw),
                Err(reason) => {
                    warn!("Unusable page state (attempt {}/{}): {}", attempt, attempts, reason);
                    last_error = reason;
                }
            }
        }

        Err(ScrapeError::Extraction(format!(
            "failed to extract page state after {} attempts: {}",
            attempts, last_error
        )))
    }
}

/// Turn an evaluation result of any shape into validated JSON bytes.
pub fn normalize_payload(value: EvalValue) -> std::result::Result<Vec<u8>, String> {
    let text = match value {
        EvalValue::Text(text) => text,
        EvalValue::Null => return Err("page state is null".to_string()),
        EvalValue::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| e.to_string())?,
        EvalValue::Array(items) => serde_json::to_string(&items).map_err(|e| e.to_string())?,
        EvalValue::Object(map) => serde_json::to_string(&map).map_err(|e| e.to_string())?,
        EvalValue::Other(other) => {
            warn!("Page state returned a non-text value, converting: {}", other);
            other.to_string()
        }
    };

    let trimmed = text.trim_start();
    let payload = trimmed.strip_prefix(XSSI_PREFIX).unwrap_or(trimmed).trim();

    serde_json::from_str::<IgnoredAny>(payload)
        .map_err(|e| format!("page state is not valid JSON: {}", e))?;

    Ok(payload.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPage;
    use serde_json::json;
    use std::time::Duration;

    fn extractor() -> PageStateExtractor {
        PageStateExtractor::new(ExtractConfig {
            attempts: 3,
            retry_delay_ms: 1000,
        })
    }

    #[test]
    fn test_prefix_is_stripped() {
        let raw = normalize_payload(EvalValue::Text(r#")]}'{"a":1}"#.into())).unwrap();
        assert_eq!(raw, br#"{"a":1}"#);
    }

    #[test]
    fn test_whitespace_around_prefix() {
        let raw = normalize_payload(EvalValue::Text("  )]}'\n [1,2] \n".into())).unwrap();
        assert_eq!(raw, b"[1,2]");
    }

    #[test]
    fn test_shapes_normalize_identically() {
        let object = json!({"a": 1, "b": [1, 2]});
        let array = json!([[null, "x"], 3]);

        let from_text = normalize_payload(EvalValue::Text(object.to_string())).unwrap();
        let from_object = normalize_payload(EvalValue::from(object.clone())).unwrap();
        let from_bytes = normalize_payload(EvalValue::Bytes(object.to_string().into_bytes())).unwrap();
        assert_eq!(from_text, from_object);
        assert_eq!(from_text, from_bytes);

        let from_text = normalize_payload(EvalValue::Text(array.to_string())).unwrap();
        let from_array = normalize_payload(EvalValue::from(array)).unwrap();
        assert_eq!(from_text, from_array);
    }

    #[test]
    fn test_other_values_are_stringified() {
        let raw = normalize_payload(EvalValue::from(json!(42))).unwrap();
        assert_eq!(raw, b"42");
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(normalize_payload(EvalValue::Text("<html>".into())).is_err());
        assert!(normalize_payload(EvalValue::Text(")]}'".into())).is_err());
        assert!(normalize_payload(EvalValue::Null).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_is_retried_then_succeeds() {
        let page = ScriptedPage::new()
            .push(EvalValue::Null)
            .push_error("Execution context was destroyed")
            .push(EvalValue::Text(r#")]}'[1]"#.into()));

        let raw = extractor()
            .extract(&page, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(raw, b"[1]");
        assert_eq!(page.eval_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_exhausts_attempts() {
        let page = ScriptedPage::new()
            .push(EvalValue::Null)
            .push(EvalValue::Null)
            .push(EvalValue::Null)
            .push(EvalValue::Text("[1]".into()));

        let started = tokio::time::Instant::now();
        let err = extractor()
            .extract(&page, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Extraction(_)));
        assert_eq!(page.eval_count(), 3);
        assert_eq!(page.remaining(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_retry_delay() {
        let page = ScriptedPage::new().push(EvalValue::Null);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = extractor().extract(&page, &cancel).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Cancelled));
        assert_eq!(page.eval_count(), 1);
    }
}
