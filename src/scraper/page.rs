use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::app::Result;

/// Value returned by evaluating a script in the page.
///
/// Browser bindings marshal script results loosely, so callers decode this
/// instead of assuming a concrete type.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Text(String),
    Bytes(Vec<u8>),
    Null,
    Array(Vec<Value>),
    Object(Map<String, Value>),
    /// Numbers, booleans and anything else without a dedicated branch.
    Other(Value),
}

impl From<Value> for EvalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => EvalValue::Text(s),
            Value::Null => EvalValue::Null,
            Value::Array(items) => EvalValue::Array(items),
            Value::Object(map) => EvalValue::Object(map),
            other => EvalValue::Other(other),
        }
    }
}

impl EvalValue {
    /// Interpret the value as a scroll height.
    ///
    /// Fractional heights are truncated so that rounds compare exactly.
    pub fn as_height(&self) -> Option<u64> {
        match self {
            EvalValue::Other(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64)),
            EvalValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64),
            _ => None,
        }
    }
}

/// Outcome of a top-level navigation.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

/// The slice of browser automation the scraping jobs rely on.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the DOM to be ready.
    async fn goto(&self, url: &str) -> Result<Navigation>;

    /// Evaluate a script expression, awaiting it if it yields a promise.
    async fn evaluate(&self, script: &str) -> Result<EvalValue>;

    /// Wait until `selector` matches an element, or fail after `timeout`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_variants() {
        assert_eq!(EvalValue::from(json!("x")), EvalValue::Text("x".into()));
        assert_eq!(EvalValue::from(Value::Null), EvalValue::Null);
        assert!(matches!(EvalValue::from(json!([1])), EvalValue::Array(_)));
        assert!(matches!(EvalValue::from(json!({"a": 1})), EvalValue::Object(_)));
        assert!(matches!(EvalValue::from(json!(true)), EvalValue::Other(_)));
    }

    #[test]
    fn test_height_truncates() {
        assert_eq!(EvalValue::from(json!(250)).as_height(), Some(250));
        assert_eq!(EvalValue::from(json!(250.9)).as_height(), Some(250));
        assert_eq!(EvalValue::Text("99.99".into()).as_height(), Some(99));
        assert_eq!(EvalValue::from(json!(-1.5)).as_height(), None);
        assert_eq!(EvalValue::Null.as_height(), None);
    }
}
