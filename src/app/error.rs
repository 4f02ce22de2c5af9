use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl ScrapeError {
    /// Whether the job-level retry loop may try again after this error.
    ///
    /// Configuration mistakes and cancellation never get better on retry.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ScrapeError::Config(_) | ScrapeError::InvalidUrl(_) | ScrapeError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScrapeError::Extraction("null".into()).is_transient());
        assert!(ScrapeError::Navigation("timeout".into()).is_transient());
        assert!(!ScrapeError::Config("bad selector".into()).is_transient());
        assert!(!ScrapeError::Cancelled.is_transient());
    }

    #[test]
    fn test_url_error_is_fatal() {
        let err: ScrapeError = url::Url::parse("not a url").unwrap_err().into();
        assert!(!err.is_transient());
    }
}
