use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to read provider configuration '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Invalid provider configuration")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("File pattern '{pattern}' lacks the named capture '{capture}'")]
    MissingCapture {
        pattern: String,
        capture: &'static str,
    },

    #[error("URL template '{0}' lacks the '{{station}}' placeholder")]
    MissingPlaceholder(String),

    #[error("Dataset {dataset} is configured twice for {resolution}/{period}")]
    DuplicateSource {
        dataset: String,
        resolution: String,
        period: String,
    },
}
