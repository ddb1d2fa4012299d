//! Error types for this crate.
//!
//! All fallible operations return [`Result<T>`] which uses [`PipelineError`] as the error type.
//! A model answer that does not match the label set is *not* an error; see
//! [`ClassificationResult`](crate::client::ClassificationResult).

use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`PipelineError`] as the error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The unified error type for a pipeline run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// Config file unreadable, unparsable or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An endpoint parameter found neither in the config file nor in the environment.
    #[error(
        "configuration error: could not find parameter {name}: set `{name}` in the config file \
         or set the environment variable {env_key}"
    )]
    MissingParameter { name: &'static str, env_key: String },

    /// An example record with empty text or a label outside the label set.
    #[error("validation error: example record {index}: {reason}")]
    InvalidExample { index: usize, reason: String },

    /// An examples file that cannot be read or parsed at all.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network failure, non-2xx status or malformed response body.
    #[error("service error: {message}")]
    Service {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Writing the result failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn service(message: impl Into<String>) -> Self {
        PipelineError::Service {
            message: message.into(),
            source: None,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(value: reqwest::Error) -> Self {
        let message = if value.is_timeout() {
            "request timed out"
        } else if value.is_decode() {
            "malformed response body"
        } else if value.is_connect() {
            "could not connect to the completion endpoint"
        } else {
            "request to the completion endpoint failed"
        };
        PipelineError::Service {
            message: message.to_string(),
            source: Some(value),
        }
    }
}
