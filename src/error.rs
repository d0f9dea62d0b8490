use thiserror::Error;

/// Failure categories of a chat invocation.
///
/// Every variant is reported to the caller the same way (status 500 with the
/// display text in `error`); the split exists for logging and tests.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    Client(String),
    #[error("upstream generation failed: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Client(_) => "client",
            RelayError::Upstream(_) => "upstream",
            RelayError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Upstream(err.to_string())
    }
}
