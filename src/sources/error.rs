use thiserror::Error;

/// Failure of a token fetch.
///
/// Only `Transient` is retried; everything else ends the fetch at once.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// 5xx status, transport failure or unreadable body.
    #[error("transient token endpoint failure: {0}")]
    Transient(String),

    /// Any non-5xx error status.
    #[error("token request rejected: HTTP {status} - {body}")]
    Rejected { status: u16, body: String },

    /// 2xx with an unusable body (missing token, non-positive lifetime).
    #[error("invalid token response: {0}")]
    Malformed(String),

    #[error("failed to fetch token after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("interrupted while fetching token")]
    Cancelled,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Transient(_) => "transient",
            FetchError::Rejected { .. } => "rejected",
            FetchError::Malformed(_) => "malformed",
            FetchError::Exhausted { .. } => "exhausted",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}
