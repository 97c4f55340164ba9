use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search provider rate limited the request (HTTP 429)")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("search failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SearchError>,
    },
}

impl SearchError {
    /// Transient failures are retried with exponential backoff; everything
    /// else fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::RateLimited | SearchError::Network(_) => true,
            SearchError::Provider { status, .. } => *status >= 500,
            SearchError::RetriesExhausted { .. } => false,
        }
    }
}
