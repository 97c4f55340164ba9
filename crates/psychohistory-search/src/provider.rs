use crate::SearchError;
use async_trait::async_trait;
use psychohistory_core::Source;
use std::str::FromStr;

/// A raw search backend. Implementations issue exactly one upstream request
/// per call; rate limiting and retries live in [`crate::SearchClient`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Source>, SearchError>;

    fn name(&self) -> &str;
}

/// Which backend a client talks to, selected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProviderKind {
    Exa,
    Tavily,
    Mock,
}

impl FromStr for SearchProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exa" => Ok(SearchProviderKind::Exa),
            "tavily" => Ok(SearchProviderKind::Tavily),
            "mock" => Ok(SearchProviderKind::Mock),
            other => Err(format!("unknown search provider: {other}")),
        }
    }
}
