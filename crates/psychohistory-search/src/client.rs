use crate::{
    ExaProvider, MockSearchProvider, SearchError, SearchProvider, SearchProviderKind,
    SlidingWindowLimiter, TavilyProvider,
};
use psychohistory_core::{PsychoHistoryError, Source, MAX_SOURCES_PER_NODE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum retries for transient failures (429 / network). Backoff doubles
/// from one second: 1s, 2s, 4s, 8s, 16s.
const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct SearchClientConfig {
    /// Results returned per query, after truncation.
    pub max_results: usize,
    /// Permits per window for the sliding-window limiter.
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub max_retries: u32,
}

impl Default for SearchClientConfig {
    fn default() -> Self {
        Self {
            max_results: MAX_SOURCES_PER_NODE,
            rate_limit: 5,
            rate_window: Duration::from_millis(1000),
            max_retries: MAX_RETRIES,
        }
    }
}

/// Rate-limited, retrying wrapper over a [`SearchProvider`].
///
/// One client (and therefore one limiter) is shared by every concurrent node
/// pipeline of a build; the limiter is the process-wide budget against the
/// upstream provider.
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
    limiter: SlidingWindowLimiter,
    config: SearchClientConfig,
}

impl SearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, config: SearchClientConfig) -> Self {
        let limiter = SlidingWindowLimiter::new(config.rate_limit, config.rate_window);
        Self {
            provider,
            limiter,
            config,
        }
    }

    /// Build a client for the configured provider kind.
    pub fn for_kind(
        kind: SearchProviderKind,
        api_key: Option<&str>,
        config: SearchClientConfig,
    ) -> psychohistory_core::Result<Self> {
        let provider: Arc<dyn SearchProvider> = match kind {
            SearchProviderKind::Mock => Arc::new(MockSearchProvider::new()),
            SearchProviderKind::Exa => {
                let key = api_key.ok_or_else(|| {
                    PsychoHistoryError::Configuration("exa provider requires an API key".into())
                })?;
                Arc::new(ExaProvider::new(key, config.max_results).map_err(|e| {
                    PsychoHistoryError::Configuration(format!("exa client: {e}"))
                })?)
            }
            SearchProviderKind::Tavily => {
                let key = api_key.ok_or_else(|| {
                    PsychoHistoryError::Configuration("tavily provider requires an API key".into())
                })?;
                Arc::new(TavilyProvider::new(key, config.max_results).map_err(|e| {
                    PsychoHistoryError::Configuration(format!("tavily client: {e}"))
                })?)
            }
        };
        Ok(Self::new(provider, config))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Execute one query, awaiting a rate-limit permit per attempt and
    /// retrying transient failures with exponential backoff.
    pub async fn search(&self, query: &str) -> Result<Vec<Source>, SearchError> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;

            match self.provider.search(query).await {
                Ok(mut sources) => {
                    sources.truncate(self.config.max_results);
                    debug!(
                        provider = self.provider.name(),
                        query,
                        results = sources.len(),
                        "search succeeded"
                    );
                    return Ok(sources);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = Duration::from_secs(1u64 << attempt);
                    warn!(
                        provider = self.provider.name(),
                        query,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "transient search failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(SearchError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
