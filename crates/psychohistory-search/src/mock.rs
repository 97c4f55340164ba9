use crate::{SearchError, SearchProvider};
use async_trait::async_trait;
use psychohistory_core::Source;

/// Offline provider returning three deterministic synthetic sources per
/// query. Hostnames vary with the query so the researcher's domain
/// deduplication does not collapse results across distinct queries.
#[derive(Debug, Default)]
pub struct MockSearchProvider;

impl MockSearchProvider {
    pub fn new() -> Self {
        Self
    }

    fn slug(query: &str) -> String {
        let slug: String = query
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let trimmed: String = slug.trim_matches('-').chars().take(40).collect();
        if trimmed.is_empty() {
            "query".to_string()
        } else {
            trimmed
        }
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<Source>, SearchError> {
        let slug = Self::slug(query);
        let sources = (1..=3)
            .map(|i| Source {
                url: format!("https://source{i}.{slug}.example.org/report"),
                title: format!("Mock result {i} for \"{query}\""),
                snippet: format!(
                    "Synthetic evidence #{i} describing documented outcomes related to: {query}"
                ),
                relevance_score: Some(1.0 - 0.1 * i as f64),
            })
            .collect();
        Ok(sources)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
