use crate::exa::truncate;
use crate::{SearchError, SearchProvider};
use async_trait::async_trait;
use psychohistory_core::Source;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TAVILY_API_BASE: &str = "https://api.tavily.com";
const SNIPPET_MAX_CHARS: usize = 500;

/// Tavily search backend.
pub struct TavilyProvider {
    api_key: String,
    client: Client,
    max_results: usize,
}

impl TavilyProvider {
    pub fn new(api_key: impl Into<String>, max_results: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            client,
            max_results,
        })
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(&self, query: &str) -> Result<Vec<Source>, SearchError> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
        };

        let response = self
            .client
            .post(format!("{TAVILY_API_BASE}/search"))
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Network(format!("tavily request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Network(format!("tavily response unreadable: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .map(|r| Source {
                title: r.title.unwrap_or_else(|| r.url.clone()),
                snippet: truncate(&r.content.unwrap_or_default(), SNIPPET_MAX_CHARS),
                url: r.url,
                relevance_score: r.score,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
