use crate::{SearchError, SearchProvider};
use async_trait::async_trait;
use psychohistory_core::Source;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const EXA_API_BASE: &str = "https://api.exa.ai";
const SNIPPET_MAX_CHARS: usize = 500;

/// Exa neural search backend.
pub struct ExaProvider {
    api_key: String,
    client: Client,
    max_results: usize,
}

impl ExaProvider {
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
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    contents: ExaContents,
}

#[derive(Debug, Serialize)]
struct ExaContents {
    text: bool,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[async_trait]
impl SearchProvider for ExaProvider {
    async fn search(&self, query: &str) -> Result<Vec<Source>, SearchError> {
        let request = ExaRequest {
            query,
            num_results: self.max_results,
            contents: ExaContents { text: true },
        };

        let response = self
            .client
            .post(format!("{EXA_API_BASE}/search"))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Network(format!("exa request failed: {e}")))?;

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

        let body: ExaResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Network(format!("exa response unreadable: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .map(|r| Source {
                title: r.title.unwrap_or_else(|| r.url.clone()),
                snippet: truncate(&r.text.unwrap_or_default(), SNIPPET_MAX_CHARS),
                url: r.url,
                relevance_score: r.score,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "exa"
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
