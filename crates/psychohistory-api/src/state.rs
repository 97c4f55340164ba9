use psychohistory_ai::{LLMProvider, OpenRouterConfig, OpenRouterProvider};
use psychohistory_core::{PsychoHistoryError, Result, Settings};
use psychohistory_engine::{AgenticResearcher, NodePipeline, NodeProcessor, ResearcherConfig};
use psychohistory_search::{SearchClient, SearchClientConfig, SearchProviderKind};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<dyn NodePipeline>,
    pub max_concurrent: usize,
    pub node_timeout: Option<Duration>,
}

impl AppState {
    /// Wire the production pipeline: two OpenRouter model roles plus the
    /// configured search backend behind the rate-limited client.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let research_llm: Arc<dyn LLMProvider> = Arc::new(
            OpenRouterProvider::new(openrouter_config(settings, &settings.research_model))
                .map_err(|e| PsychoHistoryError::Configuration(e.to_string()))?,
        );
        let reasoning_llm: Arc<dyn LLMProvider> = Arc::new(
            OpenRouterProvider::new(openrouter_config(settings, &settings.reasoning_model))
                .map_err(|e| PsychoHistoryError::Configuration(e.to_string()))?,
        );

        let kind: SearchProviderKind = settings
            .search_provider
            .parse()
            .map_err(PsychoHistoryError::Configuration)?;
        let search = Arc::new(SearchClient::for_kind(
            kind,
            settings.search_api_key.as_deref(),
            SearchClientConfig::default(),
        )?);

        let researcher =
            AgenticResearcher::new(research_llm, search, ResearcherConfig::default());
        let processor = NodeProcessor::new(researcher, reasoning_llm);

        Ok(Self {
            pipeline: Arc::new(processor),
            max_concurrent: settings.max_concurrent,
            node_timeout: None,
        })
    }

    /// State around an arbitrary pipeline, used by tests.
    pub fn with_pipeline(pipeline: Arc<dyn NodePipeline>) -> Self {
        Self {
            pipeline,
            max_concurrent: 20,
            node_timeout: None,
        }
    }
}

fn openrouter_config(settings: &Settings, model: &str) -> OpenRouterConfig {
    let mut config = OpenRouterConfig::new(settings.openrouter_api_key.clone(), model);
    config.site_url = settings.site_url.clone();
    config
}
