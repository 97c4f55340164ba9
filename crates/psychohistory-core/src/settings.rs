use crate::{PsychoHistoryError, Result};
use std::env;

const DEFAULT_RESEARCH_MODEL: &str = "deepseek/deepseek-chat";
const DEFAULT_REASONING_MODEL: &str = "deepseek/deepseek-reasoner";

/// Process-level runtime settings, read once at startup.
///
/// Only the `mock` search provider works without network access; everything
/// else needs the corresponding API keys.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// OpenRouter key used for both model roles.
    pub openrouter_api_key: String,
    /// Model driving the agentic research loop (tool calling).
    pub research_model: String,
    /// Model driving probability synthesis.
    pub reasoning_model: String,
    /// One of `mock`, `exa`, `tavily`.
    pub search_provider: String,
    pub search_api_key: Option<String>,
    /// Forwarded to OpenRouter as the `HTTP-Referer` attribution header.
    pub site_url: Option<String>,
    /// Node pipelines dispatched in parallel per batch.
    pub max_concurrent: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            openrouter_api_key: String::new(),
            research_model: DEFAULT_RESEARCH_MODEL.to_string(),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
            search_provider: "mock".to_string(),
            search_api_key: None,
            site_url: None,
            max_concurrent: 20,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();

        let settings = Settings {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: read_parsed("PORT", defaults.port)?,
            openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            research_model: env::var("RESEARCH_MODEL").unwrap_or(defaults.research_model),
            reasoning_model: env::var("REASONING_MODEL").unwrap_or(defaults.reasoning_model),
            search_provider: env::var("SEARCH_PROVIDER")
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or(defaults.search_provider),
            search_api_key: env::var("SEARCH_API_KEY").ok(),
            site_url: env::var("SITE_URL").ok(),
            max_concurrent: read_parsed("MAX_CONCURRENT", defaults.max_concurrent)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.openrouter_api_key.is_empty() {
            return Err(PsychoHistoryError::Configuration(
                "OPENROUTER_API_KEY environment variable not set".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(PsychoHistoryError::Configuration(
                "MAX_CONCURRENT must be at least 1".to_string(),
            ));
        }
        match self.search_provider.as_str() {
            "mock" => Ok(()),
            "exa" | "tavily" => {
                if self.search_api_key.is_none() {
                    return Err(PsychoHistoryError::Configuration(format!(
                        "SEARCH_API_KEY required for search provider {:?}",
                        self.search_provider
                    )));
                }
                Ok(())
            }
            other => Err(PsychoHistoryError::Configuration(format!(
                "unknown search provider {other:?} (expected mock, exa, or tavily)"
            ))),
        }
    }
}

fn read_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            PsychoHistoryError::Configuration(format!("{name} has invalid value {raw:?}"))
        }),
        Err(_) => Ok(default),
    }
}
