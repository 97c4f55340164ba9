use psychohistory_ai::prompts::{
    research_system_prompt, research_task_prompt, research_tools, ResearchPromptInput,
    FINISH_RESEARCH_TOOL, SEARCH_TOOL,
};
use psychohistory_ai::{
    GenerationConfig, LLMProvider, LLMResult, Message, ToolCall, ToolChoice,
};
use psychohistory_core::{Confidence, ResearchResult, Source};
use psychohistory_search::SearchClient;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Summary used when the loop terminates without the model calling
/// `finish_research`.
const DEFAULT_SUMMARY: &str = "Research completed through iterative search";

#[derive(Debug, Clone)]
pub struct ResearcherConfig {
    /// Hard cap on model round-trips per invocation.
    pub max_iterations: usize,
    /// Wall-clock budget for the whole invocation.
    pub timeout: Duration,
    /// Sources needed for a normal (medium-confidence) termination.
    pub min_sources: usize,
}

impl Default for ResearcherConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            timeout: Duration::from_secs(60),
            min_sources: 3,
        }
    }
}

/// Per-node inputs to a research invocation.
#[derive(Debug, Clone)]
pub struct ResearchRequest<'a> {
    pub event: &'a str,
    /// Ancestor events, root first; empty when researching the root.
    pub path: &'a [String],
    pub seed_event: Option<&'a str>,
    pub context: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub depth: u32,
    pub max_depth: u32,
}

/// Drives a tool-calling model through an iterative search process.
///
/// The model is an untrusted planner: duplicate-query suppression, domain
/// diversity filtering, the iteration cap, and the wall-clock cap are all
/// rails around it. Tool calls within one assistant message are executed
/// strictly in declaration order; nothing runs in parallel here.
pub struct AgenticResearcher {
    llm: Arc<dyn LLMProvider>,
    search: Arc<SearchClient>,
    config: ResearcherConfig,
}

#[derive(Default)]
struct LoopState {
    sources: Vec<Source>,
    queries: Vec<String>,
    executed: HashSet<String>,
    seen_domains: HashSet<String>,
    iterations: usize,
}

impl LoopState {
    fn result(&self, summary: String, confidence: Confidence) -> ResearchResult {
        ResearchResult {
            sources: self.sources.clone(),
            summary,
            confidence,
            iterations: self.iterations,
            queries: self.queries.clone(),
        }
    }

    fn default_result(&self, min_sources: usize) -> ResearchResult {
        let confidence = if self.sources.len() >= min_sources {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        self.result(DEFAULT_SUMMARY.to_string(), confidence)
    }
}

impl AgenticResearcher {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        search: Arc<SearchClient>,
        config: ResearcherConfig,
    ) -> Self {
        Self {
            llm,
            search,
            config,
        }
    }

    /// Run the research loop. Never fails: any error surfaces as a partial
    /// result with low confidence.
    pub async fn research(&self, request: &ResearchRequest<'_>) -> ResearchResult {
        let mut state = LoopState::default();
        match self.run_loop(request, &mut state).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    event = request.event,
                    error = %e,
                    sources = state.sources.len(),
                    "research loop aborted, returning partial result"
                );
                state.result(DEFAULT_SUMMARY.to_string(), Confidence::Low)
            }
        }
    }

    async fn run_loop(
        &self,
        request: &ResearchRequest<'_>,
        state: &mut LoopState,
    ) -> LLMResult<ResearchResult> {
        let started = Instant::now();
        let tools = research_tools();
        let generation = GenerationConfig::default();

        let task = research_task_prompt(&ResearchPromptInput {
            event: request.event,
            path: request.path,
            seed_event: request.seed_event,
            context: request.context,
            domain: request.domain,
            depth: request.depth,
            max_depth: request.max_depth,
        });
        let mut messages = vec![Message::system(research_system_prompt()), Message::user(task)];

        for iteration in 1..=self.config.max_iterations {
            state.iterations = iteration;

            if started.elapsed() > self.config.timeout {
                debug!(
                    event = request.event,
                    iteration, "research wall-clock budget exhausted"
                );
                break;
            }

            let response = self
                .llm
                .generate_chat_with_tools(&messages, &tools, ToolChoice::Auto, &generation)
                .await?;

            let tool_calls = match response.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                // No tool use: the model considers itself done.
                _ => break,
            };
            messages.push(Message::assistant(
                response.content.clone(),
                Some(tool_calls.clone()),
            ));

            let mut searched_this_iteration = false;
            for call in &tool_calls {
                match call.function.name.as_str() {
                    FINISH_RESEARCH_TOOL => {
                        let (summary, confidence) = parse_finish_arguments(call);
                        return Ok(state.result(summary, confidence));
                    }
                    SEARCH_TOOL => {
                        searched_this_iteration |=
                            self.handle_search(call, state, &mut messages).await?;
                    }
                    other => {
                        messages.push(Message::tool(
                            &call.id,
                            json!({ "error": format!("Unknown tool: {other}") }).to_string(),
                        ));
                    }
                }
            }

            if state.sources.len() >= self.config.min_sources
                && iteration >= 2
                && !searched_this_iteration
            {
                debug!(
                    event = request.event,
                    iteration,
                    sources = state.sources.len(),
                    "no search progress this iteration, terminating"
                );
                break;
            }
        }

        Ok(state.default_result(self.config.min_sources))
    }

    /// Execute one `search` tool call; returns whether a search actually ran.
    async fn handle_search(
        &self,
        call: &ToolCall,
        state: &mut LoopState,
        messages: &mut Vec<Message>,
    ) -> LLMResult<bool> {
        let query = match call.parse_arguments() {
            Ok(args) => args["query"].as_str().unwrap_or_default().trim().to_string(),
            Err(_) => String::new(),
        };
        if query.is_empty() {
            messages.push(Message::tool(
                &call.id,
                json!({ "error": "Missing query" }).to_string(),
            ));
            return Ok(false);
        }
        if !state.executed.insert(query.clone()) {
            messages.push(Message::tool(
                &call.id,
                json!({ "error": "Duplicate query" }).to_string(),
            ));
            return Ok(false);
        }
        state.queries.push(query.clone());

        let results = self.search.search(&query).await?;
        let mut fresh = Vec::new();
        for source in results {
            match source.hostname() {
                Some(host) => {
                    if state.seen_domains.insert(host) {
                        fresh.push(source);
                    }
                }
                // Unparseable hosts cannot be deduplicated; keep them.
                None => fresh.push(source),
            }
        }
        state.sources.extend(fresh.iter().cloned());

        messages.push(Message::tool(
            &call.id,
            json!({
                "sources": fresh,
                "total_sources_gathered": state.sources.len(),
            })
            .to_string(),
        ));
        Ok(true)
    }
}

fn parse_finish_arguments(call: &ToolCall) -> (String, Confidence) {
    match call.parse_arguments() {
        Ok(args) => {
            let summary = args["summary"]
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_SUMMARY)
                .to_string();
            let confidence = args["confidence"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Confidence::Medium);
            (summary, confidence)
        }
        Err(_) => (DEFAULT_SUMMARY.to_string(), Confidence::Medium),
    }
}
