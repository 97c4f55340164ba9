use crate::researcher::{AgenticResearcher, ResearchRequest};
use async_trait::async_trait;
use psychohistory_ai::prompts::{synthesis_prompt, SynthesisPromptInput};
use psychohistory_ai::{extract_json, GenerationConfig, LLMProvider, Message};
use psychohistory_core::{
    probability, validate_outputs, EventNode, ProbabilityOutput, PsychoHistoryError,
    ResearchResult, Result, SeedInput, MAX_SOURCES_PER_NODE,
};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The synthesis model returns no per-child rationale; every synthesized
/// child carries this justification.
pub const DEFAULT_JUSTIFICATION: &str = "Based on historical research and analysis";

/// Schema-failure retries for Phase 2, backing off 1s, 2s, 4s.
const SYNTHESIS_RETRIES: u32 = 3;

/// Sentiment assigned to the "unexpected development" fallback child.
const FALLBACK_NEGATIVE_SENTIMENT: i32 = -10;

/// One node in, one sibling cohort out. The scheduler dispatches pipelines
/// through this seam; tests substitute counting or scripted stubs.
#[async_trait]
pub trait NodePipeline: Send + Sync {
    /// Expand `node` into its children. `path` is the event chain from the
    /// root to `node` inclusive, reconstructed by the scheduler.
    async fn expand(
        &self,
        node: &EventNode,
        seed: &SeedInput,
        path: &[String],
    ) -> Result<Vec<EventNode>>;
}

/// The production two-phase pipeline: agentic research, then probability
/// synthesis. Irrecoverable phase failures degrade to fallback children;
/// this only returns `Err` when even that is impossible.
pub struct NodeProcessor {
    researcher: AgenticResearcher,
    reasoning: Arc<dyn LLMProvider>,
}

impl NodeProcessor {
    pub fn new(researcher: AgenticResearcher, reasoning: Arc<dyn LLMProvider>) -> Self {
        Self {
            researcher,
            reasoning,
        }
    }

    /// The degenerate two-child subtree used when research or synthesis
    /// fails for a node. Both children are pending and will be processed at
    /// the next depth like any other node.
    pub fn fallback_children(node: &EventNode) -> Vec<EventNode> {
        let status_quo = EventNode::child_of(
            node,
            format!("Status quo continues from: {}", node.event),
            0.5,
        );
        let mut unexpected = EventNode::child_of(
            node,
            format!("Unexpected development from: {}", node.event),
            0.5,
        );
        unexpected.sentiment = FALLBACK_NEGATIVE_SENTIMENT;
        vec![status_quo, unexpected]
    }

    /// Render a research result into the human-readable block handed to the
    /// synthesis prompt.
    pub fn format_research(research: &ResearchResult) -> String {
        let mut block = format!(
            "Research Summary ({}): {}\n",
            research.confidence, research.summary
        );
        if !research.queries.is_empty() {
            block.push_str("\nQueries executed:\n");
            for (i, query) in research.queries.iter().enumerate() {
                writeln!(block, "{}. {}", i + 1, query).unwrap();
            }
        }
        for source in &research.sources {
            block.push_str("\n---\n");
            writeln!(block, "{}\n{}\n{}", source.title, source.url, source.snippet).unwrap();
        }
        block
    }

    async fn synthesize(&self, prompt: &str) -> Result<Vec<ProbabilityOutput>> {
        let generation = GenerationConfig {
            temperature: 0.2,
            ..Default::default()
        };
        let mut last_error = None;

        for attempt in 0..=SYNTHESIS_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_secs(1u64 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }
            match self.try_synthesize(prompt, &generation).await {
                Ok(outputs) => return Ok(outputs),
                // The transport ladder lives inside the provider; a
                // Transport error surfacing here is already exhausted.
                Err(e @ PsychoHistoryError::Transport(_)) => return Err(e),
                Err(e) => {
                    if attempt < SYNTHESIS_RETRIES {
                        warn!(attempt = attempt + 1, error = %e, "synthesis attempt failed, retrying");
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PsychoHistoryError::Pipeline("synthesis never ran".into())))
    }

    async fn try_synthesize(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<Vec<ProbabilityOutput>> {
        let response = self
            .reasoning
            .generate_chat(&[Message::user(prompt)], generation)
            .await
            .map_err(|e| PsychoHistoryError::Transport(format!("synthesis completion: {e}")))?;
        let value = extract_json(&response.content)
            .map_err(|e| PsychoHistoryError::Schema(format!("synthesis output: {e}")))?;
        let outputs: Vec<ProbabilityOutput> = serde_json::from_value(value)
            .map_err(|e| PsychoHistoryError::Schema(format!("synthesis payload: {e}")))?;
        validate_outputs(&outputs)?;
        Ok(outputs)
    }

    /// Normalize the cohort and materialize child nodes.
    fn build_children(
        node: &EventNode,
        research: &ResearchResult,
        outputs: Vec<ProbabilityOutput>,
    ) -> Result<Vec<EventNode>> {
        let mut probabilities: Vec<f64> = outputs.iter().map(|o| o.probability).collect();
        probability::normalize(&mut probabilities);
        if !probability::is_normalized(&probabilities, probability::SIBLING_SUM_TOLERANCE) {
            probability::normalize(&mut probabilities);
            if !probability::is_normalized(&probabilities, probability::SIBLING_SUM_TOLERANCE) {
                return Err(PsychoHistoryError::Schema(
                    "sibling probabilities failed to normalize".into(),
                ));
            }
        }

        let sources: Vec<_> = research
            .sources
            .iter()
            .take(MAX_SOURCES_PER_NODE)
            .cloned()
            .collect();

        Ok(outputs
            .into_iter()
            .zip(probabilities)
            .map(|(output, probability)| {
                let mut child = EventNode::child_of(node, output.event, probability);
                child.justification = DEFAULT_JUSTIFICATION.to_string();
                child.sources = sources.clone();
                child
            })
            .collect())
    }
}

#[async_trait]
impl NodePipeline for NodeProcessor {
    async fn expand(
        &self,
        node: &EventNode,
        seed: &SeedInput,
        path: &[String],
    ) -> Result<Vec<EventNode>> {
        // Ancestors exclude the node itself; prompts show them as the chain
        // leading up to the current event.
        let ancestors = &path[..path.len().saturating_sub(1)];
        let max_depth = seed.effective_depth();

        let research = self
            .researcher
            .research(&ResearchRequest {
                event: &node.event,
                path: ancestors,
                seed_event: Some(&seed.event),
                context: seed.context.as_deref(),
                domain: seed.domain.as_deref(),
                depth: node.depth,
                max_depth,
            })
            .await;

        if research.sources.is_empty() {
            debug!(
                event = %node.event,
                "research returned zero sources, emitting fallback children"
            );
            return Ok(Self::fallback_children(node));
        }

        let research_block = Self::format_research(&research);
        let prompt = synthesis_prompt(&SynthesisPromptInput {
            event: &node.event,
            path: ancestors,
            seed_event: Some(&seed.event),
            timeframe: seed.timeframe.as_deref(),
            depth: node.depth,
            max_depth,
            research: &research_block,
        });

        let outputs = match self.synthesize(&prompt).await {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!(event = %node.event, error = %e, "synthesis failed, emitting fallback children");
                return Ok(Self::fallback_children(node));
            }
        };

        match Self::build_children(node, &research, outputs) {
            Ok(children) => Ok(children),
            Err(e) => {
                warn!(event = %node.event, error = %e, "child construction failed, emitting fallback children");
                Ok(Self::fallback_children(node))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::researcher::ResearcherConfig;
    use psychohistory_ai::prompts::{FINISH_RESEARCH_TOOL, SEARCH_TOOL};
    use psychohistory_ai::{LLMResponse, ScriptedProvider, ToolCall};
    use psychohistory_core::{Confidence, ProcessingStatus, Source};
    use psychohistory_search::{MockSearchProvider, SearchClient, SearchClientConfig};
    use serde_json::json;

    fn search_client() -> Arc<SearchClient> {
        Arc::new(SearchClient::new(
            Arc::new(MockSearchProvider::new()),
            SearchClientConfig {
                rate_limit: 100,
                ..Default::default()
            },
        ))
    }

    fn processor(research_script: Vec<LLMResponse>, synthesis_script: Vec<LLMResponse>) -> NodeProcessor {
        let researcher = AgenticResearcher::new(
            Arc::new(ScriptedProvider::new(research_script)),
            search_client(),
            ResearcherConfig::default(),
        );
        NodeProcessor::new(researcher, Arc::new(ScriptedProvider::new(synthesis_script)))
    }

    fn research_script_with_sources() -> Vec<LLMResponse> {
        vec![
            LLMResponse::with_tool_calls(vec![ToolCall::function(
                "c1",
                SEARCH_TOOL,
                json!({ "query": "precedent" }).to_string(),
            )]),
            LLMResponse::with_tool_calls(vec![ToolCall::function(
                "c2",
                FINISH_RESEARCH_TOOL,
                json!({ "summary": "Strong precedent found.", "confidence": "medium" }).to_string(),
            )]),
        ]
    }

    fn seed() -> SeedInput {
        SeedInput {
            event: "Fed raises rates by 75 basis points".into(),
            context: None,
            timeframe: Some("6 months".into()),
            max_depth: 1,
            domain: None,
        }
    }

    #[tokio::test]
    async fn happy_path_builds_normalized_children() {
        let processor = processor(
            research_script_with_sources(),
            vec![LLMResponse::text(
                json!([
                    { "event": "Mortgage rates exceed 7 percent", "probability": 0.6 },
                    { "event": "Housing market cools sharply", "probability": 0.4 },
                ])
                .to_string(),
            )],
        );

        let node = EventNode::root("Fed raises rates by 75 basis points");
        let seed = seed();
        let path = vec![node.event.clone()];
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        assert_eq!(children.len(), 2);
        let sum: f64 = children.iter().map(|c| c.probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        for child in &children {
            assert_eq!(child.depth, 1);
            assert_eq!(child.parent_id, Some(node.id));
            assert_eq!(child.processing_status, ProcessingStatus::Pending);
            assert_eq!(child.justification, DEFAULT_JUSTIFICATION);
            assert_eq!(child.sentiment, 0);
            assert!(!child.sources.is_empty());
            assert!(child.sources.len() <= MAX_SOURCES_PER_NODE);
        }
    }

    #[tokio::test]
    async fn over_unity_probabilities_are_rescaled() {
        let processor = processor(
            research_script_with_sources(),
            vec![LLMResponse::text(
                json!([
                    { "event": "Outcome P happens next", "probability": 0.7 },
                    { "event": "Outcome Q happens next", "probability": 0.5 },
                    { "event": "Outcome R happens next", "probability": 0.3 },
                ])
                .to_string(),
            )],
        );

        let node = EventNode::root("seed event");
        let seed = seed();
        let path = vec![node.event.clone()];
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        assert!((children[0].probability - 0.4667).abs() < 1e-4);
        assert!((children[1].probability - 0.3333).abs() < 1e-4);
        assert!((children[2].probability - 0.2000).abs() < 1e-4);
    }

    #[tokio::test]
    async fn zero_sources_short_circuits_to_fallback() {
        // Model ends research immediately without searching.
        let processor = processor(
            vec![LLMResponse::text("nothing to research")],
            vec![],
        );

        let node = EventNode::root("An event nobody ever wrote about");
        let seed = seed();
        let path = vec![node.event.clone()];
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        assert_eq!(children.len(), 2);
        assert!(children[0]
            .event
            .starts_with("Status quo continues from:"));
        assert!(children[1]
            .event
            .starts_with("Unexpected development from:"));
        assert_eq!(children[0].probability, 0.5);
        assert_eq!(children[1].probability, 0.5);
        assert_eq!(children[0].sentiment, 0);
        assert_eq!(children[1].sentiment, FALLBACK_NEGATIVE_SENTIMENT);
        assert!(children[0].sources.is_empty());
        assert!(children[0].justification.is_empty());
        assert_eq!(children[0].processing_status, ProcessingStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn schema_failures_retry_then_fall_back() {
        // Four synthesis attempts all return garbage; the node degrades to
        // fallback children instead of failing.
        let garbage = (0..4)
            .map(|_| LLMResponse::text("I cannot answer that."))
            .collect();
        let processor = processor(research_script_with_sources(), garbage);

        let node = EventNode::root("seed event");
        let seed = seed();
        let path = vec![node.event.clone()];
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        assert_eq!(children.len(), 2);
        assert!(children[0].event.starts_with("Status quo"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_skips_the_schema_retry_ladder() {
        // An exhausted provider surfaces as a Transport error, which has
        // already spent its own retry ladder inside the provider: exactly
        // one synthesis attempt, no backoff, straight to fallback.
        let reasoning = Arc::new(ScriptedProvider::new(vec![]));
        let researcher = AgenticResearcher::new(
            Arc::new(ScriptedProvider::new(research_script_with_sources())),
            search_client(),
            ResearcherConfig::default(),
        );
        let processor = NodeProcessor::new(researcher, reasoning.clone());

        let node = EventNode::root("seed event");
        let seed = seed();
        let path = vec![node.event.clone()];
        let start = tokio::time::Instant::now();
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        assert_eq!(reasoning.call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(children.len(), 2);
        assert!(children[0].event.starts_with("Status quo"));
    }

    #[tokio::test]
    async fn invalid_outcome_count_is_a_schema_failure() {
        let processor = processor(
            research_script_with_sources(),
            vec![
                LLMResponse::text("[]"),
                LLMResponse::text(
                    json!([{ "event": "A single valid outcome", "probability": 1.0 }]).to_string(),
                ),
            ],
        );

        let node = EventNode::root("seed event");
        let seed = seed();
        let path = vec![node.event.clone()];
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        // Second attempt succeeded after the empty-array schema failure.
        assert_eq!(children.len(), 1);
        assert!((children[0].probability - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn all_zero_probabilities_distribute_equally() {
        let processor = processor(
            research_script_with_sources(),
            vec![LLMResponse::text(
                json!([
                    { "event": "First possible outcome", "probability": 0.0 },
                    { "event": "Second possible outcome", "probability": 0.0 },
                ])
                .to_string(),
            )],
        );

        let node = EventNode::root("seed event");
        let seed = seed();
        let path = vec![node.event.clone()];
        let children = processor.expand(&node, &seed, &path).await.unwrap();

        assert_eq!(children.len(), 2);
        assert!((children[0].probability - 0.5).abs() < 1e-9);
        assert!((children[1].probability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn research_block_lists_queries_and_sources() {
        let research = ResearchResult {
            sources: vec![Source::new(
                "https://example.com/a",
                "Title A",
                "Snippet A",
            )],
            summary: "Summary text".into(),
            confidence: Confidence::Medium,
            iterations: 2,
            queries: vec!["first query".into()],
        };
        let block = NodeProcessor::format_research(&research);
        assert!(block.starts_with("Research Summary (medium): Summary text"));
        assert!(block.contains("1. first query"));
        assert!(block.contains("---"));
        assert!(block.contains("https://example.com/a"));
    }
}
