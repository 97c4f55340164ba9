//! Prompt and tool-schema construction for the two pipeline phases.

use crate::llm_provider::ToolDefinition;
use serde_json::json;
use std::fmt::Write;

/// Tool names the research loop dispatches on.
pub const SEARCH_TOOL: &str = "search";
pub const FINISH_RESEARCH_TOOL: &str = "finish_research";

/// Inputs to the Phase-1 research prompt.
#[derive(Debug, Clone, Default)]
pub struct ResearchPromptInput<'a> {
    pub event: &'a str,
    /// Events from the root down to (and including) the parent of the
    /// current event. Empty for the root.
    pub path: &'a [String],
    pub seed_event: Option<&'a str>,
    pub context: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub depth: u32,
    pub max_depth: u32,
}

/// Inputs to the Phase-2 synthesis prompt.
#[derive(Debug, Clone, Default)]
pub struct SynthesisPromptInput<'a> {
    pub event: &'a str,
    pub path: &'a [String],
    pub seed_event: Option<&'a str>,
    pub timeframe: Option<&'a str>,
    pub depth: u32,
    pub max_depth: u32,
    /// Formatted research block produced from the Phase-1 result.
    pub research: &'a str,
}

pub fn research_system_prompt() -> String {
    "You are a rigorous research analyst gathering evidence about how a real-world \
     event may unfold. Use the `search` tool iteratively to collect 3-5 diverse, \
     credible sources: look for historical precedent, causal mechanisms, expert \
     predictions, and counter-evidence. Prefer distinct publications over repeated \
     coverage of the same outlet. Refine your queries based on what earlier searches \
     returned. When you have enough evidence, call `finish_research` with a concise \
     summary and your confidence level."
        .to_string()
}

pub fn research_task_prompt(input: &ResearchPromptInput<'_>) -> String {
    let mut prompt = String::new();
    writeln!(prompt, "EVENT UNDER ANALYSIS:\n{}\n", input.event).unwrap();

    if let Some(seed) = input.seed_event {
        if seed != input.event {
            writeln!(prompt, "ORIGINAL SEED EVENT:\n{seed}\n").unwrap();
        }
    }
    if !input.path.is_empty() {
        writeln!(prompt, "EVENT CHAIN SO FAR:").unwrap();
        for (i, event) in input.path.iter().enumerate() {
            writeln!(prompt, "{}. {}", i + 1, event).unwrap();
        }
        prompt.push('\n');
    }
    if let Some(context) = input.context {
        writeln!(prompt, "ADDITIONAL CONTEXT:\n{context}\n").unwrap();
    }
    if let Some(domain) = input.domain {
        writeln!(prompt, "DOMAIN: {domain}\n").unwrap();
    }
    writeln!(
        prompt,
        "ANALYSIS DEPTH: level {} of {}\n",
        input.depth, input.max_depth
    )
    .unwrap();
    writeln!(
        prompt,
        "Research what is likely to follow from this event. Gather at least 3 \
         credible sources covering historical precedent, causal mechanisms, current \
         expert predictions, and evidence that cuts against the obvious outcome. \
         Search iteratively, then call `finish_research` when satisfied."
    )
    .unwrap();
    prompt
}

pub fn synthesis_prompt(input: &SynthesisPromptInput<'_>) -> String {
    let mut prompt = String::new();
    writeln!(
        prompt,
        "You are forecasting probability-weighted follow-on events.\n"
    )
    .unwrap();

    if let Some(seed) = input.seed_event {
        if seed != input.event {
            writeln!(prompt, "ORIGINAL SEED EVENT:\n{seed}\n").unwrap();
        }
    }
    if !input.path.is_empty() {
        writeln!(prompt, "EVENT CHAIN SO FAR:").unwrap();
        for (i, event) in input.path.iter().enumerate() {
            writeln!(prompt, "{}. {}", i + 1, event).unwrap();
        }
        prompt.push('\n');
    }
    writeln!(prompt, "CURRENT EVENT:\n{}\n", input.event).unwrap();
    writeln!(
        prompt,
        "TREE POSITION: depth {} of {}",
        input.depth, input.max_depth
    )
    .unwrap();
    if let Some(timeframe) = input.timeframe {
        writeln!(prompt, "TIMEFRAME: {timeframe}").unwrap();
    }
    writeln!(prompt, "\nRESEARCH:\n{}\n", input.research).unwrap();
    writeln!(
        prompt,
        "Based on the research, produce between 1 and 5 candidate follow-on events. \
         Each must be a specific, measurable outcome that could plausibly occur next, \
         and the probabilities must sum to 1.\n\n\
         Respond with STRICT JSON only, no prose, in exactly this shape:\n\
         [{{\"event\": \"...\", \"probability\": 0.0}}, ...]"
    )
    .unwrap();
    prompt
}

/// Tool declarations for the agentic research loop.
pub fn research_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            SEARCH_TOOL,
            "Execute one web search and return matching sources. Results already \
             seen from the same website are filtered out.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to execute"
                    }
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::function(
            FINISH_RESEARCH_TOOL,
            "Stop researching and report the findings gathered so far.",
            json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Concise summary of the research findings"
                    },
                    "confidence": {
                        "type": "string",
                        "enum": ["low", "medium", "high"],
                        "description": "Self-assessed confidence in the findings"
                    }
                },
                "required": ["summary", "confidence"]
            }),
        ),
    ]
}
