//! LLM access for PsychoHistory.
//!
//! [`LLMProvider`] is the seam the engine depends on: plain completions,
//! strict-JSON completions, and tool-calling completions. The OpenRouter
//! provider is the production implementation; [`ScriptedProvider`] replays
//! canned responses for deterministic tests.

pub mod json;
pub mod llm_provider;
pub mod openrouter_provider;
pub mod prompts;
pub mod scripted;

pub use json::extract_json;
pub use llm_provider::*;
pub use openrouter_provider::{OpenRouterConfig, OpenRouterProvider};
pub use scripted::ScriptedProvider;
