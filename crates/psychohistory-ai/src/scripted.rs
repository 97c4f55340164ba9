use crate::llm_provider::*;
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Deterministic provider for tests: replays a fixed script of responses and
/// records every conversation it was handed.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<LLMResponse>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<LLMResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Conversations received so far, in call order.
    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next(&self, messages: &[Message]) -> LLMResult<LLMResponse> {
        self.calls.lock().push(messages.to_vec());
        self.script
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted provider exhausted after {} calls", self.call_count()))
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.next(messages)
    }

    async fn generate_chat_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _tool_choice: ToolChoice,
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.next(messages)
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_in_order_then_errors() {
        let provider = ScriptedProvider::new(vec![
            LLMResponse::text("first"),
            LLMResponse::text("second"),
        ]);

        let a = provider.generate("hi").await.unwrap();
        let b = provider.generate("hi").await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert!(provider.generate("hi").await.is_err());
        assert_eq!(provider.call_count(), 3);
    }
}
