//! Chat-model trait for intent classification and narratives.
//!
//! The pipeline talks to language models through this seam so the engine
//! can run against a stub in tests and against OpenAI or Anthropic in
//! production. Providers translate [`ToolDefinition`]s into their own tool
//! payload shapes.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// One selectable tool, JSON schema included.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The model's choice: which tool and with what arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSelection {
    pub name: String,
    pub arguments: Value,
}

/// Provider-agnostic chat interface.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Ask the model to pick one tool from `tools` for the user prompt.
    ///
    /// `Ok(None)` means the model answered in plain text instead of
    /// selecting a tool; the caller decides what that refusal means.
    async fn select_tool(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<Option<ToolSelection>>;

    /// Plain text completion, used for result narratives.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}
