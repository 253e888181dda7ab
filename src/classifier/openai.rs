//! OpenAI chat-completions client with tool calling.
//!
//! `OPENAI_BASE_URL` points the client at any OpenAI-compatible endpoint,
//! which is how Azure-hosted deployments are reached.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::llm::{ChatModel, ToolDefinition, ToolSelection};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiChat {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            api_key,
            model,
            base_url,
            client,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, model, base_url, timeout)
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ChatResponse> {
        debug!("Calling OpenAI API with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send OpenAI request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, error_text));
        }

        response
            .json()
            .await
            .context("Failed to parse OpenAI response")
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallEntry>,
}

#[derive(Deserialize)]
struct ToolCallEntry {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

fn messages<'a>(system_prompt: &'a str, user_prompt: &'a str) -> Vec<Message<'a>> {
    vec![
        Message {
            role: "system",
            content: system_prompt,
        },
        Message {
            role: "user",
            content: user_prompt,
        },
    ]
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn select_tool(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<Option<ToolSelection>> {
        let tool_payload: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();

        let request = ChatRequest {
            model: &self.model,
            messages: messages(system_prompt, user_prompt),
            temperature: 0.1,
            tools: Some(tool_payload),
            tool_choice: Some("auto"),
        };

        let result = self.chat(&request).await?;
        let message = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("OpenAI response contained no choices"))?;

        let Some(call) = message.tool_calls.into_iter().next() else {
            let content = message.content.unwrap_or_default();
            let preview: String = content.chars().take(200).collect();
            debug!("Model declined tool selection: {}", preview);
            return Ok(None);
        };

        let arguments: Value = serde_json::from_str(&call.function.arguments)
            .with_context(|| format!("Tool call '{}' carried invalid JSON", call.function.name))?;

        Ok(Some(ToolSelection {
            name: call.function.name,
            arguments,
        }))
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages(system_prompt, user_prompt),
            temperature: 0.3,
            tools: None,
            tool_choice: None,
        };

        let result = self.chat(&request).await?;
        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
