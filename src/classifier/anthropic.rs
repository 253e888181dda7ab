//! Anthropic messages-API client with tool calling.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::llm::{ChatModel, ToolDefinition, ToolSelection};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicChat {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicChat {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            api_key,
            model,
            client,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self> {
        let api_key =
            std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY must be set")?;
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, model, timeout)
    }

    async fn messages(&self, request_body: &Value) -> Result<Value> {
        debug!("Calling Anthropic API with model: {}", self.model);

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request_body)
            .send()
            .await
            .context("Failed to send Anthropic request")?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        if !status.is_success() {
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }

        Ok(body)
    }
}

/// Concatenated text blocks of a response.
fn collect_text(body: &Value) -> String {
    let mut text = String::new();
    if let Some(blocks) = body["content"].as_array() {
        for block in blocks {
            if block["type"] == "text" {
                if let Some(t) = block["text"].as_str() {
                    text.push_str(t);
                }
            }
        }
    }
    text
}

#[async_trait]
impl ChatModel for AnthropicChat {
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
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        let request_body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}],
            "tools": tool_payload,
        });

        let body = self.messages(&request_body).await?;

        if let Some(blocks) = body["content"].as_array() {
            for block in blocks {
                if block["type"] == "tool_use" {
                    let name = block["name"]
                        .as_str()
                        .ok_or_else(|| anyhow!("tool_use block without a name"))?
                        .to_string();
                    return Ok(Some(ToolSelection {
                        name,
                        arguments: block["input"].clone(),
                    }));
                }
            }
        }

        let preview: String = collect_text(&body).chars().take(200).collect();
        debug!("Model declined tool selection: {}", preview);
        Ok(None)
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request_body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}],
        });

        let body = self.messages(&request_body).await?;
        Ok(collect_text(&body))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
