use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{Conversation, DraftGraph, Message};

/// Produces a draft graph fragment from a conversation.
///
/// Errors are transport or service failures only. A draft that is malformed
/// or non-conformant is still a successful generation; judging it is the
/// validator's job.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate(&self, context: &Conversation) -> Result<DraftGraph>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// Sampling temperature; the model default when unset.
    pub temperature: Option<f32>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            temperature: Some(0.0),
        }
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    format: &'a str, // "json" for structured output
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            client: reqwest::Client::new(),
        }
    }

    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: "json", // Force JSON output
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl DraftGenerator for OllamaClient {
    async fn generate(&self, context: &Conversation) -> Result<DraftGraph> {
        let raw = self.chat(context.messages()).await?;
        let draft = DraftGraph::from_generator_output(&raw);
        debug!(
            model = %self.model,
            variables = draft.variables.len(),
            content_len = draft.content.len(),
            "Generated draft"
        );
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let messages = vec![Message::system("s"), Message::user("u")];
        let request = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
            format: "json",
            options: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "u");
        assert_eq!(value["format"], "json");
        assert!(value.get("options").is_none());
    }
}
