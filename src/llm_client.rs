//! OpenAI-compatible chat-completions transport.
//!
//! The agent driver only sees the [`ChatModel`] trait; the gateway client
//! implements it over HTTP. Binary prompt parts are encoded here as base64
//! data URLs, keeping the prompt builder transport-agnostic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::prompt::{MessagePart, UserMessage};
use crate::state::StateManager;
use crate::tools::ToolDef;

/// Wire-format message content: plain text or typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    pub filename: String,
    pub file_data: String,
}

/// A message in the conversation (OpenAI chat format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<LlmToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(MessageContent::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(message: &UserMessage) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(encode_user_message(message)),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(turn: &AssistantTurn) -> Self {
        Self {
            role: "assistant".to_string(),
            content: turn.content.clone().map(MessageContent::Text),
            tool_calls: if turn.tool_calls.is_empty() {
                None
            } else {
                Some(turn.tool_calls.clone())
            },
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: &str, text: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(MessageContent::Text(text)),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

/// Tool call as returned by the model (OpenAI format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: LlmFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFunctionCall {
    pub name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

/// One assistant response: final text, requested tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<LlmToolCall>,
}

/// The model-facing interface the agent driver runs against.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<AssistantTurn>;
}

/// Encode a prompt-layer user message into wire content, base64-ing binary
/// parts as data URLs.
fn encode_user_message(message: &UserMessage) -> MessageContent {
    match message {
        UserMessage::Text(text) => MessageContent::Text(text.clone()),
        UserMessage::Parts(parts) => MessageContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    MessagePart::Text { text } => ContentPart::Text { text: text.clone() },
                    MessagePart::Image { bytes, media_type } => ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(media_type, bytes),
                        },
                    },
                    MessagePart::File {
                        bytes,
                        media_type,
                        name,
                    } => ContentPart::File {
                        file: FileData {
                            filename: name.clone(),
                            file_data: data_url(media_type, bytes),
                        },
                    },
                })
                .collect(),
        ),
    }
}

fn data_url(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        media_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// HTTP client for an OpenAI-compatible gateway.
#[derive(Clone)]
pub struct GatewayClient {
    api_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(api_url: String, api_key: Option<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    /// `AI_GATEWAY_API_KEY`, falling back to the home-dir token file.
    pub fn resolve_api_key(state: &StateManager) -> Option<String> {
        if let Ok(key) = std::env::var("AI_GATEWAY_API_KEY") {
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Some(key);
            }
        }
        std::fs::read_to_string(state.token_path())
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait]
impl ChatModel for GatewayClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<AssistantTurn> {
        let url = format!("{}/chat/completions", self.api_url);

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await.context("failed to send LLM request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(500).collect();
            anyhow::bail!("LLM API error {}: {}", status, excerpt);
        }

        let response_json: serde_json::Value =
            response.json().await.context("failed to parse LLM response")?;

        let message = response_json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .map(|choice| &choice["message"])
            .context("empty choices in LLM response")?;

        let content = message["content"].as_str().map(String::from);
        let tool_calls: Vec<LlmToolCall> = message
            .get("tool_calls")
            .and_then(|tc| serde_json::from_value(tc.clone()).ok())
            .unwrap_or_default();

        Ok(AssistantTurn {
            content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serializes_flat() {
        let msg = ChatMessage::system("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn image_part_becomes_data_url() {
        let user = UserMessage::Parts(vec![
            MessagePart::Text {
                text: "look".into(),
            },
            MessagePart::Image {
                bytes: vec![1, 2, 3],
                media_type: "image/png".into(),
            },
        ]);
        let json = serde_json::to_value(ChatMessage::user(&user)).unwrap();
        let parts = json["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.ends_with("AQID"));
    }

    #[test]
    fn file_part_carries_filename() {
        let user = UserMessage::Parts(vec![
            MessagePart::Text { text: "doc".into() },
            MessagePart::File {
                bytes: vec![0x25],
                media_type: "application/pdf".into(),
                name: "a.pdf".into(),
            },
        ]);
        let json = serde_json::to_value(ChatMessage::user(&user)).unwrap();
        let parts = json["content"].as_array().unwrap();
        assert_eq!(parts[1]["type"], "file");
        assert_eq!(parts[1]["file"]["filename"], "a.pdf");
        assert!(parts[1]["file"]["file_data"]
            .as_str()
            .unwrap()
            .starts_with("data:application/pdf;base64,"));
    }

    #[test]
    fn tool_result_message_has_call_id() {
        let msg = ChatMessage::tool_result("call_9", "{\"ok\":true}".into());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
    }

    #[test]
    fn assistant_turn_without_tool_calls_omits_field() {
        let turn = AssistantTurn {
            content: Some("done".into()),
            tool_calls: Vec::new(),
        };
        let json = serde_json::to_value(ChatMessage::assistant(&turn)).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert_eq!(json["content"], "done");
    }

    #[test]
    fn api_key_prefers_environment() {
        // Hermetic: only the token file is exercised; the env var path is
        // covered by resolve order and left untouched here.
        let home = tempfile::tempdir().unwrap();
        let state = StateManager::new(home.path().to_path_buf());
        std::fs::write(state.token_path(), "tok-123\n").unwrap();
        if std::env::var("AI_GATEWAY_API_KEY").is_err() {
            assert_eq!(
                GatewayClient::resolve_api_key(&state).as_deref(),
                Some("tok-123")
            );
        }
    }
}
