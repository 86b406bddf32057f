//! Agent driver: the model/tool exchange for one job.
//!
//! 1. Send (system, user, tool definitions) to the model.
//! 2. If the response carries tool calls, execute them in order and feed
//!    each result back as a `tool` message.
//! 3. Stop on a final text response, the step cap, or a provider error.
//!
//! Per-tool failures are not fatal: the error payload goes back to the model,
//! which may retry or move on. Provider errors are wrapped with a diagnostic
//! hint and surfaced to the job runner.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::llm_client::{ChatMessage, ChatModel};
use crate::prompt::UserMessage;
use crate::tools::{ToolCall, ToolInvocation, ToolRegistry, ToolResult};

/// Record of one executed tool call.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub result: ToolResult,
}

/// What a finished loop hands back to the job runner.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub final_text: Option<String>,
    pub tool_results: Vec<ToolCallRecord>,
    /// Model round-trips used.
    pub steps: usize,
    pub hit_limit: bool,
}

pub struct AgentDriver {
    model: Arc<dyn ChatModel>,
    max_tool_calls: usize,
}

impl AgentDriver {
    pub fn new(model: Arc<dyn ChatModel>, max_tool_calls: usize) -> Self {
        Self {
            model,
            max_tool_calls: max_tool_calls.max(1),
        }
    }

    pub async fn run(
        &self,
        model_id: &str,
        system_prompt: &str,
        user_message: &UserMessage,
        registry: &ToolRegistry,
        allowed_tools: &[&str],
        ctx: &ToolInvocation,
    ) -> Result<AgentOutcome> {
        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_message),
        ];
        let tool_defs = registry.tool_definitions(Some(allowed_tools));

        let mut tool_results: Vec<ToolCallRecord> = Vec::new();
        let mut steps = 0usize;

        loop {
            if steps >= self.max_tool_calls {
                tracing::warn!(
                    limit = self.max_tool_calls,
                    "agent loop hit its round-trip limit"
                );
                return Ok(AgentOutcome {
                    final_text: Some(format!(
                        "[stopped after {} model round-trips]",
                        self.max_tool_calls
                    )),
                    tool_results,
                    steps,
                    hit_limit: true,
                });
            }
            steps += 1;

            tracing::debug!(step = steps, model = model_id, "calling model");
            let turn = self
                .model
                .complete(model_id, &messages, &tool_defs)
                .await
                .context(
                    "model call failed (possible causes: unsupported file type for this model, \
                     model mis-configuration, or a gateway problem)",
                )?;

            if turn.tool_calls.is_empty() {
                tracing::debug!(steps, "agent loop finished with final text");
                return Ok(AgentOutcome {
                    final_text: turn.content,
                    tool_results,
                    steps,
                    hit_limit: false,
                });
            }

            // Later calls may reference files renamed by earlier ones, so
            // execution is strictly sequential in model order.
            messages.push(ChatMessage::assistant(&turn));
            for tc in &turn.tool_calls {
                let arguments = parse_arguments(&tc.function.arguments);
                let call = ToolCall {
                    name: tc.function.name.clone(),
                    arguments: arguments.clone(),
                };
                let result = registry.execute_call(&call, ctx).await;
                messages.push(ChatMessage::tool_result(&tc.id, result.to_llm_string()));
                tool_results.push(ToolCallRecord {
                    tool_name: tc.function.name.clone(),
                    arguments,
                    result,
                });
            }
        }
    }
}

/// Argument strings that fail to parse degrade to `{}` with a warning.
fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("tool arguments were not valid JSON ({}), using empty object", e);
        serde_json::json!({})
    })
}
