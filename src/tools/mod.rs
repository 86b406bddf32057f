//! Sandboxed tool system.
//!
//! Tools are the only way the agent touches the filesystem. Each tool
//! declares a JSON Schema for its parameters, enabling LLM function-calling,
//! and resolves every path argument through the folder sandbox before acting.
//! Failures are recoverable by contract: a tool never returns `Err`, it
//! returns an error payload the model can read and react to. Mutating tools
//! honor `dry_run` and report the paths they touched to the self-change
//! suppressor.

pub mod fs;
pub mod text;
pub mod transfer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SmartfolderError;
use crate::suppressor::SelfChangeSuppressor;

/// Context passed to tools during execution.
pub struct ToolInvocation {
    /// Folder every path argument must stay inside.
    pub folder_root: PathBuf,
    /// When set, mutating tools validate but skip the mutation.
    pub dry_run: bool,
    /// Mutating tools mark touched paths here.
    pub suppressor: Arc<SelfChangeSuppressor>,
}

/// The JSON payload handed back to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub ok: bool,
    pub payload: Value,
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self { ok: true, payload }
    }

    pub fn error(tool: &str, target: &str, code: &str, message: String) -> Self {
        Self {
            ok: false,
            payload: json!({
                "tool": tool,
                "target": target,
                "error": code,
                "message": message,
            }),
        }
    }

    pub fn from_err(tool: &str, target: &str, err: &SmartfolderError) -> Self {
        Self::error(tool, target, err.code(), err.to_string())
    }

    pub fn skipped(tool: &str, target: &str) -> Self {
        Self {
            ok: true,
            payload: json!({
                "tool": tool,
                "target": target,
                "skipped": true,
                "reason": "dry_run",
            }),
        }
    }

    /// Rendering used for the `tool` role message fed back to the model.
    pub fn to_llm_string(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string())
    }
}

/// A sandboxed operation the agent may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique id used in function-calling (e.g. "rename_file").
    fn name(&self) -> &'static str;

    /// Human-readable description shown to the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with already-parsed arguments. Recoverable failures come back
    /// as `ok: false` results, never as panics or errors.
    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult;
}

/// OpenAI-format function definition for LLM function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// OpenAI-format tool definition (wraps FunctionDef).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

/// A tool call requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Ordered registry of the available tools.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// All nine tools in canonical order.
    pub fn with_defaults() -> Self {
        Self {
            tools: vec![
                Arc::new(fs::ReadFileTool),
                Arc::new(fs::WriteFileTool),
                Arc::new(transfer::RenameFileTool),
                Arc::new(transfer::MoveFileTool),
                Arc::new(text::GrepTool),
                Arc::new(text::SedTool),
                Arc::new(text::HeadTool),
                Arc::new(text::TailTool),
                Arc::new(fs::CreateFolderTool),
            ],
        }
    }

    /// A registry restricted to the named tool ids, preserving canonical
    /// order. Unknown ids are ignored with a warning.
    pub fn filtered(&self, ids: &[String]) -> Self {
        for id in ids {
            if !self.tools.iter().any(|t| t.name() == id) {
                tracing::warn!("unknown tool id '{}' in folder config, ignoring", id);
            }
        }
        Self {
            tools: self
                .tools
                .iter()
                .filter(|t| ids.iter().any(|id| id == t.name()))
                .cloned()
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Model-facing definitions, optionally narrowed to the ids the content
    /// provider considers appropriate for the current file.
    pub fn tool_definitions(&self, allowed: Option<&[&str]>) -> Vec<ToolDef> {
        self.tools
            .iter()
            .filter(|t| allowed.map_or(true, |ids| ids.contains(&t.name())))
            .map(|t| ToolDef {
                tool_type: "function".to_string(),
                function: FunctionDef {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    /// Execute a single call, logging the invocation.
    pub async fn execute_call(&self, call: &ToolCall, ctx: &ToolInvocation) -> ToolResult {
        let started = Instant::now();
        let result = match self.get(&call.name) {
            Some(tool) => tool.execute(&call.arguments, ctx).await,
            None => ToolResult::error(
                &call.name,
                "",
                "UnknownTool",
                format!("unknown tool: {}", call.name),
            ),
        };

        tracing::debug!(
            tool = call.name.as_str(),
            args = %sanitize_args(&call.arguments),
            duration_ms = started.elapsed().as_millis() as u64,
            success = result.ok,
            output = %truncate(&result.to_llm_string(), 200),
            "tool invocation"
        );
        result
    }
}

/// Clip long string values (file contents, mostly) out of log output.
fn sanitize_args(args: &Value) -> String {
    fn clip(value: &Value) -> Value {
        match value {
            Value::String(s) if s.chars().count() > 120 => {
                let prefix: String = s.chars().take(120).collect();
                Value::String(format!("{}… ({} chars)", prefix, s.chars().count()))
            }
            Value::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), clip(v))).collect())
            }
            Value::Array(arr) => Value::Array(arr.iter().map(clip).collect()),
            other => other.clone(),
        }
    }
    clip(args).to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let prefix: String = s.chars().take(max).collect();
        format!("{}…", prefix)
    }
}

/// Shared argument accessor: returns the string value or an error result
/// naming the missing parameter.
pub(crate) fn require_str<'a>(
    tool: &str,
    args: &'a Value,
    key: &str,
) -> Result<&'a str, ToolResult> {
    args[key].as_str().ok_or_else(|| {
        ToolResult::error(
            tool,
            "",
            "BadArguments",
            format!("missing '{}' parameter", key),
        )
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::Path;

    pub fn ctx(root: &Path) -> ToolInvocation {
        ToolInvocation {
            folder_root: root.to_path_buf(),
            dry_run: false,
            suppressor: Arc::new(SelfChangeSuppressor::new()),
        }
    }

    pub fn dry_ctx(root: &Path) -> ToolInvocation {
        ToolInvocation {
            folder_root: root.to_path_buf(),
            dry_run: true,
            suppressor: Arc::new(SelfChangeSuppressor::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_nine_tools() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "read_file",
                "write_file",
                "rename_file",
                "move_file",
                "grep",
                "sed",
                "head",
                "tail",
                "create_folder",
            ]
        );
    }

    #[test]
    fn filtered_registry_keeps_canonical_order() {
        let registry = ToolRegistry::with_defaults();
        let subset = registry.filtered(&["sed".to_string(), "read_file".to_string()]);
        assert_eq!(subset.names(), vec!["read_file", "sed"]);
    }

    #[test]
    fn filtered_ignores_unknown_ids() {
        let registry = ToolRegistry::with_defaults();
        let subset = registry.filtered(&["no_such_tool".to_string(), "head".to_string()]);
        assert_eq!(subset.names(), vec!["head"]);
    }

    #[test]
    fn tool_definitions_are_openai_format() {
        let registry = ToolRegistry::with_defaults();
        let defs = registry.tool_definitions(None);
        assert_eq!(defs.len(), 9);
        assert!(defs.iter().all(|d| d.tool_type == "function"));
        let json = serde_json::to_value(&defs[0]).unwrap();
        assert!(json["function"]["parameters"]["type"].is_string());
    }

    #[test]
    fn tool_definitions_can_be_narrowed() {
        let registry = ToolRegistry::with_defaults();
        let defs = registry.tool_definitions(Some(&["rename_file", "move_file"]));
        assert_eq!(defs.len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_call_returns_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::with_defaults();
        let result = registry
            .execute_call(
                &ToolCall {
                    name: "teleport".into(),
                    arguments: json!({}),
                },
                &test_support::ctx(dir.path()),
            )
            .await;
        assert!(!result.ok);
        assert_eq!(result.payload["error"], "UnknownTool");
    }

    #[test]
    fn sanitize_clips_long_strings() {
        let args = json!({"contents": "x".repeat(500), "path": "a.txt"});
        let rendered = sanitize_args(&args);
        assert!(rendered.len() < 400);
        assert!(rendered.contains("500 chars"));
        assert!(rendered.contains("a.txt"));
    }
}
