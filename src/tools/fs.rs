//! File creation and inspection tools (read_file, write_file, create_folder).

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{require_str, Tool, ToolInvocation, ToolResult};
use crate::classify::is_binary_extension;
use crate::error::SmartfolderError;
use crate::sandbox::{self, MAX_READ_BYTES};

// ============================================================================
// ReadFileTool
// ============================================================================

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a text file inside the folder and return its contents. \
         Refuses binary files (their bytes are already attached to the prompt) \
         and files over 256 KiB."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the watched folder"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let path_str = match require_str(self.name(), args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };

        if is_binary_extension(sandbox::extension_of(std::path::Path::new(path_str)).as_deref()) {
            return ToolResult::from_err(
                self.name(),
                path_str,
                &SmartfolderError::BinaryToolMisuse(path_str.to_string()),
            );
        }

        let abs = match sandbox::contain(&ctx.folder_root, path_str) {
            Ok(p) => p,
            Err(e) => return ToolResult::from_err(self.name(), path_str, &e),
        };

        match sandbox::read_capped(&abs, MAX_READ_BYTES).await {
            Ok(bytes) => {
                let preview = String::from_utf8_lossy(&bytes).to_string();
                ToolResult::success(json!({
                    "tool": self.name(),
                    "target": path_str,
                    "bytes": bytes.len(),
                    "preview": preview,
                }))
            }
            Err(e) => ToolResult::from_err(self.name(), path_str, &e),
        }
    }
}

// ============================================================================
// WriteFileTool
// ============================================================================

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create a brand-new text file inside the folder. Fails if the target \
         already exists; never use this to rename (use rename_file). Parent \
         directories are created as needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path for the new file, relative to the watched folder"
                },
                "contents": {
                    "type": "string",
                    "description": "Text contents for the new file"
                }
            },
            "required": ["path", "contents"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let path_str = match require_str(self.name(), args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let contents = match require_str(self.name(), args, "contents") {
            Ok(c) => c,
            Err(e) => return e,
        };

        if is_binary_extension(sandbox::extension_of(std::path::Path::new(path_str)).as_deref()) {
            return ToolResult::from_err(
                self.name(),
                path_str,
                &SmartfolderError::BinaryToolMisuse(path_str.to_string()),
            );
        }

        let abs = match sandbox::contain(&ctx.folder_root, path_str) {
            Ok(p) => p,
            Err(e) => return ToolResult::from_err(self.name(), path_str, &e),
        };

        if let Err(e) = sandbox::assert_not_exists(&abs).await {
            return ToolResult::from_err(self.name(), path_str, &e);
        }

        if ctx.dry_run {
            return ToolResult::skipped(self.name(), path_str);
        }

        if let Err(e) = sandbox::ensure_parent_dir(&abs).await {
            return ToolResult::from_err(self.name(), path_str, &e);
        }
        if let Err(e) = tokio::fs::write(&abs, contents).await {
            return ToolResult::from_err(self.name(), path_str, &e.into());
        }

        ctx.suppressor.mark(&abs);
        tracing::info!(path = %abs.display(), bytes = contents.len(), "wrote new file");

        ToolResult::success(json!({
            "tool": self.name(),
            "target": path_str,
            "written": contents.len(),
            "message": format!("created {} ({} bytes)", path_str, contents.len()),
        }))
    }
}

// ============================================================================
// CreateFolderTool
// ============================================================================

pub struct CreateFolderTool;

#[async_trait]
impl Tool for CreateFolderTool {
    fn name(&self) -> &'static str {
        "create_folder"
    }

    fn description(&self) -> &'static str {
        "Create a new directory (and any missing parents) inside the folder. \
         Fails if the target already exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the watched folder"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let path_str = match require_str(self.name(), args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };

        let abs = match sandbox::contain(&ctx.folder_root, path_str) {
            Ok(p) => p,
            Err(e) => return ToolResult::from_err(self.name(), path_str, &e),
        };

        if let Err(e) = sandbox::assert_not_exists(&abs).await {
            return ToolResult::from_err(self.name(), path_str, &e);
        }

        if ctx.dry_run {
            return ToolResult::skipped(self.name(), path_str);
        }

        if let Err(e) = tokio::fs::create_dir_all(&abs).await {
            return ToolResult::from_err(self.name(), path_str, &e.into());
        }

        ctx.suppressor.mark(&abs);

        ToolResult::success(json!({
            "tool": self.name(),
            "target": path_str,
            "created": true,
            "message": format!("created folder {}", path_str),
        }))
    }
}
