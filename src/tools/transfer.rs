//! Rename and move tools.
//!
//! Both enforce containment on source and destination and refuse to change a
//! file's extension. `move_file` additionally handles directories, where the
//! extension rule does not apply.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{require_str, Tool, ToolInvocation, ToolResult};
use crate::error::SmartfolderError;
use crate::sandbox::{self, extension_of};

/// Check the extension-preservation rule and produce the suggested
/// replacement name on violation.
fn check_extension(from: &str, to: &str) -> Result<(), SmartfolderError> {
    let expected = match extension_of(Path::new(from)) {
        Some(e) => e,
        None => return Ok(()),
    };
    match extension_of(Path::new(to)) {
        Some(ref got) if *got == expected => Ok(()),
        _ => {
            let mut suggestion = std::path::PathBuf::from(to);
            suggestion.set_extension(&expected);
            Err(SmartfolderError::ExtensionMismatch {
                expected,
                suggestion: suggestion.to_string_lossy().to_string(),
            })
        }
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

// ============================================================================
// RenameFileTool
// ============================================================================

pub struct RenameFileTool;

#[async_trait]
impl Tool for RenameFileTool {
    fn name(&self) -> &'static str {
        "rename_file"
    }

    fn description(&self) -> &'static str {
        "Rename a file inside the folder. The new name must keep the original \
         extension. Fails if the source is missing or the destination exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": {
                    "type": "string",
                    "description": "Current path, relative to the watched folder"
                },
                "to": {
                    "type": "string",
                    "description": "New path; must end with the same extension as 'from'"
                }
            },
            "required": ["from", "to"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let from = match require_str(self.name(), args, "from") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let to = match require_str(self.name(), args, "to") {
            Ok(p) => p,
            Err(e) => return e,
        };

        relocate(self.name(), from, to, true, ctx).await
    }
}

// ============================================================================
// MoveFileTool
// ============================================================================

pub struct MoveFileTool;

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &'static str {
        "move_file"
    }

    fn description(&self) -> &'static str {
        "Move a file or directory to another location inside the folder. \
         Files must keep their extension; directories are exempt from the \
         extension rule."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": {
                    "type": "string",
                    "description": "Current path, relative to the watched folder"
                },
                "to": {
                    "type": "string",
                    "description": "Destination path inside the watched folder"
                }
            },
            "required": ["from", "to"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let from = match require_str(self.name(), args, "from") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let to = match require_str(self.name(), args, "to") {
            Ok(p) => p,
            Err(e) => return e,
        };

        relocate(self.name(), from, to, false, ctx).await
    }
}

/// Shared rename/move body. `always_check_extension` is set for
/// `rename_file`; `move_file` skips the check when the source is a directory.
async fn relocate(
    tool: &str,
    from: &str,
    to: &str,
    always_check_extension: bool,
    ctx: &ToolInvocation,
) -> ToolResult {
    let from_abs = match sandbox::contain(&ctx.folder_root, from) {
        Ok(p) => p,
        Err(e) => return ToolResult::from_err(tool, from, &e),
    };
    let to_abs = match sandbox::contain(&ctx.folder_root, to) {
        Ok(p) => p,
        Err(e) => return ToolResult::from_err(tool, to, &e),
    };

    let from_meta = match tokio::fs::symlink_metadata(&from_abs).await {
        Ok(m) => m,
        Err(_) => {
            return ToolResult::from_err(
                tool,
                from,
                &SmartfolderError::Missing(from.to_string()),
            )
        }
    };

    if always_check_extension || !from_meta.is_dir() {
        if let Err(e) = check_extension(from, to) {
            return ToolResult::from_err(tool, to, &e);
        }
    }

    if let Err(e) = sandbox::assert_not_exists(&to_abs).await {
        return ToolResult::from_err(tool, to, &e);
    }

    if ctx.dry_run {
        return ToolResult::skipped(tool, from);
    }

    if let Err(e) = sandbox::ensure_parent_dir(&to_abs).await {
        return ToolResult::from_err(tool, to, &e);
    }
    if let Err(e) = tokio::fs::rename(&from_abs, &to_abs).await {
        return ToolResult::from_err(tool, from, &e.into());
    }

    ctx.suppressor.mark(&from_abs);
    ctx.suppressor.mark(&to_abs);

    let old_name = file_name(from);
    let new_name = file_name(to);
    tracing::info!(from = %from_abs.display(), to = %to_abs.display(), "relocated");

    ToolResult::success(json!({
        "tool": tool,
        "target": from,
        "renamed": true,
        "oldName": old_name,
        "newName": new_name,
        "message": format!("{} -> {}", from, to),
    }))
}
