//! Text inspection and editing tools (grep, sed, head, tail).
//!
//! All four operate only on text-extension files of at most 256 KiB. The
//! `sed` find string is escaped before it reaches the pattern engine, so
//! user input is always matched literally.

use std::path::Path;

use async_trait::async_trait;
use regex_lite::RegexBuilder;
use serde_json::{json, Value};

use super::{require_str, Tool, ToolInvocation, ToolResult};
use crate::classify::is_binary_extension;
use crate::error::SmartfolderError;
use crate::sandbox::{self, MAX_READ_BYTES};

const MAX_GREP_MATCHES: usize = 100;
const DEFAULT_LINES: u64 = 10;

/// Resolve and read a text file for the four text tools: binary-extension
/// gate, containment, then a capped read.
async fn read_text(
    tool: &str,
    path_str: &str,
    ctx: &ToolInvocation,
) -> Result<(std::path::PathBuf, String), ToolResult> {
    if is_binary_extension(sandbox::extension_of(Path::new(path_str)).as_deref()) {
        return Err(ToolResult::from_err(
            tool,
            path_str,
            &SmartfolderError::BinaryToolMisuse(path_str.to_string()),
        ));
    }

    let abs = sandbox::contain(&ctx.folder_root, path_str)
        .map_err(|e| ToolResult::from_err(tool, path_str, &e))?;

    let bytes = sandbox::read_capped(&abs, MAX_READ_BYTES)
        .await
        .map_err(|e| ToolResult::from_err(tool, path_str, &e))?;

    Ok((abs, String::from_utf8_lossy(&bytes).to_string()))
}

// ============================================================================
// GrepTool
// ============================================================================

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search a text file for a literal substring. Returns matching lines \
         with their line numbers, up to 100 matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Text file to search, relative to the watched folder"
                },
                "pattern": {
                    "type": "string",
                    "description": "Literal substring to look for (not a regex)"
                },
                "caseInsensitive": {
                    "type": "boolean",
                    "description": "Match case-insensitively (default false)"
                }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let path_str = match require_str(self.name(), args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let pattern = match require_str(self.name(), args, "pattern") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let case_insensitive = args["caseInsensitive"].as_bool().unwrap_or(false);

        let (_, text) = match read_text(self.name(), path_str, ctx).await {
            Ok(v) => v,
            Err(e) => return e,
        };

        let needle = if case_insensitive {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };

        let mut matches = Vec::new();
        let mut total = 0usize;
        for (idx, line) in text.lines().enumerate() {
            let haystack;
            let line_ref = if case_insensitive {
                haystack = line.to_lowercase();
                haystack.as_str()
            } else {
                line
            };
            if line_ref.contains(&needle) {
                total += 1;
                if matches.len() < MAX_GREP_MATCHES {
                    matches.push(json!({"line": idx + 1, "content": line}));
                }
            }
        }

        ToolResult::success(json!({
            "tool": self.name(),
            "target": path_str,
            "matches": matches,
            "total_matches": total,
            "truncated": total > MAX_GREP_MATCHES,
        }))
    }
}

// ============================================================================
// SedTool
// ============================================================================

pub struct SedTool;

#[async_trait]
impl Tool for SedTool {
    fn name(&self) -> &'static str {
        "sed"
    }

    fn description(&self) -> &'static str {
        "Replace every occurrence of a literal string in a text file. The \
         search string is matched literally, never as a regex. The file is \
         rewritten only if something actually changed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Text file to edit, relative to the watched folder"
                },
                "find": {
                    "type": "string",
                    "description": "Literal string to replace"
                },
                "replace": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "caseInsensitive": {
                    "type": "boolean",
                    "description": "Match case-insensitively (default false)"
                }
            },
            "required": ["path", "find", "replace"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        let path_str = match require_str(self.name(), args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let find = match require_str(self.name(), args, "find") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let replace = match require_str(self.name(), args, "replace") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let case_insensitive = args["caseInsensitive"].as_bool().unwrap_or(false);

        let (abs, text) = match read_text(self.name(), path_str, ctx).await {
            Ok(v) => v,
            Err(e) => return e,
        };

        // The user string is escaped so the engine only ever sees a literal.
        let pattern = match RegexBuilder::new(&regex_lite::escape(find))
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                return ToolResult::error(
                    self.name(),
                    path_str,
                    "BadArguments",
                    format!("could not build search pattern: {}", e),
                )
            }
        };

        let replacements = pattern.find_iter(&text).count();
        // Closure replacer: the replacement text is taken verbatim, with no
        // capture-group expansion of `$` sequences.
        let new_text = pattern
            .replace_all(&text, |_: &regex_lite::Captures<'_>| replace.to_string())
            .to_string();
        let changed = new_text != text;

        if ctx.dry_run {
            return ToolResult::skipped(self.name(), path_str);
        }

        if changed {
            if let Err(e) = tokio::fs::write(&abs, &new_text).await {
                return ToolResult::from_err(self.name(), path_str, &e.into());
            }
            ctx.suppressor.mark(&abs);
        }

        ToolResult::success(json!({
            "tool": self.name(),
            "target": path_str,
            "replacements": replacements,
            "changed": changed,
            "message": if changed {
                format!("replaced {} occurrence(s) in {}", replacements, path_str)
            } else {
                format!("no occurrences of the search string in {}", path_str)
            },
        }))
    }
}

// ============================================================================
// HeadTool / TailTool
// ============================================================================

pub struct HeadTool;

#[async_trait]
impl Tool for HeadTool {
    fn name(&self) -> &'static str {
        "head"
    }

    fn description(&self) -> &'static str {
        "Return the first N lines of a text file (default 10)."
    }

    fn parameters_schema(&self) -> Value {
        lines_schema()
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        slice_lines(self.name(), args, ctx, true).await
    }
}

pub struct TailTool;

#[async_trait]
impl Tool for TailTool {
    fn name(&self) -> &'static str {
        "tail"
    }

    fn description(&self) -> &'static str {
        "Return the last N lines of a text file (default 10)."
    }

    fn parameters_schema(&self) -> Value {
        lines_schema()
    }

    async fn execute(&self, args: &Value, ctx: &ToolInvocation) -> ToolResult {
        slice_lines(self.name(), args, ctx, false).await
    }
}

fn lines_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": "Text file to read, relative to the watched folder"
            },
            "lines": {
                "type": "integer",
                "description": "Number of lines (default 10)"
            }
        },
        "required": ["path"]
    })
}

async fn slice_lines(tool: &str, args: &Value, ctx: &ToolInvocation, from_start: bool) -> ToolResult {
    let path_str = match require_str(tool, args, "path") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let count = args["lines"].as_u64().unwrap_or(DEFAULT_LINES) as usize;

    let (_, text) = match read_text(tool, path_str, ctx).await {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lines: Vec<&str> = text.lines().collect();
    let selected: Vec<&str> = if from_start {
        lines.iter().take(count).copied().collect()
    } else {
        lines
            .iter()
            .skip(lines.len().saturating_sub(count))
            .copied()
            .collect()
    };

    ToolResult::success(json!({
        "tool": tool,
        "target": path_str,
        "lines": selected.len(),
        "text": selected.join("\n"),
    }))
}
