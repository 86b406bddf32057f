//! End-to-end processing of one file event.
//!
//! classify -> extract metadata -> select model -> assemble content ->
//! build prompt -> run the agent loop -> append a history record. Workflow
//! failures are caught at this boundary: whatever happens, the job appends
//! exactly one history record (success or error) and the folder queue
//! continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use crate::agent::AgentDriver;
use crate::classify::{classify, FileCategory};
use crate::config::FolderSpec;
use crate::content::{build_content, ContentLimits};
use crate::llm_client::ChatModel;
use crate::metadata::{extract_core, ExtractorSet, MetadataBlob};
use crate::models;
use crate::prompt::{build_system_prompt, build_user_message};
use crate::sandbox::extension_of;
use crate::state::{append_history, HistoryRecord, StateManager};
use crate::suppressor::SelfChangeSuppressor;
use crate::tools::{ToolInvocation, ToolRegistry};

/// Everything a folder's jobs share. Cheap to clone into the queue worker.
#[derive(Clone)]
pub struct JobContext {
    pub spec: Arc<FolderSpec>,
    pub model: Arc<dyn ChatModel>,
    /// Configured model preference, passed to the capability selector.
    pub model_pref: Option<String>,
    pub max_tool_calls: usize,
    pub limits: ContentLimits,
    pub extractors: ExtractorSet,
    pub suppressor: Arc<SelfChangeSuppressor>,
    /// Already filtered to the folder's configured tool subset.
    pub registry: Arc<ToolRegistry>,
    pub state: StateManager,
}

/// Run one job and record its outcome. The returned error (if any) has
/// already been written to history; it propagates only so the queue can log
/// it.
pub async fn process_file(ctx: JobContext, path: PathBuf) -> Result<()> {
    let relative = path
        .strip_prefix(&ctx.spec.path)
        .unwrap_or(&path)
        .to_string_lossy()
        .to_string();

    let outcome = run_pipeline(&ctx, &path).await;

    let record = match &outcome {
        Ok(result) => HistoryRecord::success(&relative, result.clone()),
        Err(e) => HistoryRecord::failure(&relative, format!("{:#}", e)),
    };
    append_history(&ctx.spec.history_path, &record);

    if let Err(e) = ctx
        .state
        .ensure_metadata(&ctx.spec.path, Some(&ctx.spec.prompt))
    {
        tracing::warn!(
            folder = %ctx.spec.path.display(),
            "failed to update folder metadata: {}",
            e
        );
    }

    outcome.map(|_| ())
}

async fn run_pipeline(ctx: &JobContext, path: &Path) -> Result<serde_json::Value> {
    let fs_meta = tokio::fs::symlink_metadata(path)
        .await
        .context("event file disappeared before processing")?;

    let extension = extension_of(path);
    let category = if fs_meta.is_dir() {
        FileCategory::Folder
    } else {
        classify(
            extension.as_deref(),
            crate::classify::mime_for_extension(extension.as_deref()),
        )
    };

    let core = extract_core(&ctx.spec.path, path, category)
        .await
        .context("metadata extraction failed")?;
    let typed = ctx.extractors.extract(category, path).await;
    let blob = MetadataBlob { core, typed };

    let caps = models::select(category, blob.core.size, ctx.model_pref.as_deref());
    tracing::debug!(
        file = %path.display(),
        category = ?category,
        model = caps.id,
        "model selected"
    );

    let mut content = build_content(path, blob, caps, &ctx.limits).await;
    // Offer only tools that are both category-appropriate and enabled for
    // this folder.
    let enabled = ctx.registry.names();
    content.available_tools.retain(|t| enabled.contains(t));

    let system_prompt = build_system_prompt(&ctx.spec.prompt);
    let user_message = build_user_message(&content);

    let invocation = ToolInvocation {
        folder_root: ctx.spec.path.clone(),
        dry_run: ctx.spec.dry_run,
        suppressor: ctx.suppressor.clone(),
    };

    let driver = AgentDriver::new(ctx.model.clone(), ctx.max_tool_calls);
    let outcome = driver
        .run(
            caps.id,
            &system_prompt,
            &user_message,
            &ctx.registry,
            &content.available_tools,
            &invocation,
        )
        .await?;

    let tool_calls: Vec<serde_json::Value> = outcome
        .tool_results
        .iter()
        .map(|r| {
            json!({
                "tool": r.tool_name,
                "ok": r.result.ok,
                "payload": r.result.payload,
            })
        })
        .collect();

    Ok(json!({
        "model": caps.id,
        "steps": outcome.steps,
        "hitLimit": outcome.hit_limit,
        "finalText": outcome.final_text,
        "toolCalls": tool_calls,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{AssistantTurn, ChatMessage, LlmFunctionCall, LlmToolCall};
    use crate::state::read_history;
    use crate::tools::ToolDef;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        turns: Mutex<VecDeque<AssistantTurn>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tools: &[ToolDef],
        ) -> Result<AssistantTurn> {
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("gateway unreachable"))
        }
    }

    fn scripted(turns: Vec<AssistantTurn>) -> Arc<dyn ChatModel> {
        Arc::new(ScriptedModel {
            turns: Mutex::new(turns.into()),
        })
    }

    fn context(
        folder: &Path,
        state_home: &Path,
        model: Arc<dyn ChatModel>,
        dry_run: bool,
    ) -> JobContext {
        let state = StateManager::new(state_home.to_path_buf());
        let spec = FolderSpec {
            path: folder.to_path_buf(),
            prompt: "Rename files descriptively".into(),
            tools: crate::content::ALL_TOOLS.iter().map(|s| s.to_string()).collect(),
            ignore_globs: Vec::new(),
            debounce_ms: 100,
            poll_interval_ms: None,
            env: Default::default(),
            dry_run,
            state_dir: state.state_dir_for(folder),
            history_path: state.history_path(folder),
        };
        JobContext {
            spec: Arc::new(spec),
            model,
            model_pref: Some("openai/gpt-4o-mini".into()),
            max_tool_calls: 5,
            limits: ContentLimits::default(),
            extractors: ExtractorSet::with_available(),
            suppressor: Arc::new(SelfChangeSuppressor::new()),
            registry: Arc::new(ToolRegistry::with_defaults()),
            state,
        }
    }

    fn rename_turn(from: &str, to: &str) -> AssistantTurn {
        AssistantTurn {
            content: None,
            tool_calls: vec![LlmToolCall {
                id: "c1".into(),
                call_type: "function".into(),
                function: LlmFunctionCall {
                    name: "rename_file".into(),
                    arguments: json!({"from": from, "to": to}).to_string(),
                },
            }],
        }
    }

    fn final_turn(text: &str) -> AssistantTurn {
        AssistantTurn {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn successful_job_appends_one_success_record() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("a.txt"), "invoice from acme, january").unwrap();

        let model = scripted(vec![
            rename_turn("a.txt", "acme-invoice-january.txt"),
            final_turn("renamed"),
        ]);
        let ctx = context(folder.path(), home.path(), model, false);
        let history_path = ctx.spec.history_path.clone();

        process_file(ctx.clone(), folder.path().join("a.txt"))
            .await
            .unwrap();

        assert!(folder.path().join("acme-invoice-january.txt").exists());

        let records = read_history(&history_path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, "a.txt");
        let result = records[0].result.as_ref().unwrap();
        assert_eq!(result["steps"], 2);
        assert_eq!(result["toolCalls"][0]["tool"], "rename_file");
        assert_eq!(result["toolCalls"][0]["ok"], true);

        // The renamed path is suppressed for follow-up events.
        assert!(ctx
            .suppressor
            .is_ignored(&folder.path().join("acme-invoice-january.txt")));

        // Folder metadata marker was refreshed.
        let marker = ctx.spec.state_dir.join(crate::state::METADATA_FILE);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn provider_failure_appends_one_error_record() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("a.txt"), "x").unwrap();

        let ctx = context(folder.path(), home.path(), scripted(vec![]), false);
        let history_path = ctx.spec.history_path.clone();

        let err = process_file(ctx, folder.path().join("a.txt")).await;
        assert!(err.is_err());

        let records = read_history(&history_path);
        assert_eq!(records.len(), 1);
        assert!(records[0].result.is_none());
        let error = records[0].error.as_ref().unwrap();
        assert!(error.contains("gateway"));
    }

    #[tokio::test]
    async fn dry_run_job_leaves_the_file_name_unchanged() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("a.txt"), "x").unwrap();

        let model = scripted(vec![
            rename_turn("a.txt", "better-name.txt"),
            final_turn("done"),
        ]);
        let ctx = context(folder.path(), home.path(), model, true);
        let history_path = ctx.spec.history_path.clone();

        process_file(ctx, folder.path().join("a.txt")).await.unwrap();

        assert!(folder.path().join("a.txt").exists());
        assert!(!folder.path().join("better-name.txt").exists());

        let records = read_history(&history_path);
        let payload = &records[0].result.as_ref().unwrap()["toolCalls"][0]["payload"];
        assert_eq!(payload["skipped"], true);
        assert_eq!(payload["reason"], "dry_run");
    }

    #[tokio::test]
    async fn vanished_file_records_an_error() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();

        let ctx = context(folder.path(), home.path(), scripted(vec![]), false);
        let history_path = ctx.spec.history_path.clone();

        let result = process_file(ctx, folder.path().join("gone.txt")).await;
        assert!(result.is_err());

        let records = read_history(&history_path);
        assert_eq!(records.len(), 1);
        assert!(records[0].error.as_ref().unwrap().contains("disappeared"));
    }

    #[tokio::test]
    async fn directory_events_classify_as_folder() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(folder.path().join("incoming")).unwrap();
        std::fs::write(folder.path().join("incoming/x.txt"), "x").unwrap();

        let model = scripted(vec![final_turn("noted the folder")]);
        let ctx = context(folder.path(), home.path(), model, false);
        let history_path = ctx.spec.history_path.clone();

        process_file(ctx, folder.path().join("incoming")).await.unwrap();

        let records = read_history(&history_path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, "incoming");
        assert!(records[0].result.is_some());
    }
}
