//! Configuration: JSON config file, normalization, and validation.
//!
//! The config file carries an `ai` section plus exactly one of `folders`
//! (explicit folder list) or `rootDirectories` (discovery mode). `$NAME`
//! tokens in string values resolve against a closed env-var whitelist;
//! anything else fails validation. Validation collects every error rather
//! than stopping at the first, so `validate --config` can report them all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::content::ContentLimits;
use crate::error::SmartfolderError;
use crate::models;
use crate::state::StateManager;

/// Env vars that `$NAME` tokens in config values may reference.
pub const ALLOWED_ENV_VARS: &[&str] = &["AI_GATEWAY_API_KEY", "SMARTFOLDER_HOME", "HOME", "USER"];

pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 5000;
pub const PROMPT_MAX_CHARS: usize = 50_000;
pub const CONFIG_FILE_MAX_BYTES: u64 = 1024 * 1024;

pub const DEFAULT_IGNORE_GLOBS: &[&str] =
    &["**/node_modules/**", "**/.git/**", "**/.smartfolder/**"];

fn default_provider() -> String {
    "openai".to_string()
}

fn default_api_url() -> String {
    "https://ai-gateway.vercel.sh/v1".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tool_calls() -> u32 {
    10
}

/// The `ai` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Explicit model preference. When absent, the capability selector
    /// scores the registry per file instead.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    #[serde(default)]
    pub default_tools: Option<Vec<String>>,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            api_url: default_api_url(),
            temperature: default_temperature(),
            max_tool_calls: default_max_tool_calls(),
            default_tools: None,
        }
    }
}

impl AiSection {
    /// Registry key: `provider/model`, unless the model already carries a
    /// provider prefix. `None` means no preference.
    pub fn model_id(&self) -> Option<String> {
        self.model.as_ref().map(|model| {
            if model.contains('/') {
                model.clone()
            } else {
                format!("{}/{}", self.provider, model)
            }
        })
    }
}

/// One entry of the `folders` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    pub path: String,
    pub prompt: String,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// Root-level knobs that seed every folder unless overridden per entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDefaults {
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// The raw config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub folders: Option<Vec<FolderEntry>>,
    #[serde(default)]
    pub root_directories: Option<Vec<String>>,
    #[serde(default)]
    pub global_defaults: Option<GlobalDefaults>,
    // The same knobs are also accepted at the top level; `globalDefaults`
    // wins where both are set.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub discovery_interval_ms: Option<u64>,
    #[serde(default)]
    pub content_limits: Option<ContentLimits>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// What every watched directory runs with.
#[derive(Debug, Clone)]
pub struct FolderSpec {
    pub path: PathBuf,
    pub prompt: String,
    pub tools: Vec<String>,
    pub ignore_globs: Vec<String>,
    pub debounce_ms: u64,
    pub poll_interval_ms: Option<u64>,
    pub env: HashMap<String, String>,
    pub dry_run: bool,
    pub state_dir: PathBuf,
    pub history_path: PathBuf,
}

/// Folder-shaping defaults carried into discovery mode, where folder specs
/// are minted at runtime.
#[derive(Debug, Clone)]
pub struct FolderDefaults {
    pub tools: Vec<String>,
    pub ignore_globs: Vec<String>,
    pub debounce_ms: u64,
    pub poll_interval_ms: Option<u64>,
    pub env: HashMap<String, String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub enum WatchMode {
    Folders(Vec<FolderSpec>),
    Roots(Vec<PathBuf>),
}

/// Fully normalized configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Explicit model preference, if the config names one.
    pub model_pref: Option<String>,
    pub api_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tool_calls: u32,
    pub mode: WatchMode,
    pub defaults: FolderDefaults,
    pub discovery_interval_ms: u64,
    pub limits: ContentLimits,
}

impl Settings {
    /// Normalize and validate a parsed config file. All validation errors
    /// are collected and returned together.
    pub fn from_config(
        config: ConfigFile,
        cli_dry_run: bool,
        state: &StateManager,
    ) -> Result<Self, Vec<SmartfolderError>> {
        let mut errors = Vec::new();

        let api_key = match config.ai.api_key.as_deref().map(resolve_env_tokens) {
            Some(Ok(resolved)) if !resolved.is_empty() => Some(resolved),
            Some(Ok(_)) | None => None,
            Some(Err(e)) => {
                errors.push(e);
                None
            }
        };

        let model_pref = config.ai.model_id();
        if let Some(ref id) = model_pref {
            if models::lookup(id).is_none() {
                tracing::warn!(
                    "model '{}' is not in the capability registry; selection will fall back",
                    id
                );
            }
        }

        let globals = config.global_defaults.unwrap_or_default();
        let mut default_env = HashMap::new();
        if let Some(env) = globals.env.as_ref().or(config.env.as_ref()) {
            match resolve_env_map(env) {
                Ok(resolved) => default_env = resolved,
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        let defaults = FolderDefaults {
            tools: globals
                .tools
                .or(config.tools)
                .or_else(|| config.ai.default_tools.clone())
                .unwrap_or_else(|| {
                    crate::content::ALL_TOOLS.iter().map(|s| s.to_string()).collect()
                }),
            ignore_globs: globals
                .ignore
                .or(config.ignore)
                .unwrap_or_else(|| DEFAULT_IGNORE_GLOBS.iter().map(|s| s.to_string()).collect()),
            debounce_ms: globals
                .debounce_ms
                .or(config.debounce_ms)
                .unwrap_or(DEFAULT_DEBOUNCE_MS),
            poll_interval_ms: globals.poll_interval_ms.or(config.poll_interval_ms),
            env: default_env,
            dry_run: cli_dry_run || globals.dry_run.or(config.dry_run).unwrap_or(false),
        };

        let mode = match (config.folders, config.root_directories) {
            (Some(_), Some(_)) => {
                errors.push(SmartfolderError::ConfigInvalid(
                    "config sets both 'folders' and 'rootDirectories'; exactly one is allowed"
                        .to_string(),
                ));
                None
            }
            (None, None) => {
                errors.push(SmartfolderError::ConfigInvalid(
                    "config sets neither 'folders' nor 'rootDirectories'".to_string(),
                ));
                None
            }
            (Some(folders), None) => {
                let mut specs = Vec::new();
                for entry in folders {
                    match folder_spec_from_entry(entry, &defaults, state) {
                        Ok(spec) => specs.push(spec),
                        Err(mut errs) => errors.append(&mut errs),
                    }
                }
                Some(WatchMode::Folders(specs))
            }
            (None, Some(roots)) => Some(WatchMode::Roots(
                roots.into_iter().map(PathBuf::from).collect(),
            )),
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            model_pref,
            api_url: config.ai.api_url,
            api_key,
            temperature: config.ai.temperature,
            max_tool_calls: config.ai.max_tool_calls,
            mode: mode.expect("mode resolved when no errors were collected"),
            defaults,
            discovery_interval_ms: config
                .discovery_interval_ms
                .unwrap_or(DEFAULT_DISCOVERY_INTERVAL_MS),
            limits: config.content_limits.unwrap_or_default(),
        })
    }

    /// Inline single-folder mode: `<folder> --prompt "..."`.
    pub fn single_folder(
        folder: &Path,
        prompt: &str,
        dry_run: bool,
        state: &StateManager,
    ) -> Result<Self, Vec<SmartfolderError>> {
        let config = ConfigFile {
            ai: AiSection::default(),
            folders: Some(vec![FolderEntry {
                path: folder.to_string_lossy().to_string(),
                prompt: prompt.to_string(),
                tools: None,
                ignore: None,
                debounce_ms: None,
                poll_interval_ms: None,
                env: None,
                dry_run: None,
            }]),
            root_directories: None,
            global_defaults: None,
            tools: None,
            ignore: None,
            debounce_ms: None,
            poll_interval_ms: None,
            env: None,
            dry_run: None,
            discovery_interval_ms: None,
            content_limits: None,
        };
        Self::from_config(config, dry_run, state)
    }

    /// Mint a spec for a folder discovered at runtime.
    pub fn spec_for_discovered(
        &self,
        folder: &Path,
        prompt: String,
        state: &StateManager,
    ) -> FolderSpec {
        FolderSpec {
            path: folder.to_path_buf(),
            prompt,
            tools: self.defaults.tools.clone(),
            ignore_globs: self.defaults.ignore_globs.clone(),
            debounce_ms: self.defaults.debounce_ms,
            poll_interval_ms: self.defaults.poll_interval_ms,
            env: self.defaults.env.clone(),
            dry_run: self.defaults.dry_run,
            state_dir: state.state_dir_for(folder),
            history_path: state.history_path(folder),
        }
    }
}

fn folder_spec_from_entry(
    entry: FolderEntry,
    defaults: &FolderDefaults,
    state: &StateManager,
) -> Result<FolderSpec, Vec<SmartfolderError>> {
    let mut errors = Vec::new();

    let prompt = match resolve_env_tokens(&entry.prompt) {
        Ok(p) => p,
        Err(e) => {
            errors.push(e);
            String::new()
        }
    };
    if errors.is_empty() {
        if let Err(e) = validate_prompt(&prompt) {
            errors.push(e);
        }
    }

    let mut env = defaults.env.clone();
    if let Some(extra) = &entry.env {
        match resolve_env_map(extra) {
            Ok(resolved) => env.extend(resolved),
            Err(mut errs) => errors.append(&mut errs),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let path = absolutize(Path::new(&entry.path));
    Ok(FolderSpec {
        state_dir: state.state_dir_for(&path),
        history_path: state.history_path(&path),
        prompt,
        tools: entry.tools.unwrap_or_else(|| defaults.tools.clone()),
        ignore_globs: entry.ignore.unwrap_or_else(|| defaults.ignore_globs.clone()),
        debounce_ms: entry.debounce_ms.unwrap_or(defaults.debounce_ms),
        poll_interval_ms: entry.poll_interval_ms.or(defaults.poll_interval_ms),
        env,
        dry_run: entry.dry_run.unwrap_or(defaults.dry_run),
        path,
    })
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        crate::sandbox::normalize(path)
    } else {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        crate::sandbox::normalize(&base.join(path))
    }
}

/// Substitute `$NAME` tokens against the whitelist. Unknown names fail with
/// `EnvVarNotAllowed`; allowed-but-unset vars substitute the empty string.
pub fn resolve_env_tokens(value: &str) -> Result<String, SmartfolderError> {
    let pattern = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern compiles");

    let mut out = String::new();
    let mut last = 0usize;
    for captures in pattern.captures_iter(value) {
        let whole = captures.get(0).expect("match 0 always present");
        let name = captures.get(1).expect("group 1 always present").as_str();
        if !ALLOWED_ENV_VARS.contains(&name) {
            return Err(SmartfolderError::EnvVarNotAllowed(name.to_string()));
        }
        out.push_str(&value[last..whole.start()]);
        out.push_str(&std::env::var(name).unwrap_or_default());
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

fn resolve_env_map(
    map: &HashMap<String, String>,
) -> Result<HashMap<String, String>, Vec<SmartfolderError>> {
    let mut out = HashMap::new();
    let mut errors = Vec::new();
    for (key, value) in map {
        match resolve_env_tokens(value) {
            Ok(resolved) => {
                out.insert(key.clone(), resolved);
            }
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

/// The hard prompt rules shared by inline config and `smartfolder.md`.
pub fn validate_prompt(prompt: &str) -> Result<(), SmartfolderError> {
    if prompt.trim().is_empty() {
        return Err(SmartfolderError::PromptEmpty);
    }
    if prompt.contains('\0') {
        return Err(SmartfolderError::PromptContainsNul);
    }
    let len = prompt.chars().count();
    if len > PROMPT_MAX_CHARS {
        return Err(SmartfolderError::PromptTooLong {
            len,
            limit: PROMPT_MAX_CHARS,
        });
    }
    warn_prompt_quirks(prompt);
    Ok(())
}

/// Suspicious-but-legal prompt shapes warrant a warning, never a failure.
fn warn_prompt_quirks(prompt: &str) {
    let mut run_char = '\0';
    let mut run_len = 0usize;
    for c in prompt.chars() {
        if c == run_char {
            run_len += 1;
            if run_len == 1_001 {
                tracing::warn!(
                    "prompt contains a run of more than 1000 identical characters ('{}')",
                    run_char.escape_default()
                );
            }
        } else {
            run_char = c;
            run_len = 1;
        }
    }

    if prompt
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        tracing::warn!("prompt contains unusual control characters");
    }
}
