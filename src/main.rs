//! smartfolder: watch folders and run an agentic LLM workflow over new files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smartfolder::config::{ConfigFile, Settings};
use smartfolder::llm_client::GatewayClient;
use smartfolder::state::StateManager;
use smartfolder::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[clap(name = "smartfolder", version)]
#[clap(about = "Watch folders and let an LLM agent organize arriving files", long_about = None)]
struct Cli {
    /// Folder to watch inline (single-folder mode; requires --prompt)
    folder: Option<PathBuf>,

    /// Instructions for the inline folder
    #[clap(long)]
    prompt: Option<String>,

    /// Validate and log tool calls without touching the filesystem
    #[clap(long)]
    dry_run: bool,

    /// Start watchers, confirm readiness, and exit without processing
    #[clap(long)]
    run_once: bool,

    /// Debug-level logging
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the folders or roots declared in a config file
    Run {
        #[clap(long, value_name = "FILE")]
        config: PathBuf,
        #[clap(long)]
        dry_run: bool,
        #[clap(long)]
        run_once: bool,
        #[clap(short, long)]
        verbose: bool,
    },
    /// Parse and validate a config file, then exit
    Validate {
        #[clap(long, value_name = "FILE")]
        config: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = std::env::var("SMARTFOLDER_LOG_LEVEL")
        .ok()
        .map(|l| match l.to_ascii_lowercase().as_str() {
            // `fatal` is accepted for compatibility and maps to error.
            "fatal" => "error".to_string(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "info".to_string());
    let level = if verbose { "debug".to_string() } else { level };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},smartfolder={}", level, level)));

    let force_json = std::env::var("SMARTFOLDER_LOG_JSON")
        .map(|v| !v.trim().is_empty() && v != "0")
        .unwrap_or(false);

    if force_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit = match cli.command {
        Some(Command::Validate { config }) => validate(&config),
        Some(Command::Run {
            config,
            dry_run,
            run_once,
            verbose,
        }) => {
            init_logging(verbose);
            run_config(&config, dry_run, run_once).await
        }
        None => {
            init_logging(cli.verbose);
            run_inline(cli.folder, cli.prompt, cli.dry_run, cli.run_once).await
        }
    };

    std::process::exit(exit);
}

fn validate(config_path: &PathBuf) -> i32 {
    // Validation output goes to stderr directly; logging is not set up in
    // this mode so the output stays machine-friendly.
    let config = match ConfigFile::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return 1;
        }
    };

    let state = StateManager::from_env();
    match Settings::from_config(config, false, &state) {
        Ok(_) => {
            println!("config ok: {}", config_path.display());
            0
        }
        Err(errors) => {
            for error in &errors {
                eprintln!("config error: {}", error);
            }
            1
        }
    }
}

async fn run_config(config_path: &PathBuf, dry_run: bool, run_once: bool) -> i32 {
    let config = match ConfigFile::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {:#}", e);
            return 1;
        }
    };

    let state = StateManager::from_env();
    let settings = match Settings::from_config(config, dry_run, &state) {
        Ok(s) => s,
        Err(errors) => {
            for error in &errors {
                tracing::error!("config error: {}", error);
            }
            return 1;
        }
    };

    serve(settings, state, run_once).await
}

async fn run_inline(
    folder: Option<PathBuf>,
    prompt: Option<String>,
    dry_run: bool,
    run_once: bool,
) -> i32 {
    let (folder, prompt) = match (folder, prompt) {
        (Some(folder), Some(prompt)) => (folder, prompt),
        (Some(_), None) => {
            tracing::error!("inline mode needs --prompt \"...\"");
            return 1;
        }
        _ => {
            tracing::error!("nothing to do: pass a folder with --prompt, or use 'run --config'");
            return 1;
        }
    };

    let state = StateManager::from_env();
    let settings = match Settings::single_folder(&folder, &prompt, dry_run, &state) {
        Ok(s) => s,
        Err(errors) => {
            for error in &errors {
                tracing::error!("config error: {}", error);
            }
            return 1;
        }
    };

    serve(settings, state, run_once).await
}

async fn serve(settings: Settings, state: StateManager, run_once: bool) -> i32 {
    let api_key = settings
        .api_key
        .clone()
        .or_else(|| GatewayClient::resolve_api_key(&state));
    if api_key.is_none() {
        tracing::warn!(
            "no API key found (AI_GATEWAY_API_KEY or {}); model calls will fail",
            state.token_path().display()
        );
    }

    let model = Arc::new(GatewayClient::new(
        settings.api_url.clone(),
        api_key,
        settings.temperature,
        4096,
    ));

    tracing::info!(
        model = settings.model_pref.as_deref().unwrap_or("(auto)"),
        "smartfolder starting"
    );

    match Supervisor::new(settings, state, model).run(run_once).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("fatal: {:#}", e);
            1
        }
    }
}
