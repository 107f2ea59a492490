//! Clipforge entry point
//!
//! Thin CLI over the pipeline: parses flags, loads configuration, sets up
//! tracing and the async runtime, then hands off to the session driver.
//! Exit codes: 0 success, 1 runtime error, 2 usage error.

use clap::{Parser, Subcommand};
use clipforge::command::executor::SystemRunner;
use clipforge::core::config::{AppConfig, MAX_TIMEOUT_SECONDS, MIN_TIMEOUT_SECONDS};
use clipforge::core::error::{ClipError, Result};
use clipforge::llm::{LlmClient, OpenAiProvider};
use clipforge::session;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "clipforge", version, about = "AI-powered ffmpeg CLI")]
struct Cli {
    /// Natural language prompt; if provided, runs once and exits
    prompt: Option<String>,

    /// Skip confirmation and allow overwriting existing outputs
    #[arg(long)]
    yes: bool,

    /// LLM model override
    #[arg(long)]
    model: Option<String>,

    /// Preview commands without executing them
    #[arg(long)]
    dry_run: bool,

    /// LLM timeout in seconds (1-300)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Translate natural language to ffmpeg, preview, confirm, execute
    Nl {
        /// Natural language prompt; interactive session when omitted
        prompt: Option<String>,
    },
    /// Describe what an already-formed ffmpeg command does
    Explain {
        /// The ffmpeg command tokens
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    std::process::exit(run(cli));
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "clipforge=debug"
    } else {
        "clipforge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> i32 {
    // The diagnostic command needs no config, network, or ffmpeg.
    if let Some(Command::Explain { command }) = &cli.command {
        return explain(command);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    let prompt = match &cli.command {
        Some(Command::Nl { prompt }) => prompt.clone(),
        _ => cli.prompt.clone(),
    };

    match dispatch(prompt, &config, cli.yes) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load()?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    config.timeout_seconds = cli.timeout.clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS);
    config.ensure_ffmpeg()?;
    Ok(config)
}

fn dispatch(prompt: Option<String>, config: &AppConfig, assume_yes: bool) -> Result<i32> {
    let api_key = config.api_key()?.to_string();
    let client = LlmClient::new(Box::new(OpenAiProvider::new(api_key, config.model.clone())));
    let runner = SystemRunner;

    let rt = Runtime::new().map_err(ClipError::Io)?;
    match prompt {
        Some(prompt) => rt.block_on(session::run_prompt(
            &prompt, config, &client, &runner, assume_yes,
        )),
        None => rt.block_on(session::run_session(config, &client, &runner, assume_yes)),
    }
}

/// Pattern-match a formed ffmpeg command line and print a human summary.
/// Purely descriptive, no translation pipeline involved.
fn explain(tokens: &[String]) -> i32 {
    if tokens.is_empty() {
        eprintln!("Provide an ffmpeg command to explain.");
        eprintln!("Usage: clipforge explain ffmpeg -i input.mp4 -c:v libx264 output.mp4");
        return 2;
    }
    if tokens[0] != "ffmpeg" {
        eprintln!("Error: not an ffmpeg command. Commands should start with 'ffmpeg'.");
        return 1;
    }

    let joined = tokens.join(" ");
    println!("Analyzing ffmpeg command:");
    println!("  {joined}");
    println!();

    let mut notes = Vec::new();

    let inputs: Vec<&str> = tokens
        .windows(2)
        .filter(|w| w[0] == "-i")
        .map(|w| w[1].as_str())
        .collect();
    if !inputs.is_empty() {
        notes.push(format!("input files: {}", inputs.join(", ")));
    }
    if let Some(last) = tokens.last() {
        if !last.starts_with('-') && tokens.len() > 1 {
            notes.push(format!("output file: {last}"));
        }
    }

    let has = |flag: &str| tokens.iter().any(|t| t == flag);
    if has("-vf") || has("-filter:v") || has("-filter_complex") {
        notes.push("video filtering applied".into());
    }
    if has("-c:v") {
        notes.push("video codec specified".into());
    }
    if has("-c:a") {
        notes.push("audio codec specified".into());
    }
    if has("-ss") {
        notes.push("seeking to a specific time".into());
    }
    if has("-t") || has("-to") {
        notes.push("duration/time limit specified".into());
    }
    if joined.contains("scale=") {
        notes.push("video scaling/resizing".into());
    }
    if has("-crf") {
        notes.push("quality-based encoding (CRF)".into());
    }
    if has("-b:v") {
        notes.push("bitrate-based encoding".into());
    }

    if notes.is_empty() {
        println!("Basic ffmpeg command - converts/processes media files.");
    } else {
        println!("What this command does:");
        for note in notes {
            println!("  - {note}");
        }
    }
    0
}
