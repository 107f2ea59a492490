//! Runtime configuration loaded from the environment
//!
//! Loaded once at process start and treated as read-only afterwards.
//! Every component that needs configuration receives it explicitly, which
//! keeps the router and builder pure functions of their inputs.

use crate::core::error::{ClipError, Result};
use crate::core::secrets::{looks_like_api_key, mask_api_key};
use std::path::{Path, PathBuf};

/// Default ceiling on total input size: 500 MB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// LLM request timeout bounds, in seconds.
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Application configuration.
///
/// * `api_key` - credential for the LLM provider; never logged.
/// * `model` - model name used for intent parsing.
/// * `dry_run` - preview commands without executing them.
/// * `confirm_default` - default answer for the yes/no confirmation prompt.
/// * `timeout_seconds` - LLM request timeout (clamped to 1..=300).
/// * `max_file_size` - maximum total input size in bytes.
/// * `allowed_directories` - sandbox: every input/output path must resolve
///   under one of these.
/// * `rate_limit_requests` - advisory LLM requests-per-minute ceiling.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub dry_run: bool,
    pub confirm_default: bool,
    pub timeout_seconds: u64,
    pub max_file_size: u64,
    pub allowed_directories: Vec<PathBuf>,
    pub rate_limit_requests: u32,
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment.
    ///
    /// Env vars: `OPENAI_API_KEY`, `CLIPFORGE_MODEL`, `CLIPFORGE_DRY_RUN`,
    /// `CLIPFORGE_TIMEOUT`, `CLIPFORGE_MAX_FILE_SIZE`,
    /// `CLIPFORGE_ALLOWED_DIRS` (comma-separated), `CLIPFORGE_RATE_LIMIT`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("OPENAI_API_KEY").ok();
        let model = std::env::var("CLIPFORGE_MODEL").unwrap_or_else(|_| "gpt-4o".into());
        let dry_run = std::env::var("CLIPFORGE_DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let timeout_seconds = parse_env_number("CLIPFORGE_TIMEOUT", 60)?
            .clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS);
        let max_file_size = parse_env_number("CLIPFORGE_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let rate_limit_requests =
            parse_env_number("CLIPFORGE_RATE_LIMIT", 60)?.clamp(1, 1000) as u32;

        let allowed_directories = match std::env::var("CLIPFORGE_ALLOWED_DIRS") {
            Ok(raw) if !raw.trim().is_empty() => resolve_allowed_dirs(&raw)?,
            _ => vec![std::env::current_dir()?],
        };

        let config = Self {
            api_key,
            model,
            dry_run,
            confirm_default: true,
            timeout_seconds,
            max_file_size,
            allowed_directories,
            rate_limit_requests,
        };

        tracing::debug!(
            model = %config.model,
            dry_run = config.dry_run,
            timeout = config.timeout_seconds,
            allowed_dirs = config.allowed_directories.len(),
            api_key = %mask_api_key(config.api_key.as_deref().unwrap_or("")),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Return the API key for client use, validating presence and format.
    pub fn api_key(&self) -> Result<&str> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            ClipError::Config(
                "OPENAI_API_KEY is required for LLM parsing. Set it in your environment \
                 or in a .env file: OPENAI_API_KEY=sk-your-key-here"
                    .into(),
            )
        })?;
        if !looks_like_api_key(key) {
            return Err(ClipError::Config(format!(
                "invalid API key format: {}. OpenAI keys start with 'sk-' followed by \
                 alphanumeric characters",
                mask_api_key(key)
            )));
        }
        Ok(key)
    }

    /// Fail at startup when ffmpeg is not on PATH.
    pub fn ensure_ffmpeg(&self) -> Result<()> {
        if find_in_path("ffmpeg").is_none() {
            return Err(ClipError::Config(
                "ffmpeg not found in PATH. Install ffmpeg (e.g. apt install ffmpeg) and retry"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn parse_env_number(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
            ClipError::Config(format!("{name} must be a non-negative integer, got {raw:?}"))
        }),
        Err(_) => Ok(default),
    }
}

fn resolve_allowed_dirs(raw: &str) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let path = PathBuf::from(part);
        if path.is_dir() {
            dirs.push(path.canonicalize()?);
        } else {
            tracing::warn!(dir = %part, "allowed directory does not exist, skipping");
        }
    }
    if dirs.is_empty() {
        dirs.push(std::env::current_dir()?);
    }
    Ok(dirs)
}

/// Minimal `which`: scan PATH entries for an executable file.
fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
