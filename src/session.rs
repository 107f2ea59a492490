//! One-shot and interactive session drivers
//!
//! A session processes one user line at a time to completion: scan the
//! working directory, parse to an intent, route, build, preview, confirm,
//! execute. Errors in the interactive loop print and continue; only quit
//! or end-of-input leaves the loop.

use crate::command::builder;
use crate::command::executor::{self, ProcessRunner, RunOptions};
use crate::command::router;
use crate::core::config::AppConfig;
use crate::core::error::{ClipError, Result};
use crate::llm::context;
use crate::llm::LlmClient;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

/// Advisory requests-per-minute gate applied ahead of the model client.
/// Sliding window; exceeding the ceiling fails the turn without spending
/// a provider call.
pub struct RateGate {
    capacity: u32,
    window: VecDeque<Instant>,
}

impl RateGate {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            capacity: requests_per_minute.max(1),
            window: VecDeque::new(),
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> bool {
        while let Some(&front) = self.window.front() {
            if now.duration_since(front) >= Duration::from_secs(60) {
                self.window.pop_front();
            } else {
                break;
            }
        }
        if self.window.len() as u32 >= self.capacity {
            return false;
        }
        self.window.push_back(now);
        true
    }
}

/// Run one natural-language prompt through the full pipeline.
///
/// Returns the process-level exit code (0 success, nonzero failure or
/// declined).
pub async fn run_prompt(
    prompt: &str,
    config: &AppConfig,
    client: &LlmClient,
    runner: &dyn ProcessRunner,
    assume_yes: bool,
) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let context = context::scan(&cwd);

    let intent = client
        .parse(
            prompt,
            &context,
            Duration::from_secs(config.timeout_seconds),
        )
        .await?;

    let plan = router::route(&intent);
    let commands = builder::build(&plan, config, assume_yes)?;

    executor::preview(&commands);

    let confirmed = if config.dry_run || assume_yes {
        // Dry-run bypasses the question entirely; --yes pre-authorizes.
        true
    } else {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        executor::confirm_prompt(
            "Run these commands?",
            config.confirm_default,
            &mut stdin.lock(),
            &mut stdout,
        )?
    };

    executor::run(
        &commands,
        runner,
        &RunOptions {
            confirmed,
            dry_run: config.dry_run,
            stop_on_error: true,
        },
    )
}

/// Interactive read-eval loop on stdin. Pipeline errors print and the
/// loop continues; `quit`/`exit`/`q` or end-of-input terminate with exit 0.
pub async fn run_session(
    config: &AppConfig,
    client: &LlmClient,
    runner: &dyn ProcessRunner,
    assume_yes: bool,
) -> Result<i32> {
    let stdin = std::io::stdin();
    run_session_with_input(config, client, runner, assume_yes, &mut stdin.lock()).await
}

/// Session loop over an arbitrary line source.
pub async fn run_session_with_input(
    config: &AppConfig,
    client: &LlmClient,
    runner: &dyn ProcessRunner,
    assume_yes: bool,
    input: &mut dyn BufRead,
) -> Result<i32> {
    println!("Describe ffmpeg operations in natural language.");
    println!("Type 'exit', 'quit', or 'q' to leave.");
    println!();

    let mut rate_gate = RateGate::new(config.rate_limit_requests);

    loop {
        print!("clipforge> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        if !rate_gate.try_acquire() {
            eprintln!(
                "Error: rate limit of {} requests/minute reached, wait before retrying",
                config.rate_limit_requests
            );
            continue;
        }

        match run_prompt(line, config, client, runner, assume_yes).await {
            Ok(0) => println!(),
            Ok(code) => {
                println!("Command completed with exit code: {code}");
                println!();
            }
            Err(err @ (ClipError::Parse(_)
            | ClipError::Schema(_)
            | ClipError::Build(_)
            | ClipError::Exec(_))) => {
                eprintln!("Error: {err}");
                println!();
            }
            Err(other) => return Err(other),
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_gate_allows_up_to_capacity() {
        let mut gate = RateGate::new(3);
        let now = Instant::now();
        assert!(gate.try_acquire_at(now));
        assert!(gate.try_acquire_at(now));
        assert!(gate.try_acquire_at(now));
        assert!(!gate.try_acquire_at(now));
    }

    #[test]
    fn test_rate_gate_window_slides() {
        let mut gate = RateGate::new(1);
        let start = Instant::now();
        assert!(gate.try_acquire_at(start));
        assert!(!gate.try_acquire_at(start + Duration::from_secs(30)));
        assert!(gate.try_acquire_at(start + Duration::from_secs(61)));
    }

    #[test]
    fn test_rate_gate_minimum_capacity() {
        let mut gate = RateGate::new(0);
        assert!(gate.try_acquire());
    }
}
