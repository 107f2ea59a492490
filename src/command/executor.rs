//! Execution gate - preview, confirm, dry-run, run
//!
//! State order is fixed: Built -> Previewed -> (Confirmed | Declined |
//! DryRun) -> Executed -> Reported. The preview always renders every
//! argument vector verbatim before any confirmation is requested, and
//! vectors run strictly in builder order. Actual process launching goes
//! through the [`ProcessRunner`] trait so tests never fork anything.

use crate::command::builder::ArgumentVector;
use crate::core::error::{ClipError, Result};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

/// Captured output is truncated to this many bytes per stream.
const OUTPUT_CAP: usize = 8 * 1024;

/// Exit code reserved for a declined confirmation.
pub const EXIT_DECLINED: i32 = 1;

/// Result of running one argument vector.
#[derive(Debug)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Executes one argument vector. Implementations must not interpret the
/// tokens through a shell.
pub trait ProcessRunner {
    fn run(&self, argv: &[String]) -> Result<ExecOutcome>;
}

/// Runs vectors as real child processes with captured output.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<ExecOutcome> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ClipError::Exec("empty argument vector".into()))?;

        let started = Instant::now();
        let output = std::process::Command::new(program)
            .args(args)
            .output()
            .map_err(|e| ClipError::Exec(format!("failed to launch {program}: {e}")))?;

        Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_output(&output.stdout),
            stderr: truncate_output(&output.stderr),
            elapsed: started.elapsed(),
        })
    }
}

/// Cap a captured stream at `OUTPUT_CAP` bytes, backing the cut up to the
/// nearest char boundary so the result is always valid UTF-8.
fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= OUTPUT_CAP {
        return text.into_owned();
    }
    let mut end = OUTPUT_CAP;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}

/// Render every vector verbatim. No truncation: security-relevant flags
/// must be visible before anyone confirms.
pub fn preview(commands: &[ArgumentVector]) {
    println!("Planned commands ({}):", commands.len());
    for (index, argv) in commands.iter().enumerate() {
        println!("  {}. {}", index + 1, argv.join(" "));
    }
}

/// Ask a yes/no question on the given input/output streams. An empty
/// answer takes the configurable default; EOF declines.
pub fn confirm_prompt(
    question: &str,
    default_yes: bool,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<bool> {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    write!(output, "{question} {hint} ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(match line.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    })
}

/// Knobs for one gate pass.
pub struct RunOptions {
    /// Outcome of the confirmation step (or pre-authorization).
    pub confirmed: bool,
    /// Preview only; nothing is executed and the exit code is 0.
    pub dry_run: bool,
    /// Stop at the first nonzero exit instead of running the remainder.
    pub stop_on_error: bool,
}

/// Execute the vectors sequentially and aggregate into one process-level
/// exit code: 0 when everything succeeded, otherwise the first failure's
/// code. Dry-run short-circuits regardless of confirmation.
pub fn run(
    commands: &[ArgumentVector],
    runner: &dyn ProcessRunner,
    options: &RunOptions,
) -> Result<i32> {
    if options.dry_run {
        tracing::info!(commands = commands.len(), "dry run, nothing executed");
        println!("Dry run: {} command(s) previewed, none executed.", commands.len());
        return Ok(0);
    }
    if !options.confirmed {
        println!("Declined, nothing executed.");
        return Ok(EXIT_DECLINED);
    }

    let mut first_failure = 0;
    for (index, argv) in commands.iter().enumerate() {
        let outcome = runner.run(argv)?;
        tracing::info!(
            command = index + 1,
            exit_code = outcome.exit_code,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "command finished"
        );
        if outcome.exit_code != 0 {
            let stderr = outcome.stderr.trim();
            if !stderr.is_empty() {
                eprintln!("{stderr}");
            }
            if first_failure == 0 {
                first_failure = outcome.exit_code;
            }
            if options.stop_on_error {
                break;
            }
        }
    }
    Ok(first_failure)
}
