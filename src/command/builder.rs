//! Command builder - compiles plan steps into ffmpeg argument vectors
//!
//! This is the security boundary between model-derived data and the
//! process executor. Everything here is deny-by-default: paths must
//! resolve inside an allowed directory, passthrough tokens must match a
//! conservative character allow-list, and an existing output is never
//! silently overwritten. Vectors are built in a fixed field order so that
//! identical plans produce byte-identical argv arrays.

use crate::command::router::{CommandPlan, Operation, PlanStep};
use crate::core::config::AppConfig;
use crate::core::error::{ClipError, Result};
use globset::Glob;
use std::path::{Component, Path, PathBuf};

/// One external-process invocation: discrete tokens, executable first.
/// Never joined into a shell string.
pub type ArgumentVector = Vec<String>;

pub const FFMPEG: &str = "ffmpeg";

/// Characters allowed in `extra_flags` tokens. Everything else, shell
/// metacharacters included, is rejected outright.
const SAFE_TOKEN_CHARS: &str = "-_.:/";

/// Compile a command plan into argument vectors.
///
/// `assume_overwrite` reflects explicit pre-authorization (`--yes`): it
/// adds ffmpeg `-y` and skips collision suffixing. Without it an existing
/// output gets a deterministic `_1`, `_2`, ... suffix before the extension.
pub fn build(
    plan: &CommandPlan,
    config: &AppConfig,
    assume_overwrite: bool,
) -> Result<Vec<ArgumentVector>> {
    let mut vectors = Vec::new();
    for step in &plan.steps {
        vectors.extend(build_step(step, config, assume_overwrite)?);
    }
    Ok(vectors)
}

fn build_step(
    step: &PlanStep,
    config: &AppConfig,
    assume_overwrite: bool,
) -> Result<Vec<ArgumentVector>> {
    for token in &step.extra_flags {
        check_safe_token(token)?;
    }

    if let Operation::BatchTranscode {
        pattern,
        video_codec,
        audio_codec,
        crf,
        bitrate,
        scale,
        fps,
        filters,
    } = &step.operation
    {
        let per_file_op = Operation::Transcode {
            video_codec: video_codec.clone(),
            audio_codec: audio_codec.clone(),
            crf: *crf,
            bitrate: bitrate.clone(),
            scale: scale.clone(),
            fps: *fps,
            filters: filters.clone(),
        };
        return build_batch(step, pattern, per_file_op, config, assume_overwrite);
    }

    for input in &step.inputs {
        ensure_sandboxed(input, config)?;
    }
    if let Operation::OverlayImage { overlay_path, .. } = &step.operation {
        ensure_sandboxed(overlay_path, config)?;
    }
    check_total_input_size(&step.inputs, config)?;

    let first_input = step
        .inputs
        .first()
        .ok_or_else(|| ClipError::Build("plan step has no inputs".into()))?;
    let output = match &step.output {
        Some(path) => path.clone(),
        None => derive_output(first_input, &step.operation),
    };
    let output = resolve_collision(&output, &step.inputs, config, assume_overwrite)?;

    Ok(vec![assemble(step, &step.inputs, &output, assume_overwrite)])
}

/// Expand a glob into one vector per matched file, in the order the
/// filesystem enumeration returns them. Order is preserved, not re-sorted.
fn build_batch(
    step: &PlanStep,
    pattern: &str,
    per_file_op: Operation,
    config: &AppConfig,
    assume_overwrite: bool,
) -> Result<Vec<ArgumentVector>> {
    let matches = expand_glob(pattern)?;
    if matches.is_empty() {
        return Err(ClipError::Build(format!(
            "pattern {pattern:?} matched no files"
        )));
    }

    for path in &matches {
        ensure_sandboxed(path, config)?;
    }
    check_total_input_size(&matches, config)?;

    let mut vectors = Vec::new();
    for input in &matches {
        let inputs = std::slice::from_ref(input);
        let output = derive_output(input, &per_file_op);
        let output = resolve_collision(&output, inputs, config, assume_overwrite)?;
        let per_file = PlanStep {
            operation: per_file_op.clone(),
            inputs: vec![input.clone()],
            output: Some(output.clone()),
            extra_flags: step.extra_flags.clone(),
        };
        vectors.push(assemble(
            &per_file,
            &per_file.inputs,
            &output,
            assume_overwrite,
        ));
    }
    Ok(vectors)
}

/// Fixed field order: executable, global flags, inputs, filter flags,
/// codec/quality flags, trimming flags, extra flags, output.
fn assemble(
    step: &PlanStep,
    inputs: &[String],
    output: &str,
    assume_overwrite: bool,
) -> ArgumentVector {
    let mut argv: Vec<String> = vec![FFMPEG.into()];

    if assume_overwrite {
        argv.push("-y".into());
    }

    for input in inputs {
        argv.push("-i".into());
        argv.push(input.clone());
    }
    if let Operation::OverlayImage { overlay_path, .. } = &step.operation {
        argv.push("-i".into());
        argv.push(overlay_path.clone());
    }

    match &step.operation {
        Operation::Transcode {
            video_codec,
            audio_codec,
            crf,
            bitrate,
            scale,
            fps,
            filters,
        } => {
            let mut chain = filters.clone();
            if let Some(scale) = scale {
                // Canonical WxH becomes a literal scale filter.
                chain.push(format!("scale={}", scale.replace('x', ":")));
            }
            if !chain.is_empty() {
                argv.push("-vf".into());
                argv.push(chain.join(","));
            }
            argv.push("-c:v".into());
            argv.push(video_codec.clone());
            argv.push("-c:a".into());
            argv.push(audio_codec.clone());
            if let Some(crf) = crf {
                argv.push("-crf".into());
                argv.push(crf.to_string());
            }
            if let Some(bitrate) = bitrate {
                argv.push("-b:v".into());
                argv.push(bitrate.clone());
            }
            if let Some(fps) = fps {
                argv.push("-r".into());
                argv.push(format_fps(*fps));
            }
        }
        Operation::ExtractSegment {
            start,
            end,
            duration,
        } => {
            argv.push("-c".into());
            argv.push("copy".into());
            if let Some(start) = start {
                argv.push("-ss".into());
                argv.push(start.clone());
            }
            if let Some(end) = end {
                argv.push("-to".into());
                argv.push(end.clone());
            }
            if let Some(duration) = duration {
                argv.push("-t".into());
                argv.push(duration.clone());
            }
        }
        Operation::ExtractAudio { audio_codec } => {
            argv.push("-vn".into());
            argv.push("-c:a".into());
            argv.push(audio_codec.clone());
        }
        Operation::OverlayImage { x, y, .. } => {
            argv.push("-filter_complex".into());
            argv.push(format!("overlay={x}:{y}"));
        }
        Operation::Thumbnail { at } => {
            argv.push("-frames:v".into());
            argv.push("1".into());
            argv.push("-ss".into());
            argv.push(at.clone());
        }
        Operation::BatchTranscode { .. } => unreachable!("batch expanded before assembly"),
    }

    argv.extend(step.extra_flags.iter().cloned());
    argv.push(output.into());
    argv
}

/// Integral rates render without a fractional part so vectors stay
/// byte-for-byte reproducible.
fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{fps}")
    }
}

fn check_safe_token(token: &str) -> Result<()> {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SAFE_TOKEN_CHARS.contains(c));
    if !safe {
        return Err(ClipError::Build(format!(
            "unsafe extra flag token {token:?}: only alphanumerics and {SAFE_TOKEN_CHARS:?} are allowed"
        )));
    }
    Ok(())
}

/// Lexically resolve a path (relative paths against the current directory,
/// `.` and `..` components folded away) without touching the filesystem.
fn normalize(path: &str) -> Result<PathBuf> {
    let raw = Path::new(path);
    let absolute = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        std::env::current_dir()?.join(raw)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

/// Resolve a path for sandbox comparison: the lexical fold first, then
/// symlink resolution through the filesystem. A path that does not exist
/// yet is canonicalized through its parent with the file name re-appended,
/// so an output is checked against the directory it will actually land in.
fn resolve(path: &str) -> Result<PathBuf> {
    let folded = normalize(path)?;
    if let Ok(real) = std::fs::canonicalize(&folded) {
        return Ok(real);
    }
    if let (Some(parent), Some(name)) = (folded.parent(), folded.file_name()) {
        if let Ok(real_parent) = std::fs::canonicalize(parent) {
            return Ok(real_parent.join(name));
        }
    }
    Ok(folded)
}

/// Reject any path that does not resolve under an allowed directory.
/// Both sides of the comparison are canonicalized: a symlink inside the
/// sandbox pointing out is rejected, and an allow-list entry that is
/// itself reached through a symlink still matches the real paths under it.
fn ensure_sandboxed(path: &str, config: &AppConfig) -> Result<PathBuf> {
    let resolved = resolve(path)?;
    let inside = config.allowed_directories.iter().any(|dir| {
        let dir = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
        resolved.starts_with(&dir)
    });
    if !inside {
        return Err(ClipError::Build(format!(
            "path {path:?} resolves outside the allowed directories"
        )));
    }
    Ok(resolved)
}

fn check_total_input_size(inputs: &[String], config: &AppConfig) -> Result<()> {
    let mut total: u64 = 0;
    for input in inputs {
        if let Ok(meta) = std::fs::metadata(normalize(input)?) {
            total = total.saturating_add(meta.len());
        }
    }
    if total > config.max_file_size {
        return Err(ClipError::Build(format!(
            "total input size {total} bytes exceeds the configured maximum of {} bytes",
            config.max_file_size
        )));
    }
    Ok(())
}

/// Derive an output path from the input stem and the operation.
fn derive_output(input: &str, operation: &Operation) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".into());
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());

    let name = match operation {
        Operation::Transcode { .. } => format!("{stem}.mp4"),
        Operation::ExtractSegment { .. } => format!("{stem}_trimmed.{extension}"),
        Operation::ExtractAudio { .. } => format!("{stem}.m4a"),
        Operation::OverlayImage { .. } => format!("{stem}_overlay.{extension}"),
        Operation::Thumbnail { .. } => format!("{stem}_thumb.png"),
        Operation::BatchTranscode { .. } => format!("{stem}.mp4"),
    };

    match parent {
        Some(parent) => parent.join(name).to_string_lossy().into_owned(),
        None => name,
    }
}

/// Sandbox-check the output and, unless overwrite was pre-authorized,
/// step the file name with `_1`, `_2`, ... until it no longer collides.
/// An output resolving onto one of its own inputs always gets a suffix:
/// in-place clobbering is never allowed, pre-authorized or not.
fn resolve_collision(
    output: &str,
    inputs: &[String],
    config: &AppConfig,
    assume_overwrite: bool,
) -> Result<String> {
    let resolved = ensure_sandboxed(output, config)?;
    let mut taken = Vec::with_capacity(inputs.len());
    for input in inputs {
        taken.push(resolve(input)?);
    }

    let collides = |path: &PathBuf| taken.contains(path);
    if !collides(&resolved) && (assume_overwrite || !resolved.exists()) {
        return Ok(output.into());
    }

    for n in 1.. {
        let candidate = with_numeric_suffix(output, n);
        let candidate_resolved = resolve(&candidate)?;
        if !collides(&candidate_resolved) && !candidate_resolved.exists() {
            tracing::debug!(from = %output, to = %candidate, "output collides, suffixing");
            return Ok(candidate);
        }
    }
    unreachable!("suffix search terminates at the first free index")
}

/// `clip.mp4` + 2 -> `clip_2.mp4`; extension-less names get a bare suffix.
fn with_numeric_suffix(path: &str, n: u32) -> String {
    let p = Path::new(path);
    let stem = p
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match p.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    match p.parent().filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => dir.join(name).to_string_lossy().into_owned(),
        None => name,
    }
}

/// Expand a batch pattern against the filesystem, preserving enumeration
/// order. The pattern's directory part is not glob-expanded.
fn expand_glob(pattern: &str) -> Result<Vec<String>> {
    let path = Path::new(pattern);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or(std::env::current_dir()?);
    let file_pattern = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ClipError::Build(format!("invalid glob pattern {pattern:?}")))?;

    let matcher = Glob::new(&file_pattern)
        .map_err(|e| ClipError::Build(format!("invalid glob pattern {pattern:?}: {e}")))?
        .compile_matcher();

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file() && matcher.is_match(&name) {
            matches.push(dir.join(&name).to_string_lossy().into_owned());
        }
    }
    Ok(matches)
}
