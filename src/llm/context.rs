//! Bounded working-directory snapshot for model grounding
//!
//! The scan gives the model enough to resolve references like "the mov
//! file" without shipping the whole directory tree. The core treats the
//! result as opaque JSON and forwards it verbatim in the user payload.

use serde_json::json;
use std::path::Path;

/// Cap on listed entries to keep the prompt bounded.
const MAX_ENTRIES: usize = 50;

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "mkv", "avi", "webm", "m4v", "mp3", "wav", "m4a", "aac", "flac", "ogg", "gif",
    "png", "jpg", "jpeg",
];

/// Snapshot the directory: file names, sizes, and extensions, media files
/// first. Unreadable entries are skipped rather than failing the scan.
pub fn scan(dir: &Path) -> serde_json::Value {
    let mut media = Vec::new();
    let mut other = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let extension = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let is_media = MEDIA_EXTENSIONS.contains(&extension.as_str());
            let record = json!({
                "name": name,
                "size": meta.len(),
                "extension": extension,
            });
            if is_media {
                media.push(record);
            } else {
                other.push(record);
            }
        }
    }

    media.extend(other);
    media.truncate(MAX_ENTRIES);

    json!({
        "cwd": dir.to_string_lossy(),
        "files": media,
    })
}
