//! Typed intent schema for media operations
//!
//! This is the trust boundary between model output and the rest of the
//! pipeline. Every field is a scalar or a flat ordered sequence, and the
//! whole struct is validated on construction; downstream stages never see
//! an intent that failed validation.

use crate::core::error::{ClipError, Result};
use serde::{Deserialize, Serialize};

/// Operation kind requested by the user. Exactly one per intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Transcode to another container/codec
    Convert,
    /// Cut a segment out of the input
    Trim,
    /// Drop the video stream, keep audio
    ExtractAudio,
    /// Composite an image on top of the video
    Overlay,
    /// Grab a single frame as an image
    Thumbnail,
    /// Re-encode for smaller size
    Compress,
    /// Apply a conversion to every file matching a glob
    Batch,
}

/// Validated, structured interpretation of the user's request.
///
/// Immutable once validated: the router and builder only derive new values
/// from it. Paths are validated structurally here, never against the
/// filesystem; existence and sandbox checks belong to the builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub action: Action,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
    /// Ordered ffmpeg filter expressions, e.g. `hflip`, `fps=15`.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Seconds (`12`, `3.5`) or `HH:MM:SS` forms.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    /// Canonical `WxH`, e.g. `1280x720`.
    #[serde(default)]
    pub scale: Option<String>,
    #[serde(default)]
    pub bitrate: Option<String>,
    /// Constant rate factor, 0..=51.
    #[serde(default)]
    pub crf: Option<u32>,
    #[serde(default)]
    pub overlay_path: Option<String>,
    /// Overlay position as `X:Y`, non-negative integers.
    #[serde(default)]
    pub overlay_xy: Option<String>,
    #[serde(default)]
    pub fps: Option<f64>,
    /// Batch pattern, e.g. `*.mov`.
    #[serde(default)]
    pub glob: Option<String>,
    /// Raw passthrough tokens. Model-controlled free text: the builder
    /// applies its strictest character filter to these.
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

/// Upper CRF bound shared by libx264/libx265.
pub const MAX_CRF: u32 = 51;

impl Intent {
    /// Validate structural constraints. Idempotent: a valid intent stays
    /// byte-identical through serialize-validate round trips.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(ClipError::Schema("inputs must not be empty".into()));
        }
        for (name, value) in [
            ("start", &self.start),
            ("end", &self.end),
            ("duration", &self.duration),
        ] {
            if let Some(expr) = value {
                if !is_time_expr(expr) {
                    return Err(ClipError::Schema(format!(
                        "{name} must be non-negative seconds or HH:MM:SS, got {expr:?}"
                    )));
                }
            }
        }
        if let Some(crf) = self.crf {
            if crf > MAX_CRF {
                return Err(ClipError::Schema(format!(
                    "crf must be 0..={MAX_CRF}, got {crf}"
                )));
            }
        }
        if let Some(scale) = &self.scale {
            if !is_dimension_pair(scale, 'x') {
                return Err(ClipError::Schema(format!(
                    "scale must be WxH with positive integers, got {scale:?}"
                )));
            }
        }
        if let Some(xy) = &self.overlay_xy {
            if !is_coordinate_pair(xy, ':') {
                return Err(ClipError::Schema(format!(
                    "overlay_xy must be X:Y with non-negative integers, got {xy:?}"
                )));
            }
        }
        if let Some(fps) = self.fps {
            if !(fps > 0.0) {
                return Err(ClipError::Schema(format!("fps must be positive, got {fps}")));
            }
        }
        if self.action == Action::Overlay && self.overlay_path.is_none() {
            return Err(ClipError::Schema("overlay requires overlay_path".into()));
        }
        if self.action == Action::Batch && self.glob.is_none() {
            return Err(ClipError::Schema("batch requires a glob pattern".into()));
        }
        Ok(())
    }
}

/// Accept `SS`, `SS.fff`, or `H:MM:SS` / `HH:MM:SS` with optional fraction.
pub fn is_time_expr(expr: &str) -> bool {
    if expr.is_empty() {
        return false;
    }
    let parts: Vec<&str> = expr.split(':').collect();
    match parts.as_slice() {
        [seconds] => is_decimal(seconds),
        [hours, minutes, seconds] => {
            is_integer(hours)
                && is_two_digit(minutes)
                && is_decimal(seconds)
                && seconds.split('.').next().map(|s| s.len() == 2).unwrap_or(false)
        }
        _ => false,
    }
}

fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn is_two_digit(s: &str) -> bool {
    s.len() == 2 && is_integer(s)
}

fn is_decimal(s: &str) -> bool {
    match s.split_once('.') {
        Some((whole, frac)) => is_integer(whole) && is_integer(frac),
        None => is_integer(s),
    }
}

fn is_dimension_pair(s: &str, sep: char) -> bool {
    parse_pair(s, sep).map(|(a, b)| a > 0 && b > 0).unwrap_or(false)
}

fn is_coordinate_pair(s: &str, sep: char) -> bool {
    parse_pair(s, sep).is_some()
}

/// Parse `AsepB` into two non-negative integers.
pub fn parse_pair(s: &str, sep: char) -> Option<(u64, u64)> {
    let (a, b) = s.split_once(sep)?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(action: Action) -> Intent {
        Intent {
            action,
            inputs: vec!["in.mp4".into()],
            output: None,
            video_codec: None,
            audio_codec: None,
            filters: Vec::new(),
            start: None,
            end: None,
            duration: None,
            scale: None,
            bitrate: None,
            crf: None,
            overlay_path: None,
            overlay_xy: None,
            fps: None,
            glob: None,
            extra_flags: Vec::new(),
        }
    }

    #[test]
    fn test_action_serialization() {
        assert_eq!(
            serde_json::to_string(&Action::ExtractAudio).unwrap(),
            "\"extract_audio\""
        );
        let action: Action = serde_json::from_str("\"convert\"").unwrap();
        assert_eq!(action, Action::Convert);
    }

    #[test]
    fn test_minimal_convert_is_valid() {
        assert!(minimal(Action::Convert).validate().is_ok());
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let mut intent = minimal(Action::Convert);
        intent.inputs.clear();
        assert!(matches!(intent.validate(), Err(ClipError::Schema(_))));
    }

    #[test]
    fn test_time_expressions() {
        for good in ["0", "30", "3.5", "00:00:05", "1:02:03", "01:02:03.250"] {
            assert!(is_time_expr(good), "{good} should be accepted");
        }
        for bad in ["", "-5", "1:2:3", "00:00", "five", "1:02:3.5", "00:0a:00"] {
            assert!(!is_time_expr(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_crf_bound() {
        let mut intent = minimal(Action::Compress);
        intent.crf = Some(51);
        assert!(intent.validate().is_ok());
        intent.crf = Some(52);
        assert!(intent.validate().is_err());
    }

    #[test]
    fn test_scale_must_be_positive_pair() {
        let mut intent = minimal(Action::Convert);
        intent.scale = Some("1280x720".into());
        assert!(intent.validate().is_ok());
        for bad in ["1280x0", "0x720", "1280:720", "wide", "1280x"] {
            intent.scale = Some(bad.into());
            assert!(intent.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_overlay_requires_path() {
        let mut intent = minimal(Action::Overlay);
        assert!(intent.validate().is_err());
        intent.overlay_path = Some("logo.png".into());
        intent.overlay_xy = Some("0:0".into());
        assert!(intent.validate().is_ok());
        intent.overlay_xy = Some("10:-3".into());
        assert!(intent.validate().is_err());
    }

    #[test]
    fn test_batch_requires_glob() {
        let mut intent = minimal(Action::Batch);
        assert!(intent.validate().is_err());
        intent.glob = Some("*.mov".into());
        assert!(intent.validate().is_ok());
    }

    #[test]
    fn test_validation_round_trip_is_idempotent() {
        let mut intent = minimal(Action::Trim);
        intent.start = Some("00:00:05".into());
        intent.duration = Some("10".into());
        intent.validate().unwrap();

        let json = serde_json::to_string(&intent).unwrap();
        let again: Intent = serde_json::from_str(&json).unwrap();
        again.validate().unwrap();
        assert_eq!(intent, again);
    }
}
