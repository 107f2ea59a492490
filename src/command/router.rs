//! Intent routing - maps a validated intent onto an ordered command plan
//!
//! Total and deterministic: every well-formed intent maps to exactly one
//! plan. Per-action codec and quality defaults are resolved here, so plan
//! steps downstream never contain policy decisions, only data.

use crate::llm::schema::{parse_pair, Action, Intent};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const COMPRESS_VIDEO_CODEC: &str = "libx265";
pub const COMPRESS_CRF: u32 = 28;
/// Frame grabbed one second in when no start time was given.
pub const THUMBNAIL_DEFAULT_AT: &str = "00:00:01";

/// One abstract operation with all parameters resolved. No shell syntax,
/// no policy left to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Re-encode with explicit codecs and optional quality/shaping knobs.
    Transcode {
        video_codec: String,
        audio_codec: String,
        crf: Option<u32>,
        bitrate: Option<String>,
        scale: Option<String>,
        fps: Option<f64>,
        filters: Vec<String>,
    },
    /// Cut a segment without re-encoding.
    ExtractSegment {
        start: Option<String>,
        end: Option<String>,
        duration: Option<String>,
    },
    /// Drop video, keep audio.
    ExtractAudio { audio_codec: String },
    /// Composite an image at a fixed position.
    OverlayImage {
        overlay_path: String,
        x: u64,
        y: u64,
    },
    /// Grab a single frame.
    Thumbnail { at: String },
    /// Transcode every file matching a glob pattern. Quality knobs apply
    /// to each matched file identically.
    BatchTranscode {
        pattern: String,
        video_codec: String,
        audio_codec: String,
        crf: Option<u32>,
        bitrate: Option<String>,
        scale: Option<String>,
        fps: Option<f64>,
        filters: Vec<String>,
    },
}

/// One plan step: an operation plus the intent fields it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub operation: Operation,
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub extra_flags: Vec<String>,
}

/// Ordered sequence of plan steps derived from one intent.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub steps: Vec<PlanStep>,
}

/// Map a validated intent to its command plan.
pub fn route(intent: &Intent) -> CommandPlan {
    let operation = match intent.action {
        Action::Convert => Operation::Transcode {
            video_codec: intent
                .video_codec
                .clone()
                .unwrap_or_else(|| DEFAULT_VIDEO_CODEC.into()),
            audio_codec: intent
                .audio_codec
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.into()),
            crf: intent.crf,
            bitrate: intent.bitrate.clone(),
            scale: intent.scale.clone(),
            fps: intent.fps,
            filters: intent.filters.clone(),
        },
        Action::Compress => Operation::Transcode {
            video_codec: intent
                .video_codec
                .clone()
                .unwrap_or_else(|| COMPRESS_VIDEO_CODEC.into()),
            audio_codec: intent
                .audio_codec
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.into()),
            crf: Some(intent.crf.unwrap_or(COMPRESS_CRF)),
            bitrate: intent.bitrate.clone(),
            scale: intent.scale.clone(),
            fps: intent.fps,
            filters: intent.filters.clone(),
        },
        Action::Trim => Operation::ExtractSegment {
            start: intent.start.clone(),
            end: intent.end.clone(),
            duration: intent.duration.clone(),
        },
        Action::ExtractAudio => Operation::ExtractAudio {
            audio_codec: intent
                .audio_codec
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.into()),
        },
        Action::Overlay => {
            // Schema validation guarantees overlay_path and a well-formed
            // coordinate pair when present.
            let (x, y) = intent
                .overlay_xy
                .as_deref()
                .and_then(|xy| parse_pair(xy, ':'))
                .unwrap_or((0, 0));
            Operation::OverlayImage {
                overlay_path: intent.overlay_path.clone().unwrap_or_default(),
                x,
                y,
            }
        }
        Action::Thumbnail => Operation::Thumbnail {
            at: intent
                .start
                .clone()
                .unwrap_or_else(|| THUMBNAIL_DEFAULT_AT.into()),
        },
        Action::Batch => Operation::BatchTranscode {
            pattern: intent.glob.clone().unwrap_or_default(),
            video_codec: intent
                .video_codec
                .clone()
                .unwrap_or_else(|| DEFAULT_VIDEO_CODEC.into()),
            audio_codec: intent
                .audio_codec
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.into()),
            crf: intent.crf,
            bitrate: intent.bitrate.clone(),
            scale: intent.scale.clone(),
            fps: intent.fps,
            filters: intent.filters.clone(),
        },
    };

    CommandPlan {
        steps: vec![PlanStep {
            operation,
            inputs: intent.inputs.clone(),
            output: intent.output.clone(),
            extra_flags: intent.extra_flags.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(action: Action) -> Intent {
        serde_json::from_value(serde_json::json!({
            "action": serde_json::to_value(action).unwrap(),
            "inputs": ["in.mp4"],
        }))
        .unwrap()
    }

    #[test]
    fn test_convert_fills_default_codec_pair() {
        let plan = route(&intent(Action::Convert));
        assert_eq!(plan.steps.len(), 1);
        match &plan.steps[0].operation {
            Operation::Transcode {
                video_codec,
                audio_codec,
                crf,
                ..
            } => {
                assert_eq!(video_codec, DEFAULT_VIDEO_CODEC);
                assert_eq!(audio_codec, DEFAULT_AUDIO_CODEC);
                assert_eq!(*crf, None);
            }
            other => panic!("expected transcode, got {other:?}"),
        }
    }

    #[test]
    fn test_compress_defaults_x265_crf28() {
        let plan = route(&intent(Action::Compress));
        match &plan.steps[0].operation {
            Operation::Transcode {
                video_codec, crf, ..
            } => {
                assert_eq!(video_codec, COMPRESS_VIDEO_CODEC);
                assert_eq!(*crf, Some(COMPRESS_CRF));
            }
            other => panic!("expected transcode, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_codec_wins_over_default() {
        let mut i = intent(Action::Convert);
        i.video_codec = Some("libvpx-vp9".into());
        let plan = route(&i);
        match &plan.steps[0].operation {
            Operation::Transcode { video_codec, .. } => assert_eq!(video_codec, "libvpx-vp9"),
            other => panic!("expected transcode, got {other:?}"),
        }
    }

    #[test]
    fn test_thumbnail_default_frame_time() {
        let plan = route(&intent(Action::Thumbnail));
        assert_eq!(
            plan.steps[0].operation,
            Operation::Thumbnail {
                at: THUMBNAIL_DEFAULT_AT.into()
            }
        );
    }

    #[test]
    fn test_overlay_position_parsed() {
        let mut i = intent(Action::Overlay);
        i.overlay_path = Some("logo.png".into());
        i.overlay_xy = Some("10:20".into());
        let plan = route(&i);
        assert_eq!(
            plan.steps[0].operation,
            Operation::OverlayImage {
                overlay_path: "logo.png".into(),
                x: 10,
                y: 20
            }
        );
    }

    #[test]
    fn test_batch_carries_quality_knobs() {
        let mut i = intent(Action::Batch);
        i.glob = Some("*.mov".into());
        i.scale = Some("640x360".into());
        i.crf = Some(20);
        i.fps = Some(30.0);
        let plan = route(&i);
        match &plan.steps[0].operation {
            Operation::BatchTranscode {
                scale, crf, fps, ..
            } => {
                assert_eq!(scale.as_deref(), Some("640x360"));
                assert_eq!(*crf, Some(20));
                assert_eq!(*fps, Some(30.0));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_route_is_deterministic() {
        let mut i = intent(Action::Trim);
        i.start = Some("00:00:05".into());
        i.duration = Some("10".into());
        assert_eq!(route(&i), route(&i));
    }
}
