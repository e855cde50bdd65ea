// QueryCut Media Probe
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// ffprobe wrapper: duration, frame rate, dimensions, audio presence.

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::agent::clip_assembler::AssemblyError;
use crate::agent::production_tools::safe_arg_path;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration: f64,
    /// `None` when the container does not report a usable rate
    pub frame_rate: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

pub async fn probe_media(path: &Path) -> Result<MediaInfo, AssemblyError> {
    let probe_err = |reason: String| AssemblyError::Probe {
        path: path.to_path_buf(),
        reason,
    };

    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new("ffprobe")
            .kill_on_drop(true)
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=codec_type,width,height,r_frame_rate:format=duration",
                "-of",
                "json",
            ])
            .arg(safe_arg_path(path))
            .output(),
    )
    .await
    .map_err(|_| probe_err("ffprobe timed out".to_string()))?
    .map_err(|source| AssemblyError::Spawn {
        tool: "ffprobe",
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(probe_err(stderr));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout)).map_err(probe_err)?;

    match info.frame_rate {
        Some(fps) => info!(
            "[PROBE] {:?}: {:.2}s, {}x{} @ {:.3} fps, audio: {}",
            path, info.duration, info.width, info.height, fps, info.has_audio
        ),
        None => warn!(
            "[PROBE] {:?}: {:.2}s, {}x{}, frame rate unknown",
            path, info.duration, info.width, info.height
        ),
    }
    Ok(info)
}

/// Parse `ffprobe -of json` output
pub fn parse_probe_output(json: &str) -> Result<MediaInfo, String> {
    let v: Value = serde_json::from_str(json).map_err(|e| format!("bad ffprobe json: {}", e))?;

    let streams = v["streams"].as_array().cloned().unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| "no video stream".to_string())?;
    let has_audio = streams.iter().any(|s| s["codec_type"] == "audio");

    let duration = v["format"]["duration"]
        .as_str()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| "unknown or zero duration".to_string())?;

    Ok(MediaInfo {
        duration,
        frame_rate: video["r_frame_rate"].as_str().and_then(parse_frame_rate),
        width: video["width"].as_u64().unwrap_or(0) as u32,
        height: video["height"].as_u64().unwrap_or(0) as u32,
        has_audio,
    })
}

/// `"30000/1001"` or `"25"`; `"0/0"` and other non-positive rates are unknown
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("24/0"), None);
        assert_eq!(parse_frame_rate("N/A"), None);
        assert_eq!(parse_frame_rate(""), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720, "r_frame_rate": "30/1"}
            ],
            "format": {"duration": "15.000000"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, 15.0);
        assert_eq!(info.frame_rate, Some(30.0));
        assert_eq!((info.width, info.height), (1280, 720));
        assert!(info.has_audio);
    }

    #[test]
    fn test_probe_without_audio_or_rate() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "r_frame_rate": "0/0"}],
            "format": {"duration": "4.2"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_rate, None);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_probe_rejects_audio_only_and_zero_duration() {
        let audio_only = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(parse_probe_output(audio_only).is_err());

        let zero = r#"{"streams": [{"codec_type": "video"}], "format": {"duration": "0.0"}}"#;
        assert!(parse_probe_output(zero).is_err());
    }
}
