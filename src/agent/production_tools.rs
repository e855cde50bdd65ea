// QueryCut Production Tools - FFmpeg Plumbing
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Small FFmpeg wrappers shared by the transcription collaborator and the clip
// assembler: argument hygiene, output naming, audio extraction for ASR.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{error, info};

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "mov", "avi", "webm"];

/// Keep paths that start with `-` from being read as flags
pub fn safe_arg_path(path: &Path) -> PathBuf {
    if path.to_string_lossy().starts_with('-') {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

/// Force a video container extension onto an output path
pub fn ensure_video_extension(output: &Path) -> PathBuf {
    let mut output_buf = output.to_path_buf();
    let has_video_ext = output_buf
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false);

    if !has_video_ext {
        output_buf.set_extension("mp4");
        info!("[PROD] Output extension set to .mp4: {:?}", output_buf);
    }
    output_buf
}

/// `<stem>_highlights.mp4` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_highlights.mp4", stem))
}

/// Run ffmpeg quietly with `-y -nostdin` prepended and capture its output
pub async fn run_ffmpeg(args: &[String]) -> std::io::Result<Output> {
    Command::new("ffmpeg")
        .kill_on_drop(true)
        .args(["-y", "-nostdin", "-hide_banner", "-loglevel", "error"])
        .args(args)
        .output()
        .await
}

/// Last few lines of ffmpeg stderr, enough to tell what went wrong
pub fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(6);
    lines[start..].join("\n")
}

/// Extract mono PCM speech audio at `sample_rate` for transcription
pub async fn extract_speech_audio(input: &Path, output: &Path, sample_rate: u32) -> Result<()> {
    info!("[PROD] Extracting speech audio: {:?}", input);

    let args: Vec<String> = vec![
        "-i".into(),
        safe_arg_path(input).to_string_lossy().into_owned(),
        "-vn".into(),
        "-map".into(),
        "0:a:0".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        sample_rate.to_string(),
        "-c:a".into(),
        "pcm_s16le".into(),
        safe_arg_path(output).to_string_lossy().into_owned(),
    ];

    let out = run_ffmpeg(&args).await?;
    if !out.status.success() {
        let tail = stderr_tail(&out);
        error!("[PROD] Audio extraction failed: {}", tail);
        bail!("Audio extraction failed: {}", tail);
    }
    Ok(())
}
