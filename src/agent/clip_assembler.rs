// QueryCut Clip Assembler - Extract, Fade, Compose, Render
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Turns validated ranges into one output file:
//   1. each range is re-encoded on its own with a fade-in and fade-out inside
//      its own boundaries (so total length = sum of span lengths)
//   2. spans are joined in the given order through a concat filter graph,
//      each padded (never scaled or cropped) onto a canvas sized to the
//      largest span
//   3. the result is encoded once with the fixed codec pair at the source
//      frame rate, or the configured default when the source has none
//
// Intermediate spans live in a scratch dir dropped on every exit path. The
// final render goes to a temp file beside the destination and is only moved
// into place once ffmpeg has succeeded.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::agent::media_probe::{probe_media, MediaInfo};
use crate::agent::production_tools::{run_ffmpeg, safe_arg_path, stderr_tail};
use crate::agent::segment_resolver::ConversationRange;
use crate::config::AssemblyConfig;

pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no ranges to assemble")]
    NoRanges,
    #[error("could not probe {path:?}: {reason}")]
    Probe { path: PathBuf, reason: String },
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("extracting range {index} ({start:.2}s-{end:.2}s) failed: {stderr}")]
    Extract {
        index: usize,
        start: f64,
        end: f64,
        stderr: String,
    },
    #[error("extracted span {index} has no playable content")]
    EmptySpan { index: usize },
    #[error("rendering {path:?} failed: {stderr}")]
    Render { path: PathBuf, stderr: String },
    #[error("I/O error during assembly: {0}")]
    Io(#[from] std::io::Error),
}

/// One extracted, faded span. Lives only inside one `assemble` call.
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub index: usize,
    pub range: ConversationRange,
    pub path: PathBuf,
    pub info: MediaInfo,
}

/// The finished highlight file, handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct EditedVideo {
    pub path: PathBuf,
    /// Length of the written file as probed after the render
    pub duration: f64,
    pub frame_rate: f64,
    pub video_codec: &'static str,
    /// `None` when the source carried no audio stream
    pub audio_codec: Option<&'static str>,
    pub clip_count: usize,
    pub size_mb: f64,
}

/// Probing and rendering, as the pipeline sees them
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<MediaInfo, AssemblyError>;

    async fn assemble(
        &self,
        source: &Path,
        source_info: &MediaInfo,
        ranges: &[ConversationRange],
        output: &Path,
    ) -> Result<EditedVideo, AssemblyError>;
}

/// Inherit the source rate when known, else fall back
pub fn resolve_frame_rate(source_rate: Option<f64>, default_frame_rate: f64) -> f64 {
    source_rate
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(default_frame_rate)
}

/// `-r` value at the full precision of the probed rate (30000/1001 stays exact)
pub fn format_frame_rate(frame_rate: f64) -> String {
    frame_rate.to_string()
}

/// Probed output length when usable, else the sum of the span lengths
pub fn reported_duration(probed: Option<f64>, nominal: f64) -> f64 {
    probed
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(nominal)
}

/// Fade length actually used for a span: at most half of it
pub fn effective_fade(span_duration: f64, fade_duration: f64) -> f64 {
    fade_duration.max(0.0).min(span_duration / 2.0)
}

/// `(video, audio)` fade filter chains for one span, `None` when fading is off
pub fn fade_filters(span_duration: f64, fade_duration: f64) -> Option<(String, String)> {
    let fade = effective_fade(span_duration, fade_duration);
    if fade <= 0.0 {
        return None;
    }
    let out_start = span_duration - fade;

    Some((
        format!(
            "fade=t=in:st=0:d={fade:.3},fade=t=out:st={out_start:.3}:d={fade:.3}"
        ),
        format!(
            "afade=t=in:st=0:d={fade:.3},afade=t=out:st={out_start:.3}:d={fade:.3}"
        ),
    ))
}

/// Canvas for the compositing join: largest span, rounded up to even sizes
pub fn compose_canvas(clips: &[RenderedClip]) -> (u32, u32) {
    let width = clips.iter().map(|c| c.info.width).max().unwrap_or(0);
    let height = clips.iter().map(|c| c.info.height).max().unwrap_or(0);
    (width + width % 2, height + height % 2)
}

/// Filter graph that pads every span onto the canvas and concatenates them
/// in input order. Output pads are `[outv]` and, with audio, `[outa]`.
pub fn build_compose_filter(clip_count: usize, canvas: (u32, u32), with_audio: bool) -> String {
    let (width, height) = canvas;
    let mut graph = String::new();
    let mut concat_inputs = String::new();

    for i in 0..clip_count {
        graph.push_str(&format!(
            "[{i}:v:0]pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}];"
        ));
        concat_inputs.push_str(&format!("[v{i}]"));
        if with_audio {
            concat_inputs.push_str(&format!("[{i}:a:0]"));
        }
    }

    let audio_streams = if with_audio { 1 } else { 0 };
    graph.push_str(&format!(
        "{concat_inputs}concat=n={clip_count}:v=1:a={audio_streams}[outv]"
    ));
    if with_audio {
        graph.push_str("[outa]");
    }
    graph
}

pub struct ClipAssembler {
    config: AssemblyConfig,
}

impl ClipAssembler {
    pub fn new(config: AssemblyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// ffmpeg arguments for extracting and fading one span
    pub fn extract_args(
        &self,
        source: &Path,
        range: &ConversationRange,
        with_audio: bool,
        output: &Path,
    ) -> Vec<String> {
        let span = range.duration();
        let mut args: Vec<String> = vec![
            "-ss".into(),
            format!("{:.3}", range.start),
            "-t".into(),
            format!("{:.3}", span),
            "-i".into(),
            safe_arg_path(source).to_string_lossy().into_owned(),
            "-map".into(),
            "0:v:0".into(),
        ];
        if with_audio {
            args.extend(["-map".into(), "0:a:0".into()]);
        }

        if let Some((video_fade, audio_fade)) = fade_filters(span, self.config.fade_duration) {
            args.extend(["-vf".into(), video_fade]);
            if with_audio {
                args.extend(["-af".into(), audio_fade]);
            }
        }

        args.extend(self.codec_args(with_audio));
        args.extend([
            "-avoid_negative_ts".into(),
            "make_zero".into(),
            safe_arg_path(output).to_string_lossy().into_owned(),
        ]);
        args
    }

    /// ffmpeg arguments for the compositing join and final encode
    pub fn render_args(
        &self,
        clips: &[RenderedClip],
        with_audio: bool,
        frame_rate: f64,
        output: &Path,
    ) -> Vec<String> {
        let mut args = Vec::new();
        for clip in clips {
            args.extend(["-i".into(), safe_arg_path(&clip.path).to_string_lossy().into_owned()]);
        }

        let filter = build_compose_filter(clips.len(), compose_canvas(clips), with_audio);
        args.extend(["-filter_complex".into(), filter, "-map".into(), "[outv]".into()]);
        if with_audio {
            args.extend(["-map".into(), "[outa]".into()]);
        }

        args.extend(["-r".into(), format_frame_rate(frame_rate)]);
        args.extend(self.codec_args(with_audio));
        args.extend([
            "-movflags".into(),
            "+faststart".into(),
            safe_arg_path(output).to_string_lossy().into_owned(),
        ]);
        args
    }

    fn codec_args(&self, with_audio: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-c:v".into(),
            VIDEO_CODEC.into(),
            "-preset".into(),
            self.config.preset.clone(),
            "-crf".into(),
            self.config.crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ];
        if with_audio {
            args.extend([
                "-c:a".into(),
                AUDIO_CODEC.into(),
                "-b:a".into(),
                self.config.audio_bitrate.clone(),
            ]);
        } else {
            args.push("-an".into());
        }
        args
    }

    async fn extract_clip(
        &self,
        index: usize,
        source: &Path,
        range: &ConversationRange,
        with_audio: bool,
        scratch: &Path,
    ) -> Result<RenderedClip, AssemblyError> {
        let path = scratch.join(format!("span_{:04}.mp4", index));
        let args = self.extract_args(source, range, with_audio, &path);

        let out = run_ffmpeg(&args).await.map_err(|source| AssemblyError::Spawn {
            tool: "ffmpeg",
            source,
        })?;
        if !out.status.success() {
            let stderr = stderr_tail(&out);
            error!("[ASSEMBLER] Span {} extraction failed: {}", index, stderr);
            return Err(AssemblyError::Extract {
                index,
                start: range.start,
                end: range.end,
                stderr,
            });
        }

        let info = probe_media(&path)
            .await
            .map_err(|_| AssemblyError::EmptySpan { index })?;

        Ok(RenderedClip {
            index,
            range: *range,
            path,
            info,
        })
    }
}

#[async_trait]
impl ClipRenderer for ClipAssembler {
    async fn probe(&self, source: &Path) -> Result<MediaInfo, AssemblyError> {
        probe_media(source).await
    }

    async fn assemble(
        &self,
        source: &Path,
        source_info: &MediaInfo,
        ranges: &[ConversationRange],
        output: &Path,
    ) -> Result<EditedVideo, AssemblyError> {
        if ranges.is_empty() {
            return Err(AssemblyError::NoRanges);
        }

        let frame_rate = resolve_frame_rate(source_info.frame_rate, self.config.default_frame_rate);
        let with_audio = source_info.has_audio;
        info!(
            "[ASSEMBLER] Assembling {} ranges from {:?} at {:.3} fps (fade {:.2}s)",
            ranges.len(),
            source,
            frame_rate,
            self.config.fade_duration
        );

        let out_dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let scratch = tempfile::Builder::new()
            .prefix(".querycut_spans")
            .tempdir_in(&out_dir)?;

        let mut clips = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.iter().enumerate() {
            let clip = self
                .extract_clip(index, source, range, with_audio, scratch.path())
                .await?;
            info!(
                "[ASSEMBLER] ⏳ Span {}/{} extracted ({:.2}s-{:.2}s)",
                index + 1,
                ranges.len(),
                range.start,
                range.end
            );
            clips.push(clip);
        }

        let suffix = output
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| ".mp4".to_string());
        let staged = tempfile::Builder::new()
            .prefix(".querycut_render")
            .suffix(&suffix)
            .tempfile_in(&out_dir)?;

        let args = self.render_args(&clips, with_audio, frame_rate, staged.path());
        info!("[ASSEMBLER] 🔗 Composing {} spans...", clips.len());

        let out = run_ffmpeg(&args).await.map_err(|source| AssemblyError::Spawn {
            tool: "ffmpeg",
            source,
        })?;
        if !out.status.success() {
            let stderr = stderr_tail(&out);
            error!("[ASSEMBLER] Final render failed: {}", stderr);
            return Err(AssemblyError::Render {
                path: output.to_path_buf(),
                stderr,
            });
        }

        staged.persist(output).map_err(|e| AssemblyError::Io(e.error))?;

        let size_mb = std::fs::metadata(output)?.len() as f64 / 1_048_576.0;
        let nominal: f64 = ranges.iter().map(ConversationRange::duration).sum();
        let probed = match probe_media(output).await {
            Ok(info) => Some(info.duration),
            Err(e) => {
                warn!("[ASSEMBLER] Could not probe rendered file, reporting span total: {}", e);
                None
            }
        };
        let duration = reported_duration(probed, nominal);

        info!(
            "[ASSEMBLER] ✅ Rendered {:?}: {:.2}s, {:.2} MB",
            output, duration, size_mb
        );

        Ok(EditedVideo {
            path: output.to_path_buf(),
            duration,
            frame_rate,
            video_codec: VIDEO_CODEC,
            audio_codec: with_audio.then_some(AUDIO_CODEC),
            clip_count: clips.len(),
            size_mb,
        })
    }
}
