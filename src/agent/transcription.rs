// QueryCut Transcription - Whisper Collaborator
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Produces the timestamped transcript the resolver works from. Audio is pulled
// out of the video with ffmpeg, then run through whisper.cpp locally.

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::Api;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::agent::production_tools;
use crate::config::TranscriptionConfig;

/// Sample rate whisper expects
const WHISPER_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: &str) -> Self {
        Self {
            start,
            end,
            text: text.trim().to_string(),
        }
    }

    /// `0 <= start < end` and some text to show the model
    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.start < self.end
            && !self.text.is_empty()
    }
}

/// Trim text and drop segments that break the transcript invariants
pub fn normalize_segments(raw: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let total = raw.len();
    let segments: Vec<TranscriptSegment> = raw
        .into_iter()
        .map(|seg| TranscriptSegment::new(seg.start, seg.end, &seg.text))
        .filter(TranscriptSegment::is_well_formed)
        .collect();

    if segments.len() < total {
        warn!(
            "[TRANSCRIBE] Dropped {} malformed segments",
            total - segments.len()
        );
    }
    segments
}

/// Read a transcript saved as a JSON array of `{start, end, text}`
pub fn load_transcript(path: &Path) -> Result<Vec<TranscriptSegment>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Reading transcript {:?}", path))?;
    let raw: Vec<TranscriptSegment> = serde_json::from_str(&content)
        .with_context(|| format!("Parsing transcript {:?}", path))?;
    Ok(normalize_segments(raw))
}

pub fn save_transcript(path: &Path, segments: &[TranscriptSegment]) -> Result<()> {
    let json = serde_json::to_string_pretty(segments)?;
    fs::write(path, json).with_context(|| format!("Writing transcript {:?}", path))?;
    info!("[TRANSCRIBE] Saved {} segments to {:?}", segments.len(), path);
    Ok(())
}

pub struct TranscriptionEngine {
    model_path: PathBuf,
    use_gpu: bool,
}

impl TranscriptionEngine {
    pub async fn new(config: &TranscriptionConfig) -> Result<Self> {
        let model_name = config.model_name.clone();
        let cache_dir = config.cache_dir.clone();

        // hf-hub is sync; keep it off the runtime threads
        let model_path = tokio::task::spawn_blocking(move || {
            Self::ensure_model(&model_name, cache_dir.as_deref())
        })
        .await??;

        Ok(Self {
            model_path,
            use_gpu: config.use_gpu,
        })
    }

    /// Ensure the GGML model is present in the cache dir
    fn ensure_model(model_name: &str, cache_dir: Option<&Path>) -> Result<PathBuf> {
        let base_dir = match cache_dir {
            Some(dir) => dir.join("models"),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("querycut")
                .join("models"),
        };

        fs::create_dir_all(&base_dir)?;

        let filename = format!("ggml-{}.bin", model_name);
        let model_path = base_dir.join(&filename);

        if model_path.exists() {
            info!("[TRANSCRIBE] Found cached Whisper model: {:?}", model_path);
            return Ok(model_path);
        }

        info!("[TRANSCRIBE] Downloading Whisper model: {}...", filename);

        let api = Api::new()?;
        let repo = api.model("ggerganov/whisper.cpp".to_string());
        let downloaded_path = repo.get(&filename)?;

        fs::copy(&downloaded_path, &model_path)?;

        info!("[TRANSCRIBE] Model cached: {:?}", model_path);
        Ok(model_path)
    }

    /// Extract mono 16 kHz audio from a video and transcribe it.
    /// The intermediate WAV lives in a scratch dir removed on return.
    pub async fn transcribe_video(&self, video_path: &Path) -> Result<Vec<TranscriptSegment>> {
        let scratch = tempfile::Builder::new()
            .prefix("querycut_asr")
            .tempdir()
            .context("Creating scratch dir for audio extraction")?;
        let audio_path = scratch.path().join("speech.wav");

        production_tools::extract_speech_audio(video_path, &audio_path, WHISPER_SAMPLE_RATE)
            .await?;

        self.transcribe(&audio_path).await
    }

    pub async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
        info!(
            "[TRANSCRIBE] Transcribing {:?} ({})",
            audio_path,
            if self.use_gpu { "GPU" } else { "CPU" }
        );

        let audio_path_buf = audio_path.to_path_buf();
        let model_path = self.model_path.clone();
        let use_gpu = self.use_gpu;

        let segments = tokio::task::spawn_blocking(move || {
            Self::transcribe_blocking(&model_path, &audio_path_buf, use_gpu)
        })
        .await??;

        let segments = normalize_segments(segments);
        info!(
            "[TRANSCRIBE] Transcription complete: {} segments.",
            segments.len()
        );
        Ok(segments)
    }

    fn transcribe_blocking(
        model_path: &Path,
        audio_path: &Path,
        use_gpu: bool,
    ) -> Result<Vec<TranscriptSegment>> {
        let pcm_data = read_pcm_mono(audio_path)?;
        if pcm_data.is_empty() {
            bail!("No audio samples in {:?}", audio_path);
        }

        let params = WhisperContextParameters {
            use_gpu,
            ..Default::default()
        };

        let model_str = model_path
            .to_str()
            .context("Whisper model path is not valid UTF-8")?;
        let ctx = WhisperContext::new_with_params(model_str, params)
            .map_err(|e| anyhow::anyhow!("Failed to load model: {:?}", e))?;

        let mut state = ctx.create_state().context("Create state")?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4) as i32;
        params.set_n_threads(num_threads);

        state.full(params, &pcm_data).context("Running inference")?;

        let num_segments = state.full_n_segments().context("Get segments count")?;
        let mut segments = Vec::new();

        for i in 0..num_segments {
            let start = state.full_get_segment_t0(i).unwrap_or(0) as f64 / 100.0; // centiseconds
            let end = state.full_get_segment_t1(i).unwrap_or(0) as f64 / 100.0;
            let text = state.full_get_segment_text(i).unwrap_or_default();

            segments.push(TranscriptSegment::new(start, end, &text));
        }

        Ok(segments)
    }
}

/// Read a 16-bit WAV as mono f32 at 16 kHz, downmixing and resampling if needed
fn read_pcm_mono(audio_path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(audio_path).context("Open WAV")?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let mut mono = Vec::with_capacity(reader.duration() as usize);
    let mut samples = reader.samples::<i16>();

    while let Some(Ok(first)) = samples.next() {
        let mut sum = first as f32;
        for _ in 1..channels {
            if let Some(Ok(s)) = samples.next() {
                sum += s as f32;
            }
        }
        mono.push((sum / channels as f32) / 32768.0);
    }

    if spec.sample_rate == WHISPER_SAMPLE_RATE {
        return Ok(mono);
    }

    // Naive nearest-sample resample
    let ratio = WHISPER_SAMPLE_RATE as f32 / spec.sample_rate as f32;
    let new_len = (mono.len() as f32 * ratio) as usize;
    Ok((0..new_len)
        .filter_map(|i| mono.get((i as f32 / ratio) as usize).copied())
        .collect())
}

pub fn generate_srt(segments: &[TranscriptSegment]) -> String {
    let mut srt_out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        let start = format_srt_time(seg.start);
        let end = format_srt_time(seg.end);
        srt_out.push_str(&format!("{}\n{} --> {}\n{}\n\n", i + 1, start, end, seg.text.trim()));
    }
    srt_out
}

fn format_srt_time(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let mins = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}
