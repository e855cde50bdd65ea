// QueryCut Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use querycut::agent::clip_assembler::{ClipAssembler, ClipRenderer, EditedVideo};
use querycut::agent::health;
use querycut::agent::highlight_pipeline::{
    HighlightError, HighlightOutcome, HighlightPipeline, HighlightRequest, PipelineEvent,
};
use querycut::agent::production_tools::{default_output_path, ensure_video_extension};
use querycut::agent::range_validator::validate;
use querycut::agent::segment_resolver::{ChatCompletionClient, ConversationRange, SegmentResolver};
use querycut::agent::transcription::{
    generate_srt, load_transcript, save_transcript, TranscriptSegment, TranscriptionEngine,
};
use querycut::config::QuerycutConfig;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "querycut")]
#[command(about = "Cut a highlight reel out of a long video by asking a question", long_about = None)]
struct Cli {
    /// Path to a JSON config file (defaults to ./querycut.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe, find matching conversations, and render the highlight clip
    Highlight {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// What to look for (e.g. "the part about GPT-4 Turbo")
        #[arg(short, long)]
        query: String,

        /// Output video path (defaults to <input>_highlights.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use an existing transcript JSON instead of transcribing
        #[arg(short, long)]
        transcript: Option<PathBuf>,

        /// Fade length in seconds at each clip boundary
        #[arg(long)]
        fade: Option<f64>,
    },

    /// Transcribe a video and save the transcript as JSON
    Transcribe {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// Transcript JSON output path
        #[arg(short, long)]
        output: PathBuf,

        /// Also write SubRip subtitles here
        #[arg(long)]
        srt: Option<PathBuf>,
    },

    /// Ask the model which conversations match a query and print the ranges
    Resolve {
        /// Transcript JSON
        #[arg(short, long)]
        transcript: PathBuf,

        /// What to look for
        #[arg(short, long)]
        query: String,

        /// Source duration in seconds; when given, ranges are validated too
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// Render a clip from a JSON list of {start, end} ranges
    Assemble {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with [{"start": .., "end": ..}, ...]
        #[arg(short, long)]
        ranges: PathBuf,

        /// Output video path (defaults to <input>_highlights.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fade length in seconds at each clip boundary
        #[arg(long)]
        fade: Option<f64>,
    },

    /// Check that ffmpeg and ffprobe are installed
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Cli::parse();

    let missing_deps = health::check_dependencies();
    if !missing_deps.is_empty() {
        tracing::debug!("Missing dependencies: {:?}. Rendering will fail.", missing_deps);
    }

    let mut config = QuerycutConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Highlight {
            input,
            query,
            output,
            transcript,
            fade,
        } => {
            if let Some(fade) = fade {
                config.assembly.fade_duration = fade;
                config.validate()?;
            }
            let output = resolve_output(&input, output);
            // Fail on a missing credential before spending minutes on ASR
            config.llm.require_api_key()?;

            let segments = match transcript {
                Some(path) => load_transcript(&path)?,
                None => {
                    println!("📝 Transcribing {:?}...", input);
                    let engine = TranscriptionEngine::new(&config.transcription).await?;
                    engine.transcribe_video(&input).await?
                }
            };

            run_highlight(&config, &input, &segments, &query, &output).await?;
        }
        Commands::Transcribe { input, output, srt } => {
            let engine = TranscriptionEngine::new(&config.transcription).await?;
            let segments = engine.transcribe_video(&input).await?;
            save_transcript(&output, &segments)?;
            if let Some(srt_path) = srt {
                std::fs::write(&srt_path, generate_srt(&segments))
                    .with_context(|| format!("Writing subtitles {:?}", srt_path))?;
            }
            println!("📝 {} segments saved to {:?}", segments.len(), output);
        }
        Commands::Resolve {
            transcript,
            query,
            duration,
        } => {
            let segments = load_transcript(&transcript)?;
            if segments.is_empty() {
                bail!("Transcript {:?} has no segments", transcript);
            }
            let resolver = SegmentResolver::new(ChatCompletionClient::new(&config.llm)?);

            match resolver.resolve(&segments, &query).await {
                Ok(parsed) => {
                    let ranges = match duration {
                        Some(d) => validate(&parsed.ranges, d).accepted,
                        None => parsed.ranges,
                    };
                    println!("{}", serde_json::to_string_pretty(&ranges)?);
                }
                Err(e) => println!("🔍 No relevant segments ({})", e),
            }
        }
        Commands::Assemble {
            input,
            ranges,
            output,
            fade,
        } => {
            if let Some(fade) = fade {
                config.assembly.fade_duration = fade;
                config.validate()?;
            }
            let output = resolve_output(&input, output);

            let content = std::fs::read_to_string(&ranges)
                .with_context(|| format!("Reading ranges {:?}", ranges))?;
            let candidates: Vec<ConversationRange> = serde_json::from_str(&content)
                .with_context(|| format!("Parsing ranges {:?}", ranges))?;

            let assembler = ClipAssembler::new(config.assembly.clone());
            let info = assembler.probe(&input).await?;
            let report = validate(&candidates, info.duration);
            if report.is_empty() {
                println!(
                    "🔍 Nothing to render: all {} ranges fall outside the video",
                    candidates.len()
                );
                return Ok(());
            }

            let video = assembler
                .assemble(&input, &info, &report.accepted, &output)
                .await?;
            print_video(&video);
        }
        Commands::Check => {
            let missing = health::check_dependencies();
            if missing.is_empty() {
                println!("✅ ffmpeg and ffprobe found");
            } else {
                println!("❌ Missing: {}", missing.join(", "));
            }
        }
    }

    Ok(())
}

fn resolve_output(input: &Path, output: Option<PathBuf>) -> PathBuf {
    ensure_video_extension(&output.unwrap_or_else(|| default_output_path(input)))
}

async fn run_highlight(
    config: &QuerycutConfig,
    input: &Path,
    segments: &[TranscriptSegment],
    query: &str,
    output: &Path,
) -> Result<()> {
    let resolver = SegmentResolver::new(ChatCompletionClient::new(&config.llm)?);
    let assembler = ClipAssembler::new(config.assembly.clone());
    let pipeline = HighlightPipeline::new(resolver, assembler).with_observer(narrate);

    let request = HighlightRequest {
        source: input,
        transcript: segments,
        query,
        output,
    };

    match pipeline.run(request).await {
        Ok(HighlightOutcome::Rendered(video)) => print_video(&video),
        Ok(HighlightOutcome::NothingFound {
            candidates,
            rejected,
        }) => {
            info!("Rejected ranges: {:?}", rejected);
            println!(
                "🔍 Nothing found: {} candidate ranges, none inside the video",
                candidates
            );
        }
        Err(HighlightError::Resolution(e)) => {
            println!("🔍 No relevant segments found ({})", e);
        }
        Err(e) => {
            error!("Highlight failed: {}", e);
            return Err(e.into());
        }
    }
    Ok(())
}

fn narrate(event: &PipelineEvent) {
    match event {
        PipelineEvent::Probed {
            duration,
            frame_rate,
        } => match frame_rate {
            Some(fps) => println!("🎞️  Source: {:.1}s @ {:.2} fps", duration, fps),
            None => println!("🎞️  Source: {:.1}s (frame rate unknown)", duration),
        },
        PipelineEvent::Resolving { segments } => {
            println!("🧠 Finding relevant segments in {} transcript lines...", segments)
        }
        PipelineEvent::Resolved {
            candidates,
            dropped,
        } => println!(
            "   {} candidate ranges ({} unreadable entries skipped)",
            candidates, dropped
        ),
        PipelineEvent::Validated { accepted, rejected } => {
            println!("   {} valid, {} rejected", accepted, rejected)
        }
        PipelineEvent::Assembling { clips } => println!("✂️  Editing {} clips...", clips),
        PipelineEvent::Rendered { duration } => println!("   Rendered {:.1}s", duration),
    }
}

fn print_video(video: &EditedVideo) {
    println!(
        "✅ Highlight saved: {:?} ({} clips, {:.1}s, {:.2} fps, {:.2} MB)",
        video.path, video.clip_count, video.duration, video.frame_rate, video.size_mb
    );
}
