// QueryCut Highlight Pipeline - Orchestrator
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Transcript → resolver → validator → assembler, strictly in sequence for one
// request. The pipeline never prints; it reports typed events to an optional
// observer and returns a typed outcome.

use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::agent::clip_assembler::{AssemblyError, ClipRenderer, EditedVideo};
use crate::agent::range_validator::{validate, RejectedRange};
use crate::agent::segment_resolver::{CompletionBackend, ResolutionError, SegmentResolver};
use crate::agent::transcription::TranscriptSegment;

/// Progress reported while a request runs
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Probed { duration: f64, frame_rate: Option<f64> },
    Resolving { segments: usize },
    Resolved { candidates: usize, dropped: usize },
    Validated { accepted: usize, rejected: usize },
    Assembling { clips: usize },
    Rendered { duration: f64 },
}

/// Terminal states that are not errors
#[derive(Debug, Clone)]
pub enum HighlightOutcome {
    Rendered(EditedVideo),
    /// Every candidate failed validation, or the model returned none
    NothingFound {
        candidates: usize,
        rejected: Vec<RejectedRange>,
    },
}

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("missing input: {0}")]
    UpstreamInput(String),
    #[error("no relevant segments: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

pub struct HighlightRequest<'a> {
    pub source: &'a Path,
    pub transcript: &'a [TranscriptSegment],
    pub query: &'a str,
    pub output: &'a Path,
}

type Observer = Box<dyn Fn(&PipelineEvent) + Send + Sync>;

pub struct HighlightPipeline<B, R> {
    resolver: SegmentResolver<B>,
    renderer: R,
    observer: Option<Observer>,
}

impl<B: CompletionBackend, R: ClipRenderer> HighlightPipeline<B, R> {
    pub fn new(resolver: SegmentResolver<B>, renderer: R) -> Self {
        Self {
            resolver,
            renderer,
            observer: None,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    pub async fn run(&self, request: HighlightRequest<'_>) -> Result<HighlightOutcome, HighlightError> {
        if request.transcript.is_empty() {
            return Err(HighlightError::UpstreamInput(
                "transcript is empty".to_string(),
            ));
        }
        if request.query.trim().is_empty() {
            return Err(HighlightError::UpstreamInput("query is empty".to_string()));
        }

        info!(
            "[PIPELINE] Highlight request: {:?} -> {:?} for '{}'",
            request.source, request.output, request.query
        );

        let source_info = self.renderer.probe(request.source).await?;
        self.emit(PipelineEvent::Probed {
            duration: source_info.duration,
            frame_rate: source_info.frame_rate,
        });

        self.emit(PipelineEvent::Resolving {
            segments: request.transcript.len(),
        });
        let parsed = self
            .resolver
            .resolve(request.transcript, request.query)
            .await
            .map_err(|e| {
                warn!("[PIPELINE] Resolution failed: {}", e);
                e
            })?;
        self.emit(PipelineEvent::Resolved {
            candidates: parsed.ranges.len(),
            dropped: parsed.dropped,
        });

        let report = validate(&parsed.ranges, source_info.duration);
        self.emit(PipelineEvent::Validated {
            accepted: report.accepted.len(),
            rejected: report.rejected_count(),
        });

        if report.is_empty() {
            info!("[PIPELINE] Nothing survived validation; skipping render");
            return Ok(HighlightOutcome::NothingFound {
                candidates: parsed.ranges.len(),
                rejected: report.rejected,
            });
        }

        self.emit(PipelineEvent::Assembling {
            clips: report.accepted.len(),
        });
        let video = self
            .renderer
            .assemble(request.source, &source_info, &report.accepted, request.output)
            .await?;
        self.emit(PipelineEvent::Rendered {
            duration: video.duration,
        });

        Ok(HighlightOutcome::Rendered(video))
    }
}
