// QueryCut Segment Resolver - Query → Conversation Ranges
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Sends the transcript and the user query to an OpenAI-compatible chat
// completion endpoint and turns whatever comes back into candidate ranges.
// Ranges produced here are untrusted until the validator has seen them.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::agent::reply_parser::{parse_reply, ParsedReply};
use crate::agent::transcription::TranscriptSegment;
use crate::config::{ConfigError, LlmConfig};

/// A candidate or validated highlight span, in seconds of source time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversationRange {
    pub start: f64,
    pub end: f64,
}

impl ConversationRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("completion request timed out after {0}s")]
    Timeout(u64),
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion endpoint returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion reply carried no content")]
    EmptyReply,
    #[error("unparseable response")]
    Unparseable,
}

/// Anything that can turn one instruction into one raw completion text
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, instruction: &str) -> Result<String, ResolutionError>;
}

/// Chat completion client for OpenAI-compatible endpoints (Groq, Ollama, ...)
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    timeout_secs: u64,
}

impl ChatCompletionClient {
    /// Build a client from config. The credential must be present up front.
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?.to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request body: a single system message, no streaming
    pub fn request_body(&self, instruction: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": instruction
                }
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": self.top_p,
            "stream": false,
            "stop": null
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ResolutionError {
        if e.is_timeout() {
            error!("[RESOLVER] Completion timed out after {}s", self.timeout_secs);
            ResolutionError::Timeout(self.timeout_secs)
        } else {
            error!("[RESOLVER] Completion transport failure: {}", e);
            ResolutionError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionClient {
    async fn complete(&self, instruction: &str) -> Result<String, ResolutionError> {
        info!(
            "[RESOLVER] Asking {} for conversations ({} chars of instruction)",
            self.model,
            instruction.len()
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(instruction))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("[RESOLVER] API Error: {} {}", status, body);
            return Err(ResolutionError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let json: Value = resp.json().await.map_err(|e| self.transport_error(e))?;
        reply_content(&json).ok_or(ResolutionError::EmptyReply)
    }
}

/// Extract `choices[0].message.content`, ignoring blank replies
pub fn reply_content(json: &Value) -> Option<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .filter(|content| !content.trim().is_empty())
        .map(str::to_string)
}

/// Build the system instruction embedding transcript and query
pub fn build_instruction(transcript: &[TranscriptSegment], query: &str) -> String {
    let segments = transcript
        .iter()
        .map(|seg| {
            json!({
                "start": seg.start,
                "end": seg.end,
                "text": seg.text,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"You are a video editor working from a timestamped transcript. A conversation is a run of consecutive transcript segments. Find every conversation that answers the user query.

Rules:
1. Pick only complete runs of consecutive segments. A conversation should usually span more than one segment so the viewer gets context.
2. Include the segments before and after that are needed for the conversation to make sense on its own.
3. Never cut a sentence or an idea in half.
4. Return as many separate conversations as are relevant.
5. Start and end times must be copied from the segment timestamps in the transcript.
6. Only choose material that is actually in the video and relevant to the query.

Reply with a single JSON object and nothing else, in exactly this shape:
{{"conversations": [{{"start": <seconds>, "end": <seconds>}}, {{"start": <seconds>, "end": <seconds>}}]}}

Transcript:
[
{segments}
]

User query:
{query}"#
    )
}

/// Resolves a query against a transcript through a completion backend
pub struct SegmentResolver<B> {
    backend: B,
}

impl<B: CompletionBackend> SegmentResolver<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// One completion call, no retries. Candidate ranges come back in the
    /// model's declared order.
    pub async fn resolve(
        &self,
        transcript: &[TranscriptSegment],
        query: &str,
    ) -> Result<ParsedReply, ResolutionError> {
        info!(
            "[RESOLVER] Resolving query '{}' against {} segments",
            query,
            transcript.len()
        );

        let instruction = build_instruction(transcript, query);
        let raw = self.backend.complete(&instruction).await?;
        let parsed = parse_reply(&raw)?;

        info!(
            "[RESOLVER] {} candidate ranges ({} dropped, via {:?})",
            parsed.ranges.len(),
            parsed.dropped,
            parsed.strategy
        );
        Ok(parsed)
    }
}
