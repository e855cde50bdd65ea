// QueryCut Agent Modules
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod clip_assembler;
pub mod health;
pub mod highlight_pipeline;
pub mod media_probe;
pub mod production_tools;
pub mod range_validator;
pub mod reply_parser;
pub mod segment_resolver;
pub mod transcription;
