//! # Transcription Module
//!
//! The facade between the HTTP layer and the speech model. Handlers only see
//! the [`Transcriber`] trait: hand it a path to an audio file already on
//! disk plus an optional language hint, get back text, language and timed
//! segments.
//!
//! ## Key Components:
//! - **model**: Downloading and loading a Whisper checkpoint via candle
//! - **decoder**: Windowed, timestamped decoding with temperature fallback
//! - **engine**: `WhisperEngine`, the production [`Transcriber`]
//! - **languages**: Whisper's language table (codes, names, tokens)
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, the default
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good with technical vocabulary
//! - **large**: ~1550MB, best accuracy but slowest

pub mod decoder;
pub mod engine;
pub mod languages;
pub mod model;

pub use engine::WhisperEngine;
pub use model::ModelSize;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Timestamped span of the transcript.
///
/// Field names follow what Whisper clients expect, so the segment list can
/// be passed straight through to the response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: usize,
    /// Mel frame offset of the 30 s window this segment came from
    pub seek: usize,
    /// Start time in seconds from the beginning of the file
    pub start: f64,
    /// End time in seconds from the beginning of the file
    pub end: f64,
    pub text: String,
    pub tokens: Vec<u32>,
    pub temperature: f64,
    pub avg_logprob: f64,
    pub no_speech_prob: f64,
}

/// Output of one transcription call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Full text, possibly empty for silent audio
    pub text: String,
    /// Language code, either the hint or the detected one
    pub language: String,
    /// Ordered segments, empty for zero-length audio
    pub segments: Vec<Segment>,
}

/// Every failure inside the model capability surfaces as this single error.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Transcription failed: {0}")]
    Failed(String),
}

impl TranscriptionError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        TranscriptionError::Failed(err.to_string())
    }
}

/// Speech-to-text capability shared by all request handlers.
///
/// Implementations are called from actix's blocking pool, one call per
/// upload, and must be safe to share across worker threads.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<Transcript, TranscriptionError>;
}
