//! # Transcription Engine
//!
//! `WhisperEngine` is the production [`Transcriber`]: it owns the single
//! loaded model for the lifetime of the process and converts every internal
//! failure (unreadable file, unsupported codec, tensor error, unknown
//! language) into [`TranscriptionError::Failed`]. No retries.

use crate::audio;
use crate::transcription::decoder::Decoder;
use crate::transcription::languages;
use crate::transcription::model::{ModelSize, WhisperModel};
use crate::transcription::{Transcriber, Transcript, TranscriptionError};
use anyhow::Result;
use candle_core::Device;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

pub struct WhisperEngine {
    /// One decode at a time; the model's KV caches are not shareable.
    decoder: Mutex<Decoder>,
    model_size: ModelSize,
}

impl WhisperEngine {
    /// Download and load the model. Called once during bootstrap.
    pub async fn load(model_size: ModelSize, device: Device, cache_dir: Option<&str>) -> Result<Self> {
        let whisper = WhisperModel::load(model_size, device, cache_dir).await?;
        let decoder = Decoder::new(whisper)?;
        Ok(Self {
            decoder: Mutex::new(decoder),
            model_size,
        })
    }

    pub fn model_size(&self) -> ModelSize {
        self.model_size
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<Transcript, TranscriptionError> {
        let start_time = Instant::now();

        let language = resolve_hint(language)?;

        let pcm = audio::decode_file(audio_path).map_err(TranscriptionError::failed)?;
        let audio_secs = pcm.len() as f64 / audio::TARGET_SAMPLE_RATE as f64;

        let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
        let transcript = decoder.run(&pcm, language).map_err(TranscriptionError::failed)?;

        tracing::info!(
            model = %self.model_size,
            audio_secs,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            language = %transcript.language,
            segments = transcript.segments.len(),
            chars = transcript.text.len(),
            "Transcription completed"
        );

        Ok(transcript)
    }
}

/// Map a caller's language hint to a Whisper language code.
fn resolve_hint(hint: Option<&str>) -> Result<Option<&'static str>, TranscriptionError> {
    match hint {
        Some(hint) => languages::resolve(hint)
            .map(Some)
            .ok_or_else(|| TranscriptionError::Failed(format!("Unsupported language: {}", hint))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_hint_accepts_codes_and_names() {
        assert_eq!(resolve_hint(None).unwrap(), None);
        assert_eq!(resolve_hint(Some("en")).unwrap(), Some("en"));
        assert_eq!(resolve_hint(Some("Hindi")).unwrap(), Some("hi"));
    }

    #[test]
    fn test_unknown_language_fails_transcription() {
        let err = resolve_hint(Some("klingon")).unwrap_err();
        assert_eq!(err.to_string(), "Transcription failed: Unsupported language: klingon");
    }
}
