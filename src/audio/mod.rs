//! # Audio Processing Module
//!
//! Turns an uploaded audio file into what Whisper consumes:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Channels**: Mono (multi-channel input is averaged)
//! - **Encoding**: 32-bit float samples in `[-1.0, 1.0]`
//!
//! Container and codec support comes from symphonia (WAV, FLAC, MP3,
//! Ogg/Vorbis, AAC/M4A, ...); resampling from rubato.

pub mod decode;

pub use decode::{decode_file, TARGET_SAMPLE_RATE};
