//! # Whisper Decoding
//!
//! Turns 16 kHz mono PCM into a [`Transcript`] using a loaded
//! [`WhisperModel`].
//!
//! ## Process:
//! 1. Compute the log-mel spectrogram of the whole file
//! 2. Walk it in 30 s windows (3000 mel frames each)
//! 3. Detect the language on the first window when no hint was given
//! 4. Decode each window with timestamp tokens enabled, retrying at higher
//!    temperatures when the average log-probability is too low
//! 5. Split each window's tokens on timestamp tokens into segments
//!
//! Windows that the model flags as "no speech" are skipped.

use crate::transcription::languages;
use crate::transcription::model::WhisperModel;
use crate::transcription::{Segment, Transcript};
use anyhow::{anyhow, Result};
use candle_core::{IndexOp, Tensor, D};
use candle_nn::ops::softmax;
use candle_transformers::models::whisper as m;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokenizers::Tokenizer;

const TEMPERATURES: [f64; 6] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
const LOGPROB_THRESHOLD: f64 = -1.0;
const NO_SPEECH_THRESHOLD: f64 = 0.6;

/// Seconds represented by one timestamp token step.
const TIMESTAMP_RESOLUTION: f64 = 0.02;

/// Language reported when a model has no language tokens at all.
const FALLBACK_LANGUAGE: &str = "en";

/// Raw output of decoding one window at one temperature.
#[derive(Debug, Clone)]
struct DecodingResult {
    tokens: Vec<u32>,
    avg_logprob: f64,
    no_speech_prob: f64,
    temperature: f64,
}

/// Tokens between two timestamp tokens, with absolute times in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub start: f64,
    pub end: f64,
    pub tokens: Vec<u32>,
}

/// Stateful decoder around a loaded model.
///
/// Decoding mutates the model's key/value caches and the sampling RNG, so
/// callers hold it behind a lock for the duration of a transcription.
pub struct Decoder {
    whisper: WhisperModel,
    rng: StdRng,
    suppress_tokens: Tensor,
    sot_token: u32,
    transcribe_token: u32,
    eot_token: u32,
    no_speech_token: Option<u32>,
    timestamp_begin: u32,
}

impl Decoder {
    pub fn new(whisper: WhisperModel) -> Result<Self> {
        let tokenizer = &whisper.tokenizer;
        let sot_token = token_id(tokenizer, m::SOT_TOKEN)?;
        let transcribe_token = token_id(tokenizer, m::TRANSCRIBE_TOKEN)?;
        let eot_token = token_id(tokenizer, m::EOT_TOKEN)?;
        let no_timestamps_token = token_id(tokenizer, m::NO_TIMESTAMPS_TOKEN)?;
        let no_speech_token = m::NO_SPEECH_TOKENS
            .iter()
            .find_map(|token| tokenizer.token_to_id(token));
        let timestamp_begin = tokenizer
            .token_to_id("<|0.00|>")
            .unwrap_or(no_timestamps_token + 1);

        // Timestamps are always on, so the no-timestamps token is masked too.
        let suppress_tokens: Vec<f32> = (0..whisper.config.vocab_size as u32)
            .map(|i| {
                if whisper.config.suppress_tokens.contains(&i) || i == no_timestamps_token {
                    f32::NEG_INFINITY
                } else {
                    0f32
                }
            })
            .collect();
        let suppress_tokens = Tensor::new(suppress_tokens.as_slice(), &whisper.device)?;

        Ok(Self {
            whisper,
            rng: StdRng::seed_from_u64(299792458),
            suppress_tokens,
            sot_token,
            transcribe_token,
            eot_token,
            no_speech_token,
            timestamp_begin,
        })
    }

    /// Transcribe a full recording.
    ///
    /// `language` must already be a resolved language code, or `None` to
    /// detect it from the first window.
    pub fn run(&mut self, pcm: &[f32], language: Option<&str>) -> Result<Transcript> {
        if pcm.is_empty() {
            return Ok(empty_transcript(language));
        }

        let num_mel_bins = self.whisper.config.num_mel_bins;
        let mel = m::audio::pcm_to_mel(&self.whisper.config, pcm, &self.whisper.mel_filters);
        let mel_len = mel.len();
        let mel = Tensor::from_vec(mel, (1, num_mel_bins, mel_len / num_mel_bins), &self.whisper.device)?;
        let (_, _, mel_frames) = mel.dims3()?;
        // pcm_to_mel pads the signal; only frames backed by real audio count.
        let content_frames = usize::min(pcm.len().div_ceil(m::HOP_LENGTH), mel_frames);

        let (language, language_token) = match language {
            Some(code) => {
                let token = self.whisper.tokenizer.token_to_id(&languages::token(code));
                (code.to_string(), token)
            }
            None => self.detect_language(&mel)?,
        };

        let mut segments = Vec::new();
        let mut seek = 0;
        while seek < content_frames {
            let segment_size = usize::min(content_frames - seek, m::N_FRAMES);
            let window_frames = usize::min(mel_frames - seek, m::N_FRAMES);
            let mel_window = mel.narrow(2, seek, window_frames)?;
            let time_offset = (seek * m::HOP_LENGTH) as f64 / m::SAMPLE_RATE as f64;
            let window_duration = (segment_size * m::HOP_LENGTH) as f64 / m::SAMPLE_RATE as f64;

            let result = self.decode_with_fallback(&mel_window, language_token)?;
            if result.no_speech_prob > NO_SPEECH_THRESHOLD && result.avg_logprob < LOGPROB_THRESHOLD {
                tracing::debug!(seek, no_speech_prob = result.no_speech_prob, "Skipping silent window");
                seek += segment_size;
                continue;
            }

            let spans = split_on_timestamps(
                &result.tokens,
                self.timestamp_begin,
                self.eot_token,
                time_offset,
                window_duration,
            );
            for span in spans {
                let text = self
                    .whisper
                    .tokenizer
                    .decode(&span.tokens, true)
                    .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
                if text.trim().is_empty() {
                    continue;
                }
                segments.push(Segment {
                    id: segments.len(),
                    seek,
                    start: span.start,
                    end: span.end,
                    text,
                    tokens: span.tokens,
                    temperature: result.temperature,
                    avg_logprob: result.avg_logprob,
                    no_speech_prob: result.no_speech_prob,
                });
            }

            tracing::debug!(seek, time_offset, segments = segments.len(), "Decoded window");
            seek += segment_size;
        }

        let text = segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<String>()
            .trim()
            .to_string();

        Ok(Transcript {
            text,
            language,
            segments,
        })
    }

    /// Pick the most likely language token for the first window.
    fn detect_language(&mut self, mel: &Tensor) -> Result<(String, Option<u32>)> {
        let candidates: Vec<(&'static str, u32)> = languages::LANGUAGES
            .iter()
            .filter_map(|(code, _)| {
                self.whisper
                    .tokenizer
                    .token_to_id(&languages::token(code))
                    .map(|token| (*code, token))
            })
            .collect();

        if candidates.is_empty() {
            // English-only checkpoints have no language tokens
            return Ok((FALLBACK_LANGUAGE.to_string(), None));
        }

        let (_, _, frames) = mel.dims3()?;
        let mel = mel.narrow(2, 0, usize::min(frames, m::N_FRAMES))?;
        let device = mel.device();

        let audio_features = self.whisper.model.encoder.forward(&mel, true)?;
        let tokens = Tensor::new(&[[self.sot_token]], device)?;
        let ys = self.whisper.model.decoder.forward(&tokens, &audio_features, true)?;
        let logits = self.whisper.model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;

        let ids: Vec<u32> = candidates.iter().map(|(_, token)| *token).collect();
        let ids = Tensor::new(ids.as_slice(), device)?;
        let probs = softmax(&logits.index_select(&ids, 0)?, D::Minus1)?.to_vec1::<f32>()?;

        let (best, prob) = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| anyhow!("Language detection produced no probabilities"))?;
        let (code, token) = candidates[best];
        tracing::info!(language = code, probability = *prob, "Detected language");

        Ok((code.to_string(), Some(token)))
    }

    fn decode_with_fallback(&mut self, mel: &Tensor, language_token: Option<u32>) -> Result<DecodingResult> {
        let mut last = None;
        for &temperature in TEMPERATURES.iter() {
            let result = self.decode(mel, temperature, language_token)?;
            let confident = result.avg_logprob >= LOGPROB_THRESHOLD;
            if confident || result.no_speech_prob > NO_SPEECH_THRESHOLD {
                return Ok(result);
            }
            tracing::debug!(temperature, avg_logprob = result.avg_logprob, "Low confidence, retrying hotter");
            last = Some(result);
        }
        last.ok_or_else(|| anyhow!("No decoding temperatures configured"))
    }

    fn decode(&mut self, mel: &Tensor, temperature: f64, language_token: Option<u32>) -> Result<DecodingResult> {
        let model = &mut self.whisper.model;
        let device = mel.device().clone();
        let audio_features = model.encoder.forward(mel, true)?;
        let sample_len = model.config.max_target_positions / 2;

        let mut tokens = vec![self.sot_token];
        if let Some(language_token) = language_token {
            tokens.push(language_token);
        }
        tokens.push(self.transcribe_token);
        let prompt_len = tokens.len();

        let mut sum_logprob = 0f64;
        let mut no_speech_prob = f64::NAN;

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &device)?.unsqueeze(0)?;
            let ys = model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            if i == 0 {
                if let Some(no_speech_token) = self.no_speech_token {
                    let logits = model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
                    no_speech_prob = softmax(&logits, 0)?
                        .i(no_speech_token as usize)?
                        .to_scalar::<f32>()? as f64;
                }
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let logits = logits.broadcast_add(&self.suppress_tokens)?;

            let next_token = if temperature > 0f64 {
                let prs = softmax(&(&logits / temperature)?, 0)?.to_vec1::<f32>()?;
                let distr = WeightedIndex::new(&prs)?;
                distr.sample(&mut self.rng) as u32
            } else {
                let values = logits.to_vec1::<f32>()?;
                values
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(i, _)| i as u32)
                    .ok_or_else(|| anyhow!("Empty logits"))?
            };

            tokens.push(next_token);
            let prob = softmax(&logits, D::Minus1)?
                .i(next_token as usize)?
                .to_scalar::<f32>()? as f64;
            if next_token == self.eot_token || tokens.len() > model.config.max_target_positions {
                break;
            }
            sum_logprob += prob.ln();
        }

        model.reset_kv_cache();

        let output: Vec<u32> = tokens[prompt_len..].to_vec();
        let avg_logprob = sum_logprob / output.len().max(1) as f64;

        Ok(DecodingResult {
            tokens: output,
            avg_logprob,
            no_speech_prob,
            temperature,
        })
    }
}

/// Result for a recording with no samples: no text, no segments, and the
/// hinted language (English when there is no hint).
pub fn empty_transcript(language: Option<&str>) -> Transcript {
    Transcript {
        text: String::new(),
        language: language.unwrap_or(FALLBACK_LANGUAGE).to_string(),
        segments: Vec::new(),
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("Token not found in vocabulary: {}", token))
}

/// Split a window's output tokens into timed spans.
///
/// Timestamp tokens (`>= timestamp_begin`) mark span boundaries; other
/// special tokens (`>= eot`) are dropped. Text after the last timestamp
/// runs to the end of the window. Times are offset by `time_offset`.
pub fn split_on_timestamps(
    tokens: &[u32],
    timestamp_begin: u32,
    eot: u32,
    time_offset: f64,
    window_duration: f64,
) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut pending: Vec<u32> = Vec::new();
    let mut span_start = 0f64;

    for &token in tokens {
        if token >= timestamp_begin {
            let timestamp = f64::from(token - timestamp_begin) * TIMESTAMP_RESOLUTION;
            if !pending.is_empty() {
                spans.push(TokenSpan {
                    start: time_offset + span_start,
                    end: time_offset + timestamp.max(span_start),
                    tokens: std::mem::take(&mut pending),
                });
            }
            span_start = timestamp;
        } else if token < eot {
            pending.push(token);
        }
    }

    if !pending.is_empty() {
        spans.push(TokenSpan {
            start: time_offset + span_start,
            end: time_offset + window_duration.max(span_start),
            tokens: pending,
        });
    }

    spans
}
