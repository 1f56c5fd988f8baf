//! # Whisper Model Loading
//!
//! Downloads (or reuses from the local Hugging Face cache) a Whisper
//! checkpoint and loads it with Candle-rs.
//!
//! ## Model Loading Process:
//! 1. Resolve the repository for the configured model size
//! 2. Fetch `config.json`, `tokenizer.json` and `model.safetensors`
//! 3. Fetch the mel filter bank matching the model's mel bin count
//! 4. Map the weights onto the selected device in `F32`
//!
//! Loading happens once, at startup. A failure here is fatal.

use anyhow::{anyhow, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Repository hosting precomputed mel filter banks for Whisper.
const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate download size in MB.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper checkpoint with everything needed to decode audio.
pub struct WhisperModel {
    pub model: m::model::Whisper,
    pub config: Config,
    pub tokenizer: Tokenizer,
    pub mel_filters: Vec<f32>,
    pub device: Device,
}

impl WhisperModel {
    /// Load a Whisper model from HuggingFace.
    ///
    /// ## Parameters:
    /// - **size**: Which checkpoint to load
    /// - **device**: Device to load the weights on
    /// - **cache_dir**: Optional Hugging Face cache override
    pub async fn load(size: ModelSize, device: Device, cache_dir: Option<&str>) -> Result<Self> {
        tracing::info!(model = %size, size_mb = size.size_mb(), "Loading Whisper model");
        let start_time = Instant::now();

        let api = build_api(cache_dir)?;
        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        tracing::debug!(
            num_mel_bins = config.num_mel_bins,
            vocab_size = config.vocab_size,
            "Model config loaded"
        );

        let mel_file = mel_filters_file(config.num_mel_bins);
        let mel_path = api
            .model(MEL_FILTERS_REPO.to_string())
            .get(mel_file)
            .await
            .map_err(|e| anyhow!("Failed to download {} from {}: {}", mel_file, MEL_FILTERS_REPO, e))?;
        let mel_filters = read_mel_filters(&std::fs::read(mel_path)?, config.num_mel_bins)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        // Always F32: no half precision fast path, whatever the device.
        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], DType::F32, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            model = %size,
            elapsed_secs = start_time.elapsed().as_secs_f64(),
            "Whisper model loaded"
        );

        Ok(Self {
            model,
            config,
            tokenizer,
            mel_filters,
            device,
        })
    }
}

fn build_api(cache_dir: Option<&str>) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);

    if let Ok(token) = std::env::var("HF_TOKEN") {
        builder = builder.with_token(Some(token));
    }

    if let Some(dir) = cache_dir {
        builder = builder.with_cache_dir(PathBuf::from(dir));
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to create Hugging Face API client: {}", e))
}

fn mel_filters_file(num_mel_bins: usize) -> &'static str {
    if num_mel_bins == 128 {
        "melfilters128.bytes"
    } else {
        "melfilters.bytes"
    }
}

/// Parse a little-endian f32 mel filter bank of `num_mel_bins x (N_FFT/2 + 1)`.
pub fn read_mel_filters(bytes: &[u8], num_mel_bins: usize) -> Result<Vec<f32>> {
    let expected_len = num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(anyhow!(
            "Mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        ));
    }

    let mut filters = vec![0f32; expected_len];
    Cursor::new(bytes).read_f32_into::<LittleEndian>(&mut filters)?;
    Ok(filters)
}
