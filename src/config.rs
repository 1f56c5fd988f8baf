//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms set these)
//! 2. Environment variables (APP_SERVER__PORT, APP_MODELS__WHISPER_MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Sections are separated by a double underscore so that field names which
//! contain a single underscore (`static_dir`, `whisper_model`) stay intact.

use crate::device::DevicePreference;
use crate::transcription::ModelSize;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// The HTTP surface and the speech model are configured independently,
/// so each gets its own section in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `static_dir`: Directory holding the prebuilt frontend (`index.html` + assets)
/// - `max_upload_mb`: Largest accepted audio upload, in megabytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
    pub max_upload_mb: u64,
}

/// Speech model configuration settings.
///
/// ## Fields:
/// - `whisper_model`: Which Whisper checkpoint to load at startup ("tiny", "base", "small", "medium", "large")
/// - `device`: Where inference runs ("cpu", "cuda", "metal", "auto")
/// - `cache_dir`: Optional override for the Hugging Face download cache
///
/// The model is loaded exactly once. The `model_size` query parameter on
/// `/transcribe/` is echoed back but never changes what is loaded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub device: String,
    pub cache_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8000,
                static_dir: "static".to_string(),
                max_upload_mb: 100,
            },
            models: ModelsConfig {
                whisper_model: "base".to_string(),
                device: "cpu".to_string(),      // Portable default, no GPU required
                cache_dir: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER__MAX_UPLOAD_MB=25`: Shrink the upload limit
    /// - `APP_MODELS__WHISPER_MODEL=small`: Load a different checkpoint
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Upload limit is greater than 0
    /// - The Whisper model size and device preference are known values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        self.model_size()?;
        self.device_preference()?;

        Ok(())
    }

    /// Parsed Whisper checkpoint to load at startup.
    pub fn model_size(&self) -> Result<ModelSize> {
        self.models.whisper_model.parse()
    }

    /// Parsed inference device preference.
    pub fn device_preference(&self) -> Result<DevicePreference> {
        self.models
            .device
            .parse::<DevicePreference>()
            .map_err(|e| anyhow::anyhow!(e))
    }

    pub fn static_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.static_dir)
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.models.whisper_model, "base");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.max_upload_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_model_and_device_rejected() {
        let mut config = AppConfig::default();
        config.models.whisper_model = "gigantic".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.models.device = "tpu".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parsed_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.model_size().unwrap(), ModelSize::Base);
        assert_eq!(config.device_preference().unwrap(), DevicePreference::Cpu);
        assert_eq!(config.static_dir(), PathBuf::from("static"));
        assert_eq!(config.max_upload_bytes(), 100 * 1024 * 1024);
    }
}
