//! # Speech API - Main Application Entry Point
//!
//! HTTP front end for speech-to-text. Startup order:
//! 1. **Configuration**: defaults, `config.toml`, then environment
//! 2. **Logging**: `tracing` with `RUST_LOG` filtering
//! 3. **Model**: the Whisper model is downloaded (or read from cache) and
//!    loaded once; the server does not start without it
//! 4. **Server**: actix-web with permissive CORS and request logging
//!
//! ## Modules:
//! - **audio**: decode uploads to 16 kHz mono PCM
//! - **transcription**: the `Transcriber` trait and the candle Whisper engine
//! - **history**: in-memory, append-only transcription ledger
//! - **handlers**: route table and endpoint handlers
//! - **error**: HTTP error mapping

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod history;
mod middleware;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use device::DeviceManager;
use history::HistoryLedger;
use state::AppState;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::WhisperEngine;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speech-api v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let device = DeviceManager::get_device(config.device_preference()?);
    let engine = WhisperEngine::load(
        config.model_size()?,
        device,
        config.models.cache_dir.as_deref(),
    )
    .await
    .context("Failed to load Whisper model")?;
    info!(model = %engine.model_size(), "Whisper model ready");

    let static_dir = config.static_dir();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, Arc::new(engine), HistoryLedger::new());

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let static_dir = static_dir.clone();
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::RequestLogging)
            .configure(move |cfg| handlers::configure(cfg, &static_dir))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` wins; otherwise debug for this crate and info for actix.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_api=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
