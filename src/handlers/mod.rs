//! # HTTP Handlers
//!
//! Route table for the public API:
//! - `POST /transcribe/` - upload an audio file, get text + segments back
//! - `GET /history/` - most recent transcriptions, oldest first
//! - `GET /health/` - liveness probe
//! - `GET /` - prebuilt frontend, or a placeholder message
//! - `GET /static/*` - frontend assets, when the static directory exists
//!
//! Every API path also answers without its trailing slash.

#[cfg(test)]
#[macro_use]
mod test_support;

pub mod frontend;
pub mod history;
pub mod transcribe;

pub use frontend::*;
pub use history::*;
pub use transcribe::*;

use crate::error::AppError;
use crate::health;
use actix_files::Files;
use actix_web::web;
use std::path::Path;

pub fn configure(cfg: &mut web::ServiceConfig, static_dir: &Path) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    )
    .route("/transcribe/", web::post().to(transcribe))
    .route("/transcribe", web::post().to(transcribe))
    .route("/history/", web::get().to(get_history))
    .route("/history", web::get().to(get_history))
    .route("/health/", web::get().to(health::health_check))
    .route("/health", web::get().to(health::health_check))
    .route("/", web::get().to(serve_frontend));

    if static_dir.is_dir() {
        cfg.service(Files::new("/static", static_dir));
    } else {
        tracing::debug!(static_dir = %static_dir.display(), "Static directory missing, not mounting /static");
    }
}
