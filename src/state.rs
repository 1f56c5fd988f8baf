//! # Application State Management
//!
//! Everything the request handlers share, constructed once in `main` and
//! handed to actix with `web::Data`. Nothing here is a global: tests build
//! their own `AppState` with a stub transcriber and a fresh ledger.
//!
//! ## Arc Pattern
//! - **config**: Read-only after startup, so a plain `Arc`
//! - **transcriber**: `Arc<dyn Transcriber>`, one loaded model for all requests
//! - **history**: `HistoryLedger` is itself an `Arc<RwLock<..>>` handle

use crate::config::AppConfig;
use crate::history::HistoryLedger;
use crate::transcription::Transcriber;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transcriber: Arc<dyn Transcriber>,
    pub history: HistoryLedger,
}

impl AppState {
    pub fn new(config: AppConfig, transcriber: Arc<dyn Transcriber>, history: HistoryLedger) -> Self {
        Self {
            config: Arc::new(config),
            transcriber,
            history,
        }
    }
}
