//! Shared fixtures for handler tests.

use crate::config::AppConfig;
use crate::history::HistoryLedger;
use crate::state::AppState;
use crate::transcription::{Segment, Transcriber, Transcript, TranscriptionError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Build an actix test service wired exactly like `main` wires the routes.
macro_rules! init_app {
    ($state:expr) => {{
        let state: $crate::state::AppState = $state;
        let static_dir = state.config.static_dir();
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new(state))
                .configure(move |cfg| $crate::handlers::configure(cfg, &static_dir)),
        )
        .await
    }};
}

/// What the stub saw on one call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub path: PathBuf,
    pub language: Option<String>,
    pub bytes: Vec<u8>,
}

/// Transcriber returning a canned outcome and recording its inputs.
pub struct StubTranscriber {
    outcome: Result<Transcript, String>,
    pub calls: Mutex<Vec<SeenCall>>,
}

impl StubTranscriber {
    pub fn new(outcome: Result<Transcript, String>) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transcriber for StubTranscriber {
    fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript, TranscriptionError> {
        let bytes = std::fs::read(audio_path).unwrap_or_default();
        self.calls.lock().unwrap().push(SeenCall {
            path: audio_path.to_path_buf(),
            language: language.map(str::to_string),
            bytes,
        });
        self.outcome.clone().map_err(TranscriptionError::Failed)
    }
}

pub fn transcript(text: &str, language: &str) -> Transcript {
    Transcript {
        text: text.to_string(),
        language: language.to_string(),
        segments: vec![Segment {
            id: 0,
            seek: 0,
            start: 0.0,
            end: 1.2,
            text: format!(" {}", text),
            tokens: vec![50364, 2425, 1002, 50424],
            temperature: 0.0,
            avg_logprob: -0.25,
            no_speech_prob: 0.02,
        }],
    }
}

pub fn state_with(outcome: Result<Transcript, String>) -> (AppState, Arc<StubTranscriber>) {
    state_with_config(AppConfig::default(), outcome)
}

pub fn state_with_config(
    config: AppConfig,
    outcome: Result<Transcript, String>,
) -> (AppState, Arc<StubTranscriber>) {
    let stub = Arc::new(StubTranscriber::new(outcome));
    let state = AppState::new(config, stub.clone(), HistoryLedger::new());
    (state, stub)
}

pub const BOUNDARY: &str = "speech-api-test-boundary";

/// Multipart body with one file part.
pub fn multipart_file(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
