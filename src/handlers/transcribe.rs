//! Upload-and-transcribe endpoint.
//!
//! ## Endpoint: `POST /transcribe/?language=en&model_size=base`
//!
//! ## Request:
//! Multipart form data with an audio file in the field named `file`. Its
//! declared content type must start with `audio/`.
//!
//! ## Response:
//! ```json
//! {
//!   "id": "4f6c1f0e-...",
//!   "filename": "sample.wav",
//!   "transcription": "hello world",
//!   "language": "en",
//!   "segments": [{ "id": 0, "start": 0.0, "end": 1.2, "text": " hello world", ... }],
//!   "model_size": "base"
//! }
//! ```
//!
//! The upload lives in a fresh temporary directory for the duration of the
//! request. That directory is removed on every exit path, after the history
//! entry (if any) has been recorded.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::history::HistoryEntry;
use crate::state::AppState;
use crate::transcription::Segment;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Name given to the temp file when the upload carries no usable filename.
const FALLBACK_FILENAME: &str = "temp_audio.wav";

#[derive(Debug, Deserialize)]
pub struct TranscribeParams {
    /// Language code like "en" or "hi"; omitted means autodetect
    pub language: Option<String>,
    /// Echoed back and recorded; does not select the loaded model
    #[serde(default = "default_model_size")]
    pub model_size: String,
}

fn default_model_size() -> String {
    "base".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub id: Uuid,
    pub filename: Option<String>,
    pub transcription: String,
    pub language: String,
    pub segments: Vec<Segment>,
    pub model_size: String,
}

pub async fn transcribe(
    state: web::Data<AppState>,
    params: web::Query<TranscribeParams>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let params = params.into_inner();

    while let Some(item) = payload.next().await {
        let field = item.map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?;

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_string),
                cd.get_filename().map(str::to_string),
            ),
            None => (None, None),
        };

        if name.as_deref() == Some("file") {
            return handle_upload(&state, field, filename, params).await;
        }

        drain(field).await?;
    }

    Err(AppError::ValidationError("No audio file provided".to_string()))
}

async fn handle_upload(
    state: &AppState,
    field: Field,
    filename: Option<String>,
    params: TranscribeParams,
) -> AppResult<HttpResponse> {
    let content_type = field
        .content_type()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_default();
    if !content_type.starts_with("audio/") {
        warn!(content_type = %content_type, filename = ?filename, "Rejected non-audio upload");
        return Err(AppError::BadRequest("Only audio files are allowed".to_string()));
    }

    let temp_dir = tempfile::Builder::new().prefix("speech-api-").tempdir()?;
    let outcome = transcribe_in_dir(state, temp_dir.path(), field, filename, params).await;

    if let Err(e) = temp_dir.close() {
        warn!(error = %e, "Failed to remove temporary upload directory");
    }

    outcome
}

async fn transcribe_in_dir(
    state: &AppState,
    dir: &Path,
    mut field: Field,
    filename: Option<String>,
    params: TranscribeParams,
) -> AppResult<HttpResponse> {
    let temp_path = dir.join(temp_file_name(filename.as_deref()));
    let bytes = write_upload(&mut field, &temp_path, &state.config).await?;

    let language = params.language.filter(|l| !l.trim().is_empty());
    info!(
        filename = ?filename,
        bytes,
        language = ?language,
        model_size = %params.model_size,
        "Transcribing upload"
    );

    let transcriber = Arc::clone(&state.transcriber);
    let audio_path = temp_path.clone();
    let transcript = web::block(move || transcriber.transcribe(&audio_path, language.as_deref()))
        .await?
        .map_err(|e| {
            error!(filename = ?filename, error = %e, "Transcription failed");
            AppError::from(e)
        })?;

    let entry = HistoryEntry::new(
        filename.clone(),
        transcript.language.clone(),
        transcript.text.clone(),
        params.model_size.clone(),
    );
    let id = entry.id;
    state.history.append(entry);

    Ok(HttpResponse::Ok().json(TranscribeResponse {
        id,
        filename,
        transcription: transcript.text,
        language: transcript.language,
        segments: transcript.segments,
        model_size: params.model_size,
    }))
}

/// Stream the upload to `path`, enforcing the size limit. Returns bytes written.
async fn write_upload(field: &mut Field, path: &Path, config: &AppConfig) -> AppResult<u64> {
    let limit = config.max_upload_bytes();
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::ValidationError(format!("Upload error: {}", e)))?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "File too large (max: {} MB)",
                config.server.max_upload_mb
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn drain(mut field: Field) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?;
    }
    Ok(())
}

/// Last path component of the client's filename, never a traversal.
fn temp_file_name(filename: Option<&str>) -> PathBuf {
    filename
        .and_then(|name| Path::new(name).file_name())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use actix_web::{http::header, http::StatusCode, test as actix_test};

    fn upload(uri: &str, filename: &str, content_type: &str, data: &[u8]) -> actix_test::TestRequest {
        actix_test::TestRequest::post()
            .uri(uri)
            .insert_header((header::CONTENT_TYPE, multipart_content_type()))
            .set_payload(multipart_file("file", filename, content_type, data))
    }

    #[test]
    fn test_temp_file_name_strips_directories() {
        assert_eq!(temp_file_name(Some("sample.wav")), PathBuf::from("sample.wav"));
        assert_eq!(temp_file_name(Some("../../etc/passwd")), PathBuf::from("passwd"));
        assert_eq!(temp_file_name(Some("..")), PathBuf::from(FALLBACK_FILENAME));
        assert_eq!(temp_file_name(None), PathBuf::from(FALLBACK_FILENAME));
    }

    #[actix_web::test]
    async fn test_successful_transcription_records_history() {
        let (state, stub) = state_with(Ok(transcript("hello world", "en")));
        let history = state.history.clone();
        let app = init_app!(state);

        let req = upload("/transcribe/", "sample.wav", "audio/wav", b"RIFF-fake-audio").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: TranscribeResponse = actix_test::read_body_json(resp).await;
        assert_eq!(body.filename.as_deref(), Some("sample.wav"));
        assert_eq!(body.transcription, "hello world");
        assert_eq!(body.language, "en");
        assert_eq!(body.model_size, "base");
        assert_eq!(body.segments.len(), 1);
        assert_eq!(body.segments[0].end, 1.2);

        let entries = history.recent(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, body.id);
        assert_eq!(entries[0].text, "hello world");
        assert_eq!(entries[0].language, "en");
        assert_eq!(entries[0].filename.as_deref(), Some("sample.wav"));

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].bytes, b"RIFF-fake-audio");
        assert_eq!(calls[0].language, None);
        assert_eq!(calls[0].path.file_name().unwrap(), "sample.wav");
        assert!(!calls[0].path.parent().unwrap().exists());
    }

    #[actix_web::test]
    async fn test_language_and_model_size_are_forwarded() {
        let (state, stub) = state_with(Ok(transcript("namaste", "hi")));
        let history = state.history.clone();
        let app = init_app!(state);

        let req = upload("/transcribe?language=hi&model_size=large", "clip.mp3", "audio/mpeg", b"ID3")
            .to_request();
        let body: TranscribeResponse = actix_test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.model_size, "large");
        assert_eq!(body.language, "hi");
        assert_eq!(stub.calls()[0].language.as_deref(), Some("hi"));
        assert_eq!(history.recent(1)[0].model_size, "large");
    }

    #[actix_web::test]
    async fn test_non_audio_upload_rejected_without_side_effects() {
        let (state, stub) = state_with(Ok(transcript("hello world", "en")));
        let history = state.history.clone();
        let app = init_app!(state);

        for content_type in ["text/plain", "application/octet-stream", "video/mp4"] {
            let req = upload("/transcribe/", "notes.txt", content_type, b"not audio").to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(body["detail"], "Only audio files are allowed");
        }

        assert_eq!(history.len(), 0);
        assert!(stub.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_transcription_failure_returns_500_and_cleans_up() {
        let (state, stub) = state_with(Err("invalid data found when processing input".to_string()));
        let history = state.history.clone();
        let app = init_app!(state);

        let req = upload("/transcribe/", "broken.wav", "audio/wav", b"garbage").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(
            body["detail"],
            "Transcription failed: invalid data found when processing input"
        );
        assert_eq!(history.len(), 0);

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].path.exists());
        assert!(!calls[0].path.parent().unwrap().exists());
    }

    #[actix_web::test]
    async fn test_ids_are_unique_across_uploads() {
        let (state, _) = state_with(Ok(transcript("again", "en")));
        let history = state.history.clone();
        let app = init_app!(state);

        for _ in 0..5 {
            let req = upload("/transcribe/", "a.wav", "audio/wav", b"x").to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let mut ids: Vec<_> = history.recent(100).into_iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 5);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[actix_web::test]
    async fn test_missing_file_field_is_validation_error() {
        let (state, stub) = state_with(Ok(transcript("hello", "en")));
        let app = init_app!(state);

        let req = actix_test::TestRequest::post()
            .uri("/transcribe/")
            .insert_header((header::CONTENT_TYPE, multipart_content_type()))
            .set_payload(multipart_file("attachment", "a.wav", "audio/wav", b"x"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(stub.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_oversized_upload_rejected_and_not_recorded() {
        let mut config = AppConfig::default();
        config.server.max_upload_mb = 1;
        let (state, stub) = state_with_config(config, Ok(transcript("hello", "en")));
        let history = state.history.clone();
        let app = init_app!(state);

        let data = vec![0u8; 1024 * 1024 + 1];
        let req = upload("/transcribe/", "big.wav", "audio/wav", &data).to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(history.len(), 0);
        assert!(stub.calls().is_empty());
    }
}
