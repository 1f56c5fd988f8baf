use crate::error::AppResult;
use crate::state::AppState;
use actix_files::NamedFile;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use std::io::ErrorKind;

/// `GET /`: the built frontend's `index.html`, or a placeholder until one exists.
pub async fn serve_frontend(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let index_path = state.config.static_dir().join("index.html");

    match NamedFile::open_async(&index_path).await {
        Ok(file) => Ok(file.into_response(&req)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Ok(HttpResponse::Ok().json(json!({ "message": "Frontend not built yet" })))
        }
        Err(e) => Err(e.into()),
    }
}
