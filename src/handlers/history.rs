//! ## Endpoint: `GET /history/?limit=10`
//!
//! Returns the most recent `limit` transcriptions (default 10, allowed
//! 1..=100) in insertion order, oldest of the window first.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

pub async fn get_history(
    state: web::Data<AppState>,
    params: web::Query<HistoryParams>,
) -> AppResult<HttpResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::ValidationError(format!(
            "limit must be between 1 and {}, got {}",
            MAX_LIMIT, limit
        )));
    }

    Ok(HttpResponse::Ok().json(state.history.recent(limit as usize)))
}
