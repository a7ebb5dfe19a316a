//! REST API module.
//!
//! Handlers are thin: extract the caller's session and body, call the matching
//! service operation and wrap the outcome in the revision-stamped envelope.

mod auth;
mod missions;
mod organizations;
mod profile;
mod requests;
mod revision;
mod teams;

pub use auth::*;
pub use missions::*;
pub use organizations::*;
pub use profile::*;
pub use requests::*;
pub use revision::*;
pub use teams::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Wrap the outcome of a write. Successes carry the revision the write
/// produced; failures carry the revision read before it.
async fn written<T: Serialize>(
    state: &AppState,
    revision_id: i64,
    result: Result<T, AppError>,
) -> ApiResult<T> {
    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// Wrap the outcome of a read.
fn read<T: Serialize>(revision_id: i64, result: Result<T, AppError>) -> ApiResult<T> {
    match result {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}
