//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::audio::device::{list_devices, AudioDeviceInfo};
use crate::error::{Error, ErrorKind};
use crate::session::SessionStatus;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            error_kind: None,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self {
            error_kind: Some(err.kind()),
            ..Self::error(err.to_string())
        }
    }
}

/// HTTP status for a failed start
fn status_code_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::DeviceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConnectionError => StatusCode::BAD_GATEWAY,
        ErrorKind::DecodeError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::InitializationError => StatusCode::BAD_REQUEST,
    }
}

/// Get session status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SessionStatus>> {
    Json(ApiResponse::ok(state.session.status()))
}

/// Get available audio devices
pub async fn get_devices() -> (StatusCode, Json<ApiResponse<Vec<AudioDeviceInfo>>>) {
    match tokio::task::spawn_blocking(list_devices).await {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::ok(devices))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// Start the live session
pub async fn start_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<SessionStatus>>) {
    match state.session.start().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(state.session.status()))),
        Err(e) => (status_code_for(e.kind()), Json(ApiResponse::from_error(&e))),
    }
}

/// Stop the live session
pub async fn stop_session(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SessionStatus>> {
    state.session.stop();
    Json(ApiResponse::ok(state.session.status()))
}
