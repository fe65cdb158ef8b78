// Common types and utilities for API handlers

use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::Serialize;

use crate::errors::{ConfigError, RepairError};

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn error_response(status: StatusCode, message: String) -> (StatusCode, Json<ApiResponse<()>>) {
    (status, Json(ApiResponse::error(message)))
}

/// Map engine errors to HTTP status codes
pub fn repair_error_response(err: RepairError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = match &err {
        RepairError::Validation { .. } => StatusCode::BAD_REQUEST,
        RepairError::NoActiveRun { .. } => StatusCode::NOT_FOUND,
        RepairError::Config(ConfigError::UnknownCluster { .. }) => StatusCode::NOT_FOUND,
        RepairError::AlreadyRunning { .. } => StatusCode::CONFLICT,
        RepairError::HostUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}
