/*
error.rs
*/

use axum::{
    Json,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{
    json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    StartupError(String),
    #[error("{0}")]
    ConfigurationError(String),
    #[error("{0}")]
    AuthenticationError(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    UpstreamError(String),
    #[error("{0}")]
    SessionRejected(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StartupError(_)
            | ApiError::ConfigurationError(_)
            | ApiError::AuthenticationError(_)
            | ApiError::UpstreamError(_)
            | ApiError::SessionRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/*
Every failure is reported in the response body as {"error": "<description>"}.
*/
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, self);
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
