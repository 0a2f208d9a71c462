use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use thiserror::Error;

/// Reasons a request is turned away before or during its guarded section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// No permit became free within the acquire window.
    #[error("Too many requests")]
    TooManyRequests,
    /// The wait or the simulated work was cancelled.
    #[error("Interrupted")]
    Interrupted,
    /// The worker pool backlog is full.
    #[error("Server busy")]
    Overloaded,
}

pub type AdmissionResult<T> = Result<T, AdmissionError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

impl AdmissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AdmissionError::Interrupted => StatusCode::INTERNAL_SERVER_ERROR,
            AdmissionError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AdmissionError::TooManyRequests => "Too many requests",
            AdmissionError::Interrupted => "Interrupted",
            AdmissionError::Overloaded => "Server busy",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            error: self.message(),
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}
