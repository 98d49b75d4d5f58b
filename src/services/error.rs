//! Error handling utilities for backend clients and route handlers

use axum::http::StatusCode;
use thiserror::Error;

/// Failure talking to the Supabase auth, database or storage APIs.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl BackendError {
    /// Turn a non-success response into an error, keeping the body as message.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status();
        let message = resp.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => BackendError::Unauthorized,
            404 => BackendError::NotFound(message),
            code => BackendError::Api {
                status: code,
                message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// Extension trait for logging errors and converting to StatusCode
pub trait LogErr<T> {
    /// Log error with context and return INTERNAL_SERVER_ERROR
    fn log_500(self, context: &str) -> Result<T, StatusCode>;

    /// Log error with context and return a custom StatusCode
    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::error!("{}: {}", context, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }

    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::warn!("{}: {}", context, e);
            status
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_status_maps_errors() {
        let r: Result<(), &str> = Err("boom");
        assert_eq!(
            r.log_status("ctx", StatusCode::BAD_REQUEST),
            Err(StatusCode::BAD_REQUEST)
        );
        let ok: Result<u8, &str> = Ok(3);
        assert_eq!(ok.log_500("ctx"), Ok(3));
    }
}
