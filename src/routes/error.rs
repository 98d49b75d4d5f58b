//! Page-level failures rendered as the localized error page

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::i18n::Locale;
use crate::services::error::BackendError;
use crate::views::{self, PageContext};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("request failed with {0}")]
    Status(StatusCode),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Backend(BackendError::Unauthorized) => StatusCode::FORBIDDEN,
            AppError::Backend(BackendError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Backend(_) => StatusCode::BAD_GATEWAY,
            AppError::Status(s) => *s,
        }
    }
}

/// An `AppError` with enough request context to render the error page
#[derive(Debug)]
pub struct PageError {
    pub locale: Locale,
    /// Where the retry button leads
    pub retry: String,
    pub error: AppError,
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::error!("Page {} failed: {}", self.retry, self.error);
        } else {
            tracing::warn!("Page {} failed: {}", self.retry, self.error);
        }
        let ctx = PageContext::new(self.locale, strip_locale(&self.retry));
        (status, views::error::render(&ctx, &self.retry)).into_response()
    }
}

fn strip_locale(path: &str) -> String {
    Locale::strip_prefix(path)
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Attach page context to a fallible result, like `LogErr` does for status codes
pub trait OrErrorPage<T> {
    fn or_page(self, locale: Locale, retry: &str) -> Result<T, PageError>;
}

impl<T, E: Into<AppError>> OrErrorPage<T> for Result<T, E> {
    fn or_page(self, locale: Locale, retry: &str) -> Result<T, PageError> {
        self.map_err(|e| PageError {
            locale,
            retry: retry.to_string(),
            error: e.into(),
        })
    }
}

/// Last-resort boundary for panics inside handlers
pub fn panic_page(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    let locale = Locale::default();
    let ctx = PageContext::new(locale, "/");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        views::error::render(&ctx, &views::href(locale, "/")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backend_failure_renders_localized_page() {
        let result: Result<(), BackendError> = Err(BackendError::Api {
            status: 500,
            message: "boom".into(),
        });
        let resp = result
            .or_page(Locale::En, "/en/community")
            .unwrap_err()
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("Something went wrong"));
        assert!(page.contains(r#"href="/en/community">Try again"#));
    }

    #[test]
    fn panic_boundary_is_a_500_page() {
        let resp = panic_page(Box::new("kaboom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
