//! Cookie building utilities for session management
//!
//! Centralizes cookie formatting for the Supabase session tokens, the PKCE
//! verifier used by the OAuth round trip, and the pending sign-up marker.

use axum::http::{HeaderValue, StatusCode};

use crate::config::CookieSettings;

/// Cookie configuration constants
pub mod config {
    /// Access token cookie name
    pub const ACCESS_TOKEN_NAME: &str = "sb-access-token";
    /// Refresh token cookie name
    pub const REFRESH_TOKEN_NAME: &str = "sb-refresh-token";
    /// PKCE code verifier cookie name
    pub const CODE_VERIFIER_NAME: &str = "ihu-code-verifier";
    /// Email of a sign-up still waiting for confirmation
    pub const PENDING_SIGNUP_NAME: &str = "ihu-pending-signup";
    /// Refresh token max-age in seconds (30 days)
    pub const REFRESH_TOKEN_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;
    /// Verifier lives long enough to finish an OAuth or email round trip (1 hour)
    pub const CODE_VERIFIER_MAX_AGE_SECS: i64 = 60 * 60;
    /// Pending sign-up marker (1 day)
    pub const PENDING_SIGNUP_MAX_AGE_SECS: i64 = 24 * 60 * 60;
    pub const COOKIE_PATH: &str = "/";
}

fn build(
    settings: &CookieSettings,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, StatusCode> {
    let secure = if settings.secure { " Secure;" } else { "" };
    let cookie = format!(
        "{}={}; HttpOnly;{} SameSite={}; Path={}; Max-Age={}",
        name,
        value,
        secure,
        settings.same_site,
        config::COOKIE_PATH,
        max_age
    );
    cookie.parse().map_err(|_| {
        tracing::error!("Failed to parse {} cookie header", name);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Build an access token Set-Cookie header value.
/// `expires_in` comes from the token response so the cookie dies with the JWT.
pub fn build_access_cookie(
    settings: &CookieSettings,
    token: &str,
    expires_in: i64,
) -> Result<HeaderValue, StatusCode> {
    build(settings, config::ACCESS_TOKEN_NAME, token, expires_in.max(0))
}

/// Build a refresh token Set-Cookie header value
pub fn build_refresh_cookie(
    settings: &CookieSettings,
    token: &str,
) -> Result<HeaderValue, StatusCode> {
    build(
        settings,
        config::REFRESH_TOKEN_NAME,
        token,
        config::REFRESH_TOKEN_MAX_AGE_SECS,
    )
}

pub fn build_verifier_cookie(
    settings: &CookieSettings,
    verifier: &str,
) -> Result<HeaderValue, StatusCode> {
    build(
        settings,
        config::CODE_VERIFIER_NAME,
        verifier,
        config::CODE_VERIFIER_MAX_AGE_SECS,
    )
}

pub fn build_pending_signup_cookie(
    settings: &CookieSettings,
    email: &str,
) -> Result<HeaderValue, StatusCode> {
    let encoded =
        percent_encoding::utf8_percent_encode(email, percent_encoding::NON_ALPHANUMERIC)
            .to_string();
    build(
        settings,
        config::PENDING_SIGNUP_NAME,
        &encoded,
        config::PENDING_SIGNUP_MAX_AGE_SECS,
    )
}

/// Build a Set-Cookie header that expires the named cookie
pub fn build_clear_cookie(name: &str) -> HeaderValue {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path={}; Max-Age=0",
        name,
        config::COOKIE_PATH
    )
    .parse()
    .expect("static cookie string should always parse")
}

/// Clear both session cookies
pub fn build_clear_session_cookies() -> [HeaderValue; 2] {
    [
        build_clear_cookie(config::ACCESS_TOKEN_NAME),
        build_clear_cookie(config::REFRESH_TOKEN_NAME),
    ]
}
