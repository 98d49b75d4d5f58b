//! Sign-in, sign-up, OAuth callback and logout endpoints (/auth/*)

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{FromRequestParts, OptionalFromRequestParts, Query, State},
    http::{StatusCode, header::SET_COOKIE, request::Parts},
    response::{
        IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::AppState;
use crate::constants::{AUTH_ERROR_PATH, DEFAULT_AFTER_LOGIN};
use crate::i18n::{self, Locale};
use crate::middleware::session_cookies;
use crate::services::auth::{Pkce, SignUpOutcome};
use crate::services::auth_events::{self, AuthEvent};
use crate::services::cookies::{self, config as cookie_config};
use crate::services::error::BackendError;
use crate::services::session::AuthSession;
use crate::views::{self, NoticeKind, PageContext};

pub fn routes() -> Router<Arc<AppState>> {
    // Burst of 10 requests per IP, then one more every 6 seconds
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(6) // seconds to replenish one token
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    let limited = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/oauth/google", get(oauth_google))
        .route("/auth/callback", get(callback))
        .layer(rate_limit_layer);

    Router::new()
        .merge(limited)
        .route("/auth/logout", post(logout))
        .route("/auth/events", get(events))
        .route("/auth/auth-code-error", get(code_error))
}

// ============================================================================
// Auth Extractor - session resolved by the session middleware
// ============================================================================

/// The signed-in user's session
pub struct AuthUser(pub AuthSession);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSession>()
            .cloned()
            .map(AuthUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Public pages render differently for signed-in users
impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthSession>().cloned().map(AuthUser))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_locale(raw: Option<&str>) -> Locale {
    raw.and_then(|l| l.parse().ok()).unwrap_or_default()
}

/// Same-site relative path, or `None` for anything that could leave the site
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn callback_url(state: &AppState, next: &str) -> String {
    let next = percent_encoding::utf8_percent_encode(next, percent_encoding::NON_ALPHANUMERIC);
    format!("{}/auth/callback?next={}", state.config.site_url, next)
}

/// Readable reason from a GoTrue error body
fn failure_reason(err: &BackendError) -> String {
    match err {
        BackendError::Api { message, .. } => serde_json::from_str::<serde_json::Value>(message)
            .ok()
            .and_then(|v| {
                ["msg", "error_description", "message"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(String::from))
            })
            .unwrap_or_else(|| message.clone()),
        other => other.to_string(),
    }
}

pub(crate) fn pending_signup_email(jar: &CookieJar) -> Option<String> {
    let raw = jar.get(cookie_config::PENDING_SIGNUP_NAME)?;
    percent_encoding::percent_decode_str(raw.value())
        .decode_utf8()
        .ok()
        .map(|e| e.into_owned())
        .filter(|e| !e.is_empty())
}

/// Only the browser that registered carries the pending-signup cookie, so a
/// plain login or OAuth callback never wakes a waiting register page.
fn signup_confirmed(jar: &CookieJar, token_email: Option<&str>) -> Option<AuthEvent> {
    let pending = pending_signup_email(jar)?;
    match token_email {
        Some(email) if !email.eq_ignore_ascii_case(&pending) => None,
        _ => Some(AuthEvent::SignedIn { email: pending }),
    }
}

// ============================================================================
// Password sign-in and sign-up
// ============================================================================

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    locale: Option<String>,
}

/// POST /auth/login - Email/password sign-in
async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    let locale = parse_locale(form.locale.as_deref());
    let default_next = views::href(locale, DEFAULT_AFTER_LOGIN);
    let next = safe_next(form.next.as_deref()).unwrap_or(&default_next);

    match state
        .auth
        .sign_in_with_password(form.email.trim(), &form.password)
        .await
    {
        Ok(tokens) => {
            tracing::info!("User {} signed in with password", tokens.user.id);
            let mut response = Redirect::to(next).into_response();
            for value in session_cookies(&state.config.cookies, &tokens) {
                response.headers_mut().append(SET_COOKIE, value);
            }
            response
        }
        Err(e) => {
            tracing::info!("Password sign-in failed: {}", e);
            let ctx = PageContext::new(locale, "/login")
                .notice(NoticeKind::Error, i18n::t(locale, "Auth.login_failed"));
            (StatusCode::UNAUTHORIZED, views::auth::login(&ctx, next)).into_response()
        }
    }
}

#[derive(Deserialize)]
struct RegisterForm {
    email: String,
    password: String,
    #[serde(default)]
    locale: Option<String>,
}

/// POST /auth/register - Sign up; usually ends on the waiting-for-confirmation screen
async fn register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, StatusCode> {
    let locale = parse_locale(form.locale.as_deref());
    let email = form.email.trim();
    let pkce = Pkce::generate();
    let redirect_to = callback_url(&state, &views::href(locale, DEFAULT_AFTER_LOGIN));

    match state
        .auth
        .sign_up(email, &form.password, &redirect_to, &pkce)
        .await
    {
        Ok(SignUpOutcome::SignedIn(tokens)) => {
            tracing::info!("User {} signed up", tokens.user.id);
            let mut response =
                Redirect::to(&views::href(locale, DEFAULT_AFTER_LOGIN)).into_response();
            for value in session_cookies(&state.config.cookies, &tokens) {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Ok(response)
        }
        Ok(SignUpOutcome::ConfirmationSent) => {
            tracing::info!("Confirmation email sent for a new sign-up");
            let settings = &state.config.cookies;
            let mut response = Redirect::to(&views::href(locale, "/register")).into_response();
            response.headers_mut().append(
                SET_COOKIE,
                cookies::build_verifier_cookie(settings, &pkce.verifier)?,
            );
            response.headers_mut().append(
                SET_COOKIE,
                cookies::build_pending_signup_cookie(settings, email)?,
            );
            Ok(response)
        }
        Err(e) => {
            tracing::warn!("Sign-up failed: {}", e);
            let reason = failure_reason(&e);
            let ctx = PageContext::new(locale, "/register").notice(
                NoticeKind::Error,
                i18n::tr(locale, "Auth.register_failed", &[("reason", &reason)]),
            );
            Ok((StatusCode::BAD_REQUEST, views::auth::register(&ctx, None)).into_response())
        }
    }
}

// ============================================================================
// OAuth and code exchange
// ============================================================================

#[derive(Deserialize)]
struct OAuthQuery {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    locale: Option<String>,
}

/// GET /auth/oauth/google - Start the Google flow with a fresh PKCE pair
async fn oauth_google(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthQuery>,
) -> Result<Response, StatusCode> {
    let locale = parse_locale(query.locale.as_deref());
    let default_next = views::href(locale, DEFAULT_AFTER_LOGIN);
    let next = safe_next(query.next.as_deref()).unwrap_or(&default_next);

    let pkce = Pkce::generate();
    let url = state
        .auth
        .google_authorize_url(&callback_url(&state, next), &pkce);

    let mut response = Redirect::to(&url).into_response();
    response.headers_mut().append(
        SET_COOKIE,
        cookies::build_verifier_cookie(&state.config.cookies, &pkce.verifier)?,
    );
    Ok(response)
}

#[derive(Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    next: Option<String>,
}

/// GET /auth/callback - Exchange the code from OAuth or an email confirmation link
async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let verifier = jar.get(cookie_config::CODE_VERIFIER_NAME).map(|c| c.value());
    let (Some(code), Some(verifier)) = (query.code.as_deref(), verifier) else {
        tracing::warn!("Auth callback without code or verifier");
        return Redirect::to(AUTH_ERROR_PATH).into_response();
    };

    let tokens = match state.auth.exchange_code(code, verifier).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("Code exchange failed: {}", e);
            return Redirect::to(AUTH_ERROR_PATH).into_response();
        }
    };

    if let Some(event) = signup_confirmed(&jar, tokens.user.email.as_deref()) {
        state.auth_events.publish(event);
    }

    let next = safe_next(query.next.as_deref()).unwrap_or(DEFAULT_AFTER_LOGIN);
    let mut response = Redirect::to(next).into_response();
    for value in session_cookies(&state.config.cookies, &tokens) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response.headers_mut().append(
        SET_COOKIE,
        cookies::build_clear_cookie(cookie_config::CODE_VERIFIER_NAME),
    );
    if jar.get(cookie_config::PENDING_SIGNUP_NAME).is_some() {
        response.headers_mut().append(
            SET_COOKIE,
            cookies::build_clear_cookie(cookie_config::PENDING_SIGNUP_NAME),
        );
    }
    response
}

#[derive(Deserialize)]
struct LocaleQuery {
    #[serde(default)]
    locale: Option<String>,
}

/// GET /auth/auth-code-error
async fn code_error(Query(query): Query<LocaleQuery>) -> impl IntoResponse {
    let ctx = PageContext::new(parse_locale(query.locale.as_deref()), "/");
    (StatusCode::BAD_REQUEST, views::auth::code_error(&ctx))
}

/// GET /auth/events - Waits for the pending sign-up of this browser to be confirmed
async fn events(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(email) = pending_signup_email(&jar) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let rx = state.auth_events.subscribe();

    let stream = futures::stream::unfold(Some((rx, email)), |pending| async move {
        let (mut rx, email) = pending?;
        loop {
            match rx.recv().await {
                Ok(event) if auth_events::is_for(&event, &email) => {
                    let event = Event::default().event("signed_in").data("ok");
                    return Some((Ok::<_, Infallible>(event), None));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Auth event stream lagged by {}", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ============================================================================
// Logout
// ============================================================================

/// POST /auth/logout - Revoke the session and drop per-user state
async fn logout(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Form(form): Form<LocaleQuery>,
) -> Response {
    if let Some(AuthUser(session)) = user {
        if let Err(e) = state.auth.logout(&session.access_token).await {
            // Log but don't fail logout - cookies are cleared either way
            tracing::warn!("Failed to revoke session during logout: {}", e);
        }
        state.recorders.release(session.user_id);
        state.queues.drop_user(session.user_id);
    }

    let locale = parse_locale(form.locale.as_deref());
    let mut response = Redirect::to(&views::href(locale, "/")).into_response();
    for value in cookies::build_clear_session_cookies() {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}
