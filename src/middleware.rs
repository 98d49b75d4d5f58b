//! Request pipeline shared by every route: locale prefixing, session
//! resolution from cookies (with transparent refresh) and route protection.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::config::CookieSettings;
use crate::i18n::Locale;
use crate::services::auth::TokenResponse;
use crate::services::cookies::{self, config as cookie_config};
use crate::services::error::BackendError;
use crate::services::session::{self, AuthSession, SessionError};

/// Paths that never carry a locale prefix
const UNLOCALIZED_PREFIXES: [&str; 4] = ["/auth", "/static", "/health", "/favicon.ico"];

/// Locale-relative pages anyone can see
const PUBLIC_PAGES: [&str; 5] = ["/", "/login", "/register", "/community", "/progetto"];

fn has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

fn is_unlocalized(path: &str) -> bool {
    UNLOCALIZED_PREFIXES.iter().any(|p| has_prefix(path, p))
}

/// Whether `path` can be served without a session
pub fn is_public_path(path: &str) -> bool {
    if is_unlocalized(path) {
        return true;
    }
    match Locale::strip_prefix(path) {
        Some((_, rest)) => {
            let rest = rest.trim_end_matches('/');
            PUBLIC_PAGES.contains(&if rest.is_empty() { "/" } else { rest })
        }
        None => PUBLIC_PAGES.contains(&path),
    }
}

/// Redirect target for a page path missing its locale, e.g.
/// `/contribuisci?tab=webcam` -> `/it/contribuisci?tab=webcam`
pub fn localized_redirect(path: &str, query: Option<&str>) -> Option<String> {
    if is_unlocalized(path) || Locale::strip_prefix(path).is_some() {
        return None;
    }
    let locale = Locale::default();
    let mut target = crate::views::href(locale, path);
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(q);
    }
    Some(target)
}

/// `/{locale}/login?next={path}`; locale is `en` for `/en` paths, else `it`
pub fn login_redirect(path: &str) -> String {
    let locale = Locale::from_path(path);
    let next = percent_encoding::utf8_percent_encode(path, NEXT_ENCODE_SET);
    format!("/{locale}/login?next={next}")
}

/// Keep `/` readable in `next`
const NEXT_ENCODE_SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

enum Resolved {
    Anonymous,
    Active(AuthSession),
    /// Access token was refreshed; the new tokens go back as cookies
    Refreshed(AuthSession, TokenResponse),
    /// Cookies present but unusable; they are cleared
    Stale,
}

async fn validate(state: &AppState, token: &str) -> Result<AuthSession, SessionError> {
    match &state.config.supabase_jwt_secret {
        Some(secret) => session::validate_access_token(token, secret.as_bytes()),
        None => match state.auth.get_user(token).await {
            Ok(user) => Ok(AuthSession {
                user_id: user.id,
                email: user.email,
                access_token: token.to_string(),
            }),
            Err(BackendError::Unauthorized) => Err(SessionError::Expired),
            Err(e) => {
                tracing::error!("Get user error: {}", e);
                Err(SessionError::InvalidToken)
            }
        },
    }
}

async fn resolve(state: &AppState, jar: &CookieJar) -> Resolved {
    let access = jar.get(cookie_config::ACCESS_TOKEN_NAME).map(|c| c.value());
    let refresh = jar.get(cookie_config::REFRESH_TOKEN_NAME).map(|c| c.value());

    if let Some(token) = access {
        match validate(state, token).await {
            Ok(session) => return Resolved::Active(session),
            Err(e) => tracing::debug!("Access token rejected: {}", e),
        }
    }

    let Some(refresh) = refresh else {
        return if access.is_some() {
            Resolved::Stale
        } else {
            Resolved::Anonymous
        };
    };

    match state.auth.refresh(refresh).await {
        Ok(tokens) => {
            let session = AuthSession {
                user_id: tokens.user.id,
                email: tokens.user.email.clone(),
                access_token: tokens.access_token.clone(),
            };
            tracing::debug!("Refreshed session for {}", session.user_id);
            Resolved::Refreshed(session, tokens)
        }
        Err(e) => {
            tracing::info!("Session refresh failed: {}", e);
            Resolved::Stale
        }
    }
}

/// Set-Cookie values for a fresh token pair
pub(crate) fn session_cookies(
    settings: &CookieSettings,
    tokens: &TokenResponse,
) -> Vec<HeaderValue> {
    [
        cookies::build_access_cookie(settings, &tokens.access_token, tokens.expires_in),
        cookies::build_refresh_cookie(settings, &tokens.refresh_token),
    ]
    .into_iter()
    .filter_map(Result::ok)
    .collect()
}

pub async fn session_layer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    if let Some(target) = localized_redirect(&path, req.uri().query()) {
        return Redirect::temporary(&target).into_response();
    }

    let (session, set_cookies) = match resolve(&state, &jar).await {
        Resolved::Anonymous => (None, Vec::new()),
        Resolved::Active(session) => (Some(session), Vec::new()),
        Resolved::Refreshed(session, tokens) => {
            let set = session_cookies(&state.config.cookies, &tokens);
            (Some(session), set)
        }
        Resolved::Stale => (None, cookies::build_clear_session_cookies().to_vec()),
    };

    let mut response = if session.is_none() && !is_public_path(&path) {
        Redirect::to(&login_redirect(&path)).into_response()
    } else {
        if let Some(session) = session {
            req.extensions_mut().insert(session);
        }
        req.extensions_mut().insert(Locale::from_path(&path));
        next.run(req).await
    };

    for value in set_cookies {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Locale of the current request
impl<S: Send + Sync> FromRequestParts<S> for Locale {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Locale>()
            .copied()
            .unwrap_or_else(|| Locale::from_path(parts.uri.path())))
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, http::header, routing::get};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::routes::auth::AuthUser;
    use crate::services::session::test_support::token_for;

    async fn whoami(AuthUser(session): AuthUser) -> String {
        session.user_id.to_string()
    }

    fn app() -> Router {
        let state = Arc::new(AppState::for_tests());
        Router::new()
            .route("/it/contribuisci", get(whoami))
            .route("/en/admin", get(whoami))
            .route("/it/community", get(|| async { "public" }))
            .route("/health", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                session_layer,
            ))
            .with_state(state)
    }

    async fn get_path(uri: &str, cookie: Option<String>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        app().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers()[header::LOCATION].to_str().unwrap()
    }

    #[test]
    fn public_paths() {
        for p in [
            "/it", "/en/", "/it/login", "/en/register", "/it/community", "/en/progetto",
            "/auth/callback", "/static/recorder.js", "/health", "/favicon.ico",
        ] {
            assert!(is_public_path(p), "{p} should be public");
        }
        for p in ["/it/contribuisci", "/en/admin", "/it/admin/3/approve", "/authx"] {
            assert!(!is_public_path(p), "{p} should be protected");
        }
    }

    #[test]
    fn locale_prefix_redirects() {
        assert_eq!(
            localized_redirect("/contribuisci", Some("tab=webcam")).as_deref(),
            Some("/it/contribuisci?tab=webcam")
        );
        assert_eq!(localized_redirect("/", None).as_deref(), Some("/it"));
        assert_eq!(localized_redirect("/en/community", None), None);
        assert_eq!(localized_redirect("/auth/callback", Some("code=x")), None);
    }

    #[tokio::test]
    async fn anonymous_contribute_goes_to_login() {
        let resp = get_path("/it/contribuisci", None).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/it/login?next=/it/contribuisci");

        let resp = get_path("/en/admin", None).await;
        assert_eq!(location(&resp), "/en/login?next=/en/admin");
    }

    #[tokio::test]
    async fn public_pages_pass_through() {
        let resp = get_path("/it/community", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = get_path("/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unprefixed_page_is_localized() {
        let resp = get_path("/community?x=1", None).await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&resp), "/it/community?x=1");
    }

    #[tokio::test]
    async fn valid_cookie_reaches_handler() {
        let user = Uuid::new_v4();
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = token_for(user, "test-secret", exp);
        let resp = get_path(
            "/it/contribuisci",
            Some(format!("{}={}", cookie_config::ACCESS_TOKEN_NAME, token)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(body, user.to_string());
    }

    #[tokio::test]
    async fn forged_cookie_is_cleared() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = token_for(Uuid::new_v4(), "other-secret", exp);
        let resp = get_path(
            "/it/contribuisci",
            Some(format!("{}={}", cookie_config::ACCESS_TOKEN_NAME, token)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cleared: Vec<_> = resp.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cleared.len(), 2);
        assert!(cleared[0].to_str().unwrap().contains("Max-Age=0"));
    }
}
