//! Public pages: home, project, community, login and register

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::auth::{AuthUser, pending_signup_email, safe_next};
use super::error::{OrErrorPage, PageError};
use crate::AppState;
use crate::constants::DEFAULT_AFTER_LOGIN;
use crate::domain::{admins, profiles};
use crate::i18n::Locale;
use crate::services::session::AuthSession;
use crate::views::{self, Flash, NavUser, PageContext};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{locale}", get(home))
        .route("/{locale}/progetto", get(project))
        .route("/{locale}/community", get(community))
        .route("/{locale}/login", get(login))
        .route("/{locale}/register", get(register))
}

/// Page context with the navbar user resolved; a failed admin lookup only
/// hides the admin link.
pub(crate) async fn page_context(
    state: &AppState,
    locale: Locale,
    path: &str,
    session: Option<&AuthSession>,
) -> PageContext {
    let user = match session {
        Some(session) => {
            let is_admin = admins::is_admin(&state.db, session)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Admin lookup failed for {}: {}", session.user_id, e);
                    false
                });
            Some(NavUser::from_email(session.email.as_deref(), is_admin))
        }
        None => None,
    };
    PageContext::new(locale, path).with_user(user)
}

/// GET /{locale}
async fn home(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    user: Option<AuthUser>,
) -> Html<String> {
    let session = user.map(|AuthUser(s)| s);
    let ctx = page_context(&state, locale, "/", session.as_ref()).await;

    // Stats are decorative here; zeros beat an error page
    let stats = profiles::community_stats(&state.db)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Home stats error: {}", e);
            Default::default()
        });

    views::home::render(&ctx, stats)
}

/// GET /{locale}/progetto
async fn project(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    user: Option<AuthUser>,
) -> Html<String> {
    let session = user.map(|AuthUser(s)| s);
    let ctx = page_context(&state, locale, "/progetto", session.as_ref()).await;
    views::project::render(&ctx)
}

/// GET /{locale}/community
async fn community(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    user: Option<AuthUser>,
) -> Result<Html<String>, PageError> {
    let session = user.map(|AuthUser(s)| s);
    let retry = views::href(locale, "/community");

    let (stats, leaders) = futures::try_join!(
        profiles::community_stats(&state.db),
        profiles::leaderboard(&state.db)
    )
    .or_page(locale, &retry)?;

    let ctx = page_context(&state, locale, "/community", session.as_ref()).await;
    Ok(views::community::render(&ctx, stats, &leaders))
}

#[derive(Deserialize)]
struct LoginQuery {
    #[serde(default)]
    next: Option<String>,
}

/// GET /{locale}/login - signed-in users go straight to the contribute page
async fn login(
    locale: Locale,
    user: Option<AuthUser>,
    Query(query): Query<LoginQuery>,
    Query(flash): Query<Flash>,
) -> Response {
    let default_next = views::href(locale, DEFAULT_AFTER_LOGIN);
    let next = safe_next(query.next.as_deref()).unwrap_or(&default_next);

    if user.is_some() {
        return Redirect::to(next).into_response();
    }

    let ctx = PageContext::new(locale, "/login").flash(&flash);
    views::auth::login(&ctx, next).into_response()
}

/// GET /{locale}/register - shows the waiting screen while a sign-up is pending
async fn register(locale: Locale, user: Option<AuthUser>, jar: CookieJar) -> Response {
    if user.is_some() {
        return Redirect::to(&views::href(locale, DEFAULT_AFTER_LOGIN)).into_response();
    }

    let pending = pending_signup_email(&jar);
    let ctx = PageContext::new(locale, "/register");
    views::auth::register(&ctx, pending.as_deref()).into_response()
}
