//! Moderation dashboard (/{locale}/admin/*)

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};

use super::auth::AuthUser;
use super::error::{OrErrorPage, PageError};
use crate::AppState;
use crate::domain::admins;
use crate::i18n::Locale;
use crate::moderation::{self, RejectOutcome};
use crate::services::session::AuthSession;
use crate::views::{self, Flash, NavUser, NoticeKind, PageContext};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{locale}/admin", get(dashboard))
        .route("/{locale}/admin/{id}/approve", post(approve))
        .route("/{locale}/admin/{id}/reject", post(reject))
}

/// `Ok(false)` sends the caller back to the home page
async fn require_admin(
    state: &AppState,
    locale: Locale,
    session: &AuthSession,
) -> Result<bool, PageError> {
    let is_admin = admins::is_admin(&state.db, session)
        .await
        .or_page(locale, &views::href(locale, "/admin"))?;
    if !is_admin {
        tracing::warn!("Non-admin {} tried to reach moderation", session.user_id);
    }
    Ok(is_admin)
}

fn back_to_dashboard(locale: Locale, flash: Flash) -> Response {
    let target = format!("{}?{}", views::href(locale, "/admin"), flash.query());
    Redirect::to(&target).into_response()
}

async fn render_dashboard(
    state: &AppState,
    locale: Locale,
    session: &AuthSession,
    flash: &Flash,
) -> Result<Html<String>, PageError> {
    let retry = views::href(locale, "/admin");
    let items = moderation::pending_queue(
        state.store.as_ref(),
        state.contributions.as_ref(),
        session,
    )
    .await
    .or_page(locale, &retry)?;

    // Only reached after the admin check, so the nav needs no second lookup
    let ctx = PageContext::new(locale, "/admin")
        .with_user(Some(NavUser::from_email(session.email.as_deref(), true)))
        .flash(flash);
    let email = session.email.as_deref().unwrap_or_default();
    Ok(views::admin::render(&ctx, email, &items))
}

/// GET /{locale}/admin
async fn dashboard(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Query(flash): Query<Flash>,
) -> Result<Response, PageError> {
    if !require_admin(&state, locale, &session).await? {
        return Ok(Redirect::to(&views::href(locale, "/")).into_response());
    }
    Ok(render_dashboard(&state, locale, &session, &flash)
        .await?
        .into_response())
}

/// Same row already being approved or rejected: 409 with the dashboard
async fn busy(state: &AppState, locale: Locale, session: &AuthSession) -> Response {
    let flash = Flash::new(NoticeKind::Warning, "Admin.busy");
    match render_dashboard(state, locale, session, &flash).await {
        Ok(page) => (StatusCode::CONFLICT, page).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /{locale}/admin/{id}/approve
async fn approve(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Path((_, id)): Path<(String, i64)>,
) -> Result<Response, PageError> {
    if !require_admin(&state, locale, &session).await? {
        return Ok(Redirect::to(&views::href(locale, "/")).into_response());
    }
    Ok(approve_row(&state, locale, &session, id).await)
}

async fn approve_row(state: &AppState, locale: Locale, session: &AuthSession, id: i64) -> Response {
    let Some(_guard) = state.row_locks.try_lock(id) else {
        return busy(state, locale, session).await;
    };

    let flash = match moderation::approve(state.contributions.as_ref(), session, id).await {
        Ok(()) => Flash::new(NoticeKind::Success, "Admin.approved"),
        Err(e) => {
            tracing::error!("Approve contribution {} error: {}", id, e);
            Flash::new(NoticeKind::Error, "Admin.action_error")
        }
    };
    back_to_dashboard(locale, flash)
}

/// POST /{locale}/admin/{id}/reject - Delete the video, then the row
async fn reject(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Path((_, id)): Path<(String, i64)>,
) -> Result<Response, PageError> {
    if !require_admin(&state, locale, &session).await? {
        return Ok(Redirect::to(&views::href(locale, "/")).into_response());
    }
    Ok(reject_row(&state, locale, &session, id).await)
}

async fn reject_row(state: &AppState, locale: Locale, session: &AuthSession, id: i64) -> Response {
    let Some(_guard) = state.row_locks.try_lock(id) else {
        return busy(state, locale, session).await;
    };

    let outcome = moderation::reject(
        state.store.as_ref(),
        state.contributions.as_ref(),
        session,
        id,
    )
    .await;

    let flash = match outcome {
        Ok(RejectOutcome::Removed {
            storage_warning: None,
        }) => Flash::new(NoticeKind::Success, "Admin.rejected"),
        Ok(RejectOutcome::Removed {
            storage_warning: Some(_),
        }) => Flash::new(NoticeKind::Warning, "Admin.storage_warning"),
        Ok(RejectOutcome::AlreadyGone) => {
            tracing::info!("Contribution {} was already gone", id);
            Flash::new(NoticeKind::Success, "Admin.rejected")
        }
        Err(e) => {
            tracing::error!("Reject contribution {} error: {}", id, e);
            Flash::new(NoticeKind::Error, "Admin.action_error")
        }
    };
    back_to_dashboard(locale, flash)
}

#[cfg(test)]
mod tests {
    use axum::http::header;

    use super::*;
    use crate::domain::contributions::memory::MemoryRepo;
    use crate::i18n;
    use crate::services::session::test_support::session;
    use crate::storage::memory::MemoryStore;

    fn state_with(repo: Arc<MemoryRepo>, store: Arc<MemoryStore>) -> AppState {
        let mut state = AppState::for_tests();
        state.contributions = repo;
        state.store = store;
        state
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn action_on_a_busy_row_is_refused_with_conflict() {
        let repo = Arc::new(MemoryRepo::default());
        repo.seed(9, "u/a.mp4", false, 1);
        let state = state_with(repo.clone(), Arc::new(MemoryStore::default()));
        let admin = session();

        let held = state.row_locks.try_lock(9).unwrap();

        let resp = approve_row(&state, Locale::It, &admin, 9).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let page = body_text(resp).await;
        assert!(page.contains(&views::escape(&i18n::t(Locale::It, "Admin.busy"))));
        assert!(!repo.get(9).unwrap().is_approved);

        let resp = reject_row(&state, Locale::It, &admin, 9).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(repo.get(9).is_some());

        // Once the first action finishes the row is free again
        drop(held);
        let resp = approve_row(&state, Locale::It, &admin, 9).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(
            resp.headers()[header::LOCATION]
                .to_str()
                .unwrap()
                .contains("notice=Admin.approved")
        );
        assert!(repo.get(9).unwrap().is_approved);
    }

    #[tokio::test]
    async fn reject_with_missing_video_warns() {
        let repo = Arc::new(MemoryRepo::default());
        repo.seed(3, "u/gone.mp4", false, 1);
        let state = state_with(repo.clone(), Arc::new(MemoryStore::default()));

        let resp = reject_row(&state, Locale::En, &session(), 3).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/en/admin?"));
        assert!(location.contains("notice=Admin.storage_warning"));
        assert!(repo.get(3).is_none());
    }
}
