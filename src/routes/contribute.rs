//! Contribute page, submission queue and webcam recorder endpoints
//! (/{locale}/contribuisci/*)

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{
        Html, IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::error::{OrErrorPage, PageError};
use super::pages::page_context;
use crate::AppState;
use crate::constants::MAX_QUEUED_FILES;
use crate::domain::words;
use crate::i18n::{self, Locale};
use crate::recorder::{CameraReport, CaptureCommand, HubError, RecorderView};
use crate::recorder::state::ClipInfo;
use crate::services::error::LogErr;
use crate::services::rate_limit::{SUBMIT_RATE_LIMITER, UPLOAD_RATE_LIMITER};
use crate::services::session::AuthSession;
use crate::upload::{self, QueuedFile};
use crate::views::contribute::{ContributeForm, Tab};
use crate::views::{self, Flash, NoticeKind};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{locale}/contribuisci", get(contribute_page))
        .route("/{locale}/contribuisci/queue", post(add_to_queue))
        .route("/{locale}/contribuisci/queue/clear", post(clear_queue))
        .route("/{locale}/contribuisci/queue/{index}/remove", post(remove_from_queue))
        .route("/{locale}/contribuisci/submit", post(submit))
        .route("/{locale}/contribuisci/recorder/attach", post(recorder_attach))
        .route("/{locale}/contribuisci/recorder/start", post(recorder_start))
        .route("/{locale}/contribuisci/recorder/stop", post(recorder_stop))
        .route("/{locale}/contribuisci/recorder/clip", post(recorder_clip))
        .route("/{locale}/contribuisci/recorder/accept", post(recorder_accept))
        .route("/{locale}/contribuisci/recorder/retry", post(recorder_retry))
        .route("/{locale}/contribuisci/recorder/discard", post(recorder_discard))
        .route("/{locale}/contribuisci/recorder/lost", post(recorder_lost))
        .route("/{locale}/contribuisci/recorder/release", post(recorder_release))
        .route("/{locale}/contribuisci/recorder/events", get(recorder_events))
}

/// Hidden form fields carry the word as text; an empty value means no word
fn parse_word(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim)
        .filter(|w| !w.is_empty())
        .and_then(|w| w.parse().ok())
}

/// Back to the contribute page, keeping tab and word, with an optional notice
fn back_to_page(locale: Locale, tab: Tab, word: Option<i64>, flash: Option<Flash>) -> Response {
    let mut target = views::href(locale, "/contribuisci");
    target.push_str(match tab {
        Tab::Upload => "?tab=upload",
        Tab::Webcam => "?tab=webcam",
    });
    if let Some(word) = word {
        target.push_str(&format!("&word={word}"));
    }
    if let Some(flash) = flash {
        target.push('&');
        target.push_str(&flash.query());
    }
    Redirect::to(&target).into_response()
}

// ============================================================================
// Page
// ============================================================================

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    tab: Option<Tab>,
    #[serde(default)]
    word: Option<String>,
}

/// GET /{locale}/contribuisci
async fn contribute_page(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Query(query): Query<PageQuery>,
    Query(flash): Query<Flash>,
) -> Result<Html<String>, PageError> {
    let retry = views::href(locale, "/contribuisci");
    let words = words::list_words(&state.db, &session)
        .await
        .or_page(locale, &retry)?;
    let queue = state.queues.snapshot(session.user_id);

    let mut ctx = page_context(&state, locale, "/contribuisci", Some(&session))
        .await
        .flash(&flash);
    if let Some(failed) = flash.failed.filter(|f| *f > 0) {
        ctx = ctx.notice(
            NoticeKind::Warning,
            i18n::tr(
                locale,
                "Contribute.alerts.partial",
                &[("failed", &failed.to_string())],
            ),
        );
    }

    Ok(views::contribute::render(
        &ctx,
        &ContributeForm {
            words: &words,
            selected_word: parse_word(query.word.as_deref()),
            tab: query.tab.unwrap_or_default(),
            queue: &queue,
        },
    ))
}

// ============================================================================
// Queue
// ============================================================================

/// POST /{locale}/contribuisci/queue - Add picked files to the queue
async fn add_to_queue(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    mut multipart: Multipart,
) -> Response {
    if !UPLOAD_RATE_LIMITER.check(session.user_id) {
        let flash = Flash::new(NoticeKind::Error, "Contribute.alerts.rate_limited");
        return back_to_page(locale, Tab::Upload, None, Some(flash));
    }

    let mut word = None;
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Queue upload rejected for {}: {}", session.user_id, e);
                let flash = Flash::new(NoticeKind::Error, "Contribute.alerts.too_large");
                return back_to_page(locale, Tab::Upload, word, Some(flash));
            }
        };

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("word") => match field.text().await {
                Ok(text) => word = parse_word(Some(&text)),
                Err(e) => {
                    tracing::warn!("Failed to read word field: {}", e);
                    let flash = Flash::new(NoticeKind::Error, "Contribute.alerts.too_large");
                    return back_to_page(locale, Tab::Upload, word, Some(flash));
                }
            },
            Some("videos") => {
                let name = field.file_name().unwrap_or("video").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("video/") {
                    tracing::debug!("Skipping {} ({}): not a video", name, content_type);
                    continue;
                }
                match field.bytes().await {
                    // Browsers send an empty part when no file is chosen
                    Ok(bytes) if bytes.is_empty() => continue,
                    Ok(bytes) => files.push(QueuedFile::new(name, content_type, bytes)),
                    Err(e) => {
                        tracing::warn!("Failed to read {}: {}", name, e);
                        let flash = Flash::new(NoticeKind::Error, "Contribute.alerts.too_large");
                        return back_to_page(locale, Tab::Upload, word, Some(flash));
                    }
                }
            }
            _ => {}
        }
    }

    let added = files.len();
    let total = match state.queues.try_append_all(session.user_id, files) {
        Ok(total) => total,
        Err(e) => {
            tracing::info!("Queue upload refused for {}: {}", session.user_id, e);
            let flash =
                Flash::new(NoticeKind::Error, "Contribute.alerts.queue_full").count(MAX_QUEUED_FILES);
            return back_to_page(locale, Tab::Upload, word, Some(flash));
        }
    };
    tracing::info!(
        "Queued {} files for {} ({} pending)",
        added,
        session.user_id,
        total
    );

    back_to_page(locale, Tab::Upload, word, None)
}

#[derive(Deserialize)]
struct QueueForm {
    #[serde(default)]
    word: Option<String>,
}

/// POST /{locale}/contribuisci/queue/{index}/remove
async fn remove_from_queue(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Path((_, index)): Path<(String, usize)>,
    Form(form): Form<QueueForm>,
) -> Response {
    if let Some(file) = state.queues.with(session.user_id, |q| q.remove(index)) {
        tracing::debug!("Removed {} from the queue of {}", file.name, session.user_id);
    }
    back_to_page(locale, Tab::Upload, parse_word(form.word.as_deref()), None)
}

/// POST /{locale}/contribuisci/queue/clear
async fn clear_queue(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Form(form): Form<QueueForm>,
) -> Response {
    state.queues.with(session.user_id, |q| q.clear());
    back_to_page(locale, Tab::Upload, parse_word(form.word.as_deref()), None)
}

// ============================================================================
// Submit
// ============================================================================

#[derive(Deserialize)]
struct SubmitForm {
    #[serde(default)]
    word_id: Option<String>,
    #[serde(default)]
    consent: Option<String>,
}

/// POST /{locale}/contribuisci/submit - Upload the whole queue for one word
async fn submit(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    Form(form): Form<SubmitForm>,
) -> Response {
    let word_id = parse_word(form.word_id.as_deref());

    if !SUBMIT_RATE_LIMITER.check(session.user_id) {
        let flash = Flash::new(NoticeKind::Error, "Contribute.alerts.rate_limited");
        return back_to_page(locale, Tab::Upload, word_id, Some(flash));
    }

    let consent = form.consent.is_some_and(|c| !c.is_empty());

    // Taken out so files queued from the webcam meanwhile are not lost or sent twice
    let mut queue = state.queues.take(session.user_id);
    let result = upload::submit(
        state.store.as_ref(),
        state.contributions.as_ref(),
        &session,
        word_id,
        &mut queue,
        consent,
    )
    .await;
    state.queues.restore(session.user_id, queue);

    let flash = match result {
        Ok(report) => {
            tracing::info!(
                "User {} submitted {} videos ({} failed)",
                session.user_id,
                report.uploaded,
                report.failed.len()
            );
            Flash::new(NoticeKind::Success, "Contribute.alerts.success")
                .count(report.uploaded)
                .failed(report.failed.len())
        }
        Err(e) => {
            tracing::info!("Submission refused for {}: {}", session.user_id, e);
            Flash::new(NoticeKind::Error, e.message_key())
        }
    };
    back_to_page(locale, Tab::Upload, word_id, Some(flash))
}

// ============================================================================
// Webcam recorder
// ============================================================================

fn hub_status(err: HubError) -> StatusCode {
    match err {
        HubError::NoRecorder => StatusCode::NOT_FOUND,
        HubError::Transition(e) => {
            tracing::debug!("Recorder transition refused: {}", e);
            StatusCode::CONFLICT
        }
    }
}

/// POST .../recorder/attach - The browser reports the outcome of getUserMedia
async fn recorder_attach(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Json(report): Json<CameraReport>,
) -> Json<RecorderView> {
    Json(state.recorders.attach(session.user_id, &report))
}

/// POST .../recorder/start - Begin the countdown
async fn recorder_start(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> Result<Json<RecorderView>, StatusCode> {
    state
        .recorders
        .start(session.user_id)
        .map(Json)
        .map_err(hub_status)
}

#[derive(Serialize)]
struct StopResponse {
    command: CaptureCommand,
    view: Option<RecorderView>,
}

/// POST .../recorder/stop - Stop recording; the browser then uploads the clip
async fn recorder_stop(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> Result<Json<StopResponse>, StatusCode> {
    let command = state.recorders.stop(session.user_id).map_err(hub_status)?;
    Ok(Json(StopResponse {
        command,
        view: state.recorders.view(session.user_id),
    }))
}

/// Refuse a clip and put the recorder back on the live preview with `reason`
fn refuse_clip(state: &AppState, session: &AuthSession, status: StatusCode, reason: String) -> Response {
    if let Err(e) = state.recorders.clip_failed(session.user_id, &reason) {
        tracing::debug!("Recorder of {} not waiting for a clip: {}", session.user_id, e);
    }
    (status, Json(ClipRefused { error: reason })).into_response()
}

#[derive(Serialize)]
struct ClipRefused {
    error: String,
}

/// POST .../recorder/clip - Encoded recording; lands in the submission queue
async fn recorder_clip(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    AuthUser(session): AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ClipInfo>, Response> {
    if !UPLOAD_RATE_LIMITER.check(session.user_id) {
        let reason = i18n::t(locale, "Contribute.alerts.rate_limited");
        return Err(refuse_clip(&state, &session, StatusCode::TOO_MANY_REQUESTS, reason));
    }
    if !state.queues.has_room(session.user_id, 1, body.len()) {
        let reason = i18n::tr(
            locale,
            "Contribute.alerts.queue_full",
            &[("count", &MAX_QUEUED_FILES.to_string())],
        );
        return Err(refuse_clip(&state, &session, StatusCode::PAYLOAD_TOO_LARGE, reason));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/webm");
    if !content_type.starts_with("video/") {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response());
    }
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST.into_response());
    }

    state
        .recorders
        .submit_clip(session.user_id, body, content_type)
        .map(Json)
        .map_err(|e| hub_status(e).into_response())
}

#[derive(Deserialize)]
struct DiscardRequest {
    #[serde(default)]
    reason: String,
}

/// POST .../recorder/discard - The clip never reached the server
async fn recorder_discard(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Json(req): Json<DiscardRequest>,
) -> Result<Json<RecorderView>, StatusCode> {
    state
        .recorders
        .clip_failed(session.user_id, &req.reason)
        .map(Json)
        .map_err(hub_status)
}

/// POST .../recorder/accept
async fn recorder_accept(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> Result<Json<RecorderView>, StatusCode> {
    state
        .recorders
        .accept(session.user_id)
        .map(Json)
        .map_err(hub_status)
}

/// POST .../recorder/retry - Back to the live preview
async fn recorder_retry(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> Result<Json<RecorderView>, StatusCode> {
    state
        .recorders
        .retry(session.user_id)
        .map(Json)
        .map_err(hub_status)
}

#[derive(Deserialize)]
struct LostRequest {
    #[serde(default)]
    reason: String,
}

/// POST .../recorder/lost - The camera track ended unexpectedly
async fn recorder_lost(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Json(req): Json<LostRequest>,
) -> Result<Json<RecorderView>, StatusCode> {
    state
        .recorders
        .device_lost(session.user_id, &req.reason)
        .map(Json)
        .log_status("Recorder device lost", StatusCode::NOT_FOUND)
}

/// POST .../recorder/release - The page is going away
async fn recorder_release(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> StatusCode {
    state.recorders.release(session.user_id);
    StatusCode::NO_CONTENT
}

/// GET .../recorder/events - Recorder view updates as server-sent events
async fn recorder_events(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> Result<Response, StatusCode> {
    let rx = state
        .recorders
        .subscribe(session.user_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    // The current view first, then every change until the recorder is dropped
    let stream = futures::stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let view = rx.borrow_and_update().clone();
        let event = Event::default()
            .event("view")
            .json_data(&view)
            .unwrap_or_else(|_| Event::default().event("view"));
        Some((Ok::<_, Infallible>(event), (rx, false)))
    });

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}
