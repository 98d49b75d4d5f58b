//! Sequential two-phase submission of a queue: store the video object, then
//! record the contribution row. A failed file is logged and skipped; the batch
//! only fails when nothing made it through.

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use super::queue::{QueuedFile, SubmissionQueue};
use crate::constants::FALLBACK_EXTENSION;
use crate::domain::contributions::ContributionRepo;
use crate::models::NewContribution;
use crate::services::session::AuthSession;
use crate::storage::VideoStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("no word selected")]
    NoWordSelected,
    #[error("the queue is empty")]
    EmptyQueue,
    #[error("consent was not given")]
    ConsentRequired,
    #[error("all {0} uploads failed")]
    AllUploadsFailed(usize),
}

impl SubmitError {
    /// Message catalog key shown to the user
    pub fn message_key(&self) -> &'static str {
        match self {
            SubmitError::NoWordSelected => "Contribute.alerts.select_word",
            SubmitError::EmptyQueue => "Contribute.alerts.empty_queue",
            SubmitError::ConsentRequired => "Contribute.alerts.accept_terms",
            SubmitError::AllUploadsFailed(_) => "Contribute.alerts.upload_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct SubmitReport {
    pub uploaded: usize,
    pub failed: Vec<FailedUpload>,
}

/// Upload every queued file for `word_id`, in order, one at a time.
///
/// Validation happens before any backend call. On at least one success the
/// queue is cleared, including files that failed; when every file fails the
/// queue is left as it was so the user can try again.
pub async fn submit(
    store: &dyn VideoStore,
    repo: &dyn ContributionRepo,
    session: &AuthSession,
    word_id: Option<i64>,
    queue: &mut SubmissionQueue,
    consent: bool,
) -> Result<SubmitReport, SubmitError> {
    let word_id = word_id.ok_or(SubmitError::NoWordSelected)?;
    if queue.is_empty() {
        return Err(SubmitError::EmptyQueue);
    }
    if !consent {
        return Err(SubmitError::ConsentRequired);
    }

    let mut report = SubmitReport::default();

    for file in queue.iter() {
        match upload_one(store, repo, session, word_id, file).await {
            Ok(path) => {
                tracing::info!("Stored contribution {} for word {}", path, word_id);
                report.uploaded += 1;
            }
            Err(reason) => {
                tracing::warn!("Upload of {} failed: {}", file.name, reason);
                report.failed.push(FailedUpload {
                    name: file.name.clone(),
                    reason,
                });
            }
        }
    }

    if report.uploaded == 0 {
        return Err(SubmitError::AllUploadsFailed(report.failed.len()));
    }

    queue.clear();
    Ok(report)
}

async fn upload_one(
    store: &dyn VideoStore,
    repo: &dyn ContributionRepo,
    session: &AuthSession,
    word_id: i64,
    file: &QueuedFile,
) -> Result<String, String> {
    let path = storage_key(
        session.user_id,
        Utc::now().timestamp_millis(),
        &random_suffix(),
        word_id,
        &file.name,
    );

    store
        .upload(session, &path, file.bytes.clone(), &file.content_type)
        .await
        .map_err(|e| format!("storage: {e}"))?;

    let row = NewContribution {
        user_id: session.user_id,
        word_id,
        video_url: path.clone(),
        is_approved: false,
    };

    if let Err(e) = repo.insert(session, &row).await {
        // The object has no row pointing at it; remove it so it is not orphaned.
        if let Err(cleanup) = store.remove(session, &path).await {
            tracing::error!("Failed to remove orphaned object {}: {}", path, cleanup);
        }
        return Err(format!("database: {e}"));
    }

    Ok(path)
}

/// `{user_id}/{unix_ms}_{suffix}_word{word_id}.{ext}`
pub fn storage_key(user_id: Uuid, unix_ms: i64, suffix: &str, word_id: i64, name: &str) -> String {
    format!(
        "{}/{}_{}_word{}.{}",
        user_id,
        unix_ms,
        suffix,
        word_id,
        extension_of(name)
    )
}

/// Text after the last dot, or the fallback when there is no usable one
pub fn extension_of(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext
        }
        _ => FALLBACK_EXTENSION,
    }
}

/// 7 random base36 characters
fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..7)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
