//! Admin review of submitted videos.
//!
//! Rejection removes the storage object before the row so the path is never
//! lost; a failed object removal is reported but does not keep the row.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;

use crate::constants::SIGNED_URL_EXPIRY_SECS;
use crate::domain::contributions::ContributionRepo;
use crate::models::PendingContribution;
use crate::services::error::BackendError;
use crate::services::session::AuthSession;
use crate::storage::VideoStore;

/// Rows with an approve or reject in flight
#[derive(Default)]
pub struct RowLocks {
    inflight: Mutex<HashSet<i64>>,
}

/// Held for the duration of one action on one row
pub struct RowGuard<'a> {
    locks: &'a RowLocks,
    id: i64,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another action on the same row is still running
    pub fn try_lock(&self, id: i64) -> Option<RowGuard<'_>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight.insert(id) {
            Some(RowGuard { locks: self, id })
        } else {
            None
        }
    }
}

impl Drop for RowGuard<'_> {
    fn drop(&mut self) {
        self.locks
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Every unapproved contribution, newest first, each with a playback URL
/// signed just now.
pub async fn pending_queue(
    store: &dyn VideoStore,
    repo: &dyn ContributionRepo,
    session: &AuthSession,
) -> Result<Vec<PendingContribution>, BackendError> {
    let rows = repo.pending(session).await?;

    let signed = join_all(
        rows.iter()
            .map(|row| store.signed_url(session, &row.video_url, SIGNED_URL_EXPIRY_SECS)),
    )
    .await;

    Ok(rows
        .into_iter()
        .zip(signed)
        .map(|(row, url)| {
            let signed_url = match url {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::error!("Failed to sign {}: {}", row.video_url, e);
                    None
                }
            };
            PendingContribution {
                id: row.id,
                word: row.words.map(|w| w.text).unwrap_or_default(),
                video_path: row.video_url,
                created_at: row.created_at,
                signed_url,
            }
        })
        .collect())
}

pub async fn approve(
    repo: &dyn ContributionRepo,
    session: &AuthSession,
    id: i64,
) -> Result<(), BackendError> {
    repo.approve(session, id).await?;
    tracing::info!("Contribution {} approved", id);
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum RejectOutcome {
    /// Row deleted; `storage_warning` is set when the object could not be removed
    Removed { storage_warning: Option<String> },
    /// No such row
    AlreadyGone,
}

/// Delete the video object, then the row. Whenever this returns `Ok` the row
/// no longer exists.
pub async fn reject(
    store: &dyn VideoStore,
    repo: &dyn ContributionRepo,
    session: &AuthSession,
    id: i64,
) -> Result<RejectOutcome, BackendError> {
    let Some(path) = repo.video_path(session, id).await? else {
        return Ok(RejectOutcome::AlreadyGone);
    };

    let storage_warning = match store.remove(session, &path).await {
        Ok(()) => None,
        Err(e) if e.is_not_found() => {
            tracing::info!("Video {} of contribution {} was already missing", path, id);
            Some(e.to_string())
        }
        Err(e) => {
            tracing::warn!(
                "Could not remove {} for contribution {}, deleting row anyway: {}",
                path,
                id,
                e
            );
            Some(e.to_string())
        }
    };

    repo.delete(session, id).await?;
    tracing::info!("Contribution {} rejected", id);
    Ok(RejectOutcome::Removed { storage_warning })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contributions::memory::MemoryRepo;
    use crate::services::session::test_support::session;
    use crate::storage::memory::MemoryStore;

    #[tokio::test]
    async fn queue_is_newest_first_and_survives_signing_failure() {
        let store = MemoryStore::default();
        let repo = MemoryRepo::default();
        repo.seed(1, "u/old.mp4", false, 30);
        repo.seed(2, "u/new.mp4", false, 1);
        repo.seed(3, "u/done.mp4", true, 5);
        store.fail_signing_for("u/old.mp4");

        let queue = pending_queue(&store, &repo, &session()).await.unwrap();
        let ids: Vec<_> = queue.iter().map(|p| p.id).collect();
        assert_eq!(ids, [2, 1]);
        assert_eq!(
            queue[0].signed_url.as_deref(),
            Some("https://signed.test/u/new.mp4?ttl=3600")
        );
        assert!(queue[1].signed_url.is_none());
        assert_eq!(queue[0].word, "word1");
    }

    #[tokio::test]
    async fn approve_twice_is_fine() {
        let repo = MemoryRepo::default();
        repo.seed(4, "u/a.mp4", false, 1);
        let s = session();

        approve(&repo, &s, 4).await.unwrap();
        approve(&repo, &s, 4).await.unwrap();
        assert!(repo.get(4).unwrap().is_approved);

        let store = MemoryStore::default();
        assert!(pending_queue(&store, &repo, &s).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reject_removes_object_and_row() {
        let store = MemoryStore::default();
        store.insert("u/a.mp4");
        let repo = MemoryRepo::default();
        repo.seed(5, "u/a.mp4", false, 1);

        let outcome = reject(&store, &repo, &session(), 5).await.unwrap();
        assert_eq!(
            outcome,
            RejectOutcome::Removed {
                storage_warning: None
            }
        );
        assert!(!store.contains("u/a.mp4"));
        assert!(repo.get(5).is_none());
    }

    #[tokio::test]
    async fn reject_with_missing_object_still_deletes_row() {
        let store = MemoryStore::default();
        let repo = MemoryRepo::default();
        repo.seed(6, "u/gone.mp4", false, 1);

        let outcome = reject(&store, &repo, &session(), 6).await.unwrap();
        assert!(matches!(
            outcome,
            RejectOutcome::Removed {
                storage_warning: Some(_)
            }
        ));
        assert!(repo.get(6).is_none());

        let again = reject(&store, &repo, &session(), 6).await.unwrap();
        assert_eq!(again, RejectOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn failed_row_delete_is_an_error() {
        let store = MemoryStore::default();
        store.insert("u/b.mp4");
        let repo = MemoryRepo::default();
        repo.seed(7, "u/b.mp4", false, 1);
        *repo.fail_delete.lock().unwrap() = true;

        assert!(reject(&store, &repo, &session(), 7).await.is_err());
        assert!(repo.get(7).is_some());
    }

    #[test]
    fn row_locks_refuse_concurrent_actions_on_same_row() {
        let locks = RowLocks::new();
        let guard = locks.try_lock(1).unwrap();
        assert!(locks.try_lock(1).is_none());
        // The refused attempt must not release the holder's row
        assert!(locks.try_lock(1).is_none());
        assert!(locks.try_lock(2).is_some());
        drop(guard);
        assert!(locks.try_lock(1).is_some());
    }
}
