//! Pending files waiting for submission, kept server-side per user.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::constants::{MAX_QUEUED_BYTES, MAX_QUEUED_FILES};

/// A file picked by the user or produced by the webcam recorder
#[derive(Debug, Clone)]
pub struct QueuedFile {
    pub name: String,
    pub size: usize,
    pub content_type: String,
    pub bytes: Bytes,
}

impl QueuedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            size: bytes.len(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Ordered list of files; insertion order is submission order.
#[derive(Debug, Default, Clone)]
pub struct SubmissionQueue {
    files: Vec<QueuedFile>,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, file: QueuedFile) {
        self.files.push(file);
    }

    pub fn append_all(&mut self, files: impl IntoIterator<Item = QueuedFile>) {
        self.files.extend(files);
    }

    /// Remove the file at `index`; out of range leaves the queue untouched.
    pub fn remove(&mut self, index: usize) -> Option<QueuedFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedFile> {
        self.files.iter()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Whether `files` more files totalling `bytes` stay within the per-user caps
    pub fn has_room(&self, files: usize, bytes: usize) -> bool {
        self.len() + files <= MAX_QUEUED_FILES && self.total_bytes() + bytes <= MAX_QUEUED_BYTES
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("queue full: {queued} files queued, {adding} more refused")]
pub struct QueueFull {
    pub queued: usize,
    pub adding: usize,
}

struct Slot {
    queue: SubmissionQueue,
    touched: Instant,
}

/// One queue per signed-in user.
#[derive(Default)]
pub struct QueueStore {
    queues: Mutex<HashMap<Uuid, Slot>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the user's queue, creating it on first use.
    /// The lock is never held across an await.
    pub fn with<R>(&self, user_id: Uuid, f: impl FnOnce(&mut SubmissionQueue) -> R) -> R {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = queues.entry(user_id).or_insert_with(|| Slot {
            queue: SubmissionQueue::new(),
            touched: now,
        });
        slot.touched = now;
        f(&mut slot.queue)
    }

    pub fn has_room(&self, user_id: Uuid, files: usize, bytes: usize) -> bool {
        self.with(user_id, |q| q.has_room(files, bytes))
    }

    /// Append all of `files` or none of them; returns the new queue length
    pub fn try_append_all(&self, user_id: Uuid, files: Vec<QueuedFile>) -> Result<usize, QueueFull> {
        let bytes = files.iter().map(|f| f.size).sum();
        self.with(user_id, |q| {
            if !q.has_room(files.len(), bytes) {
                return Err(QueueFull {
                    queued: q.len(),
                    adding: files.len(),
                });
            }
            q.append_all(files);
            Ok(q.len())
        })
    }

    /// Copy of the user's queue for rendering or submission
    pub fn snapshot(&self, user_id: Uuid) -> SubmissionQueue {
        self.with(user_id, |q| q.clone())
    }

    /// Take the whole queue out, leaving an empty one behind
    pub fn take(&self, user_id: Uuid) -> SubmissionQueue {
        self.with(user_id, std::mem::take)
    }

    /// Put files back in front of anything queued meanwhile
    pub fn restore(&self, user_id: Uuid, queue: SubmissionQueue) {
        self.with(user_id, |q| {
            let newer = std::mem::replace(q, queue);
            q.append_all(newer.files);
        });
    }

    pub fn drop_user(&self, user_id: Uuid) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
    }

    /// Drop queues of users who have not touched them for `max_idle`.
    /// Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let before = queues.len();
        let now = Instant::now();
        queues.retain(|_, slot| now.duration_since(slot.touched) < max_idle);
        before - queues.len()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.queues.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> QueuedFile {
        QueuedFile::new(name, "video/mp4", Bytes::from_static(b"1234"))
    }

    #[test]
    fn remove_by_position_keeps_order() {
        let mut q = SubmissionQueue::new();
        q.append_all([file("a.mp4"), file("b.mp4"), file("c.mp4")]);

        let removed = q.remove(1).unwrap();
        assert_eq!(removed.name, "b.mp4");
        let names: Vec<_> = q.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.mp4", "c.mp4"]);
        assert_eq!(q.total_bytes(), 8);
    }

    #[test]
    fn out_of_range_remove_is_noop() {
        let mut q = SubmissionQueue::new();
        q.append(file("a.mp4"));
        assert!(q.remove(5).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut q = SubmissionQueue::new();
        q.append(file("same.mp4"));
        q.append(file("same.mp4"));
        assert_eq!(q.len(), 2);
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn store_isolates_users_and_restores_in_order() {
        let store = QueueStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        store.with(alice, |q| q.append(file("a1.mp4")));
        store.with(bob, |q| q.append(file("b1.mp4")));

        let taken = store.take(alice);
        assert_eq!(taken.len(), 1);
        assert!(store.snapshot(alice).is_empty());

        store.with(alice, |q| q.append(file("a2.mp4")));
        store.restore(alice, taken);
        let names: Vec<_> = store
            .snapshot(alice)
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, ["a1.mp4", "a2.mp4"]);
        assert_eq!(store.snapshot(bob).len(), 1);

        store.drop_user(bob);
        assert!(store.snapshot(bob).is_empty());
    }

    #[test]
    fn caps_refuse_whole_batches() {
        let store = QueueStore::new();
        let user = Uuid::new_v4();

        let batch: Vec<_> = (0..MAX_QUEUED_FILES - 1)
            .map(|i| file(&format!("{i}.mp4")))
            .collect();
        assert_eq!(store.try_append_all(user, batch), Ok(MAX_QUEUED_FILES - 1));

        // Two more would go over the file cap; neither is added
        let err = store
            .try_append_all(user, vec![file("x.mp4"), file("y.mp4")])
            .unwrap_err();
        assert_eq!(err.adding, 2);
        assert_eq!(store.snapshot(user).len(), MAX_QUEUED_FILES - 1);

        assert!(store.has_room(user, 1, 4));
        assert!(!store.has_room(user, 1, MAX_QUEUED_BYTES));
        assert_eq!(store.try_append_all(user, vec![file("z.mp4")]), Ok(MAX_QUEUED_FILES));
        assert!(!store.has_room(user, 1, 0));
    }

    #[test]
    fn byte_cap_counts_queued_sizes() {
        let mut q = SubmissionQueue::new();
        q.append(QueuedFile::new(
            "big.mp4",
            "video/mp4",
            Bytes::from(vec![0u8; 1024]),
        ));
        assert!(q.has_room(1, MAX_QUEUED_BYTES - 1024));
        assert!(!q.has_room(1, MAX_QUEUED_BYTES - 1023));
    }

    #[test]
    fn idle_queues_are_evicted() {
        let store = QueueStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        store.with(alice, |q| q.append(file("a.mp4")));
        store.with(bob, |q| q.append(file("b.mp4")));

        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.tracked(), 2);

        assert_eq!(store.evict_idle(Duration::ZERO), 2);
        assert_eq!(store.tracked(), 0);
        assert!(store.snapshot(alice).is_empty());
    }
}
