//! One recorder per signed-in user, driven by the browser over HTTP and
//! observed through a `watch` channel streamed as server-sent events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::state::{
    CameraSource, CameraStream, CaptureCommand, CaptureError, ClipInfo, Recorder, RecorderView,
    TransitionError,
};
use crate::constants::COUNTDOWN_TICK_MS;
use crate::upload::QueueStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("no recorder attached")]
    NoRecorder,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// What the browser reports after asking for the camera
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CameraReport {
    Granted {
        #[serde(default)]
        label: String,
    },
    Failed {
        /// DOMException name from getUserMedia
        error: String,
    },
}

impl CameraSource for CameraReport {
    fn open(&self) -> Result<CameraStream, CaptureError> {
        match self {
            CameraReport::Granted { label } => Ok(CameraStream::new(label.clone())),
            CameraReport::Failed { error } => Err(match error.as_str() {
                "NotAllowedError" | "SecurityError" => CaptureError::PermissionDenied,
                "NotFoundError" | "OverconstrainedError" => CaptureError::NoDevice,
                other => CaptureError::Other(other.to_string()),
            }),
        }
    }
}

struct RecorderSession {
    recorder: Mutex<Recorder>,
    views: watch::Sender<RecorderView>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl RecorderSession {
    /// Apply `f` to the recorder and publish the resulting view
    fn update<R>(&self, f: impl FnOnce(&mut Recorder) -> R) -> R {
        let mut recorder = self.recorder.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut recorder);
        self.views.send_replace(recorder.view());
        out
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for RecorderSession {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

pub struct RecorderHub {
    queues: Arc<QueueStore>,
    sessions: Mutex<HashMap<Uuid, Arc<RecorderSession>>>,
}

impl RecorderHub {
    pub fn new(queues: Arc<QueueStore>) -> Self {
        Self {
            queues,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, user_id: Uuid) -> Result<Arc<RecorderSession>, HubError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
            .ok_or(HubError::NoRecorder)
    }

    /// Create the user's recorder from the browser's camera report. A previous
    /// recorder is dropped, releasing its stream.
    pub fn attach(&self, user_id: Uuid, report: &CameraReport) -> RecorderView {
        let queues = self.queues.clone();
        let recorder = Recorder::acquire(
            report,
            Box::new(move |file| {
                tracing::info!("Queued webcam clip {} ({} bytes)", file.name, file.size);
                queues.with(user_id, |q| q.append(file));
            }),
        );
        let view = recorder.view();
        let (views, _) = watch::channel(view.clone());

        let session = Arc::new(RecorderSession {
            recorder: Mutex::new(recorder),
            views,
            ticker: Mutex::new(None),
        });

        let previous = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, session);
        if let Some(previous) = previous {
            previous.stop_ticker();
        }
        view
    }

    /// Start the countdown and drive it with a one-second ticker
    pub fn start(&self, user_id: Uuid) -> Result<RecorderView, HubError> {
        let session = self.session(user_id)?;
        session.update(|r| r.start())?;

        let weak = Arc::downgrade(&session);
        let handle = tokio::spawn(run_countdown(weak));
        if let Some(old) = session
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            old.abort();
        }
        Ok(session.views.borrow().clone())
    }

    pub fn stop(&self, user_id: Uuid) -> Result<CaptureCommand, HubError> {
        let session = self.session(user_id)?;
        Ok(session.update(|r| r.stop())?)
    }

    /// The browser finished encoding; the clip goes to the user's queue
    pub fn submit_clip(
        &self,
        user_id: Uuid,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<ClipInfo, HubError> {
        let session = self.session(user_id)?;
        Ok(session.update(|r| r.output_ready(bytes, content_type))?)
    }

    /// The clip upload failed or was refused; back to the live preview
    pub fn clip_failed(&self, user_id: Uuid, reason: &str) -> Result<RecorderView, HubError> {
        let session = self.session(user_id)?;
        session.update(|r| r.output_failed(reason))?;
        Ok(session.views.borrow().clone())
    }

    pub fn accept(&self, user_id: Uuid) -> Result<RecorderView, HubError> {
        let session = self.session(user_id)?;
        session.update(|r| r.accept())?;
        Ok(session.views.borrow().clone())
    }

    pub fn retry(&self, user_id: Uuid) -> Result<RecorderView, HubError> {
        let session = self.session(user_id)?;
        session.update(|r| r.retry())?;
        Ok(session.views.borrow().clone())
    }

    pub fn device_lost(&self, user_id: Uuid, reason: &str) -> Result<RecorderView, HubError> {
        let session = self.session(user_id)?;
        session.stop_ticker();
        session.update(|r| r.device_lost(reason));
        Ok(session.views.borrow().clone())
    }

    /// Drop the user's recorder and its stream
    pub fn release(&self, user_id: Uuid) {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
        if let Some(session) = removed {
            session.stop_ticker();
            tracing::debug!("Released recorder for {}", user_id);
        }
    }

    pub fn view(&self, user_id: Uuid) -> Option<RecorderView> {
        self.session(user_id)
            .ok()
            .map(|s| s.views.borrow().clone())
    }

    pub fn subscribe(&self, user_id: Uuid) -> Option<watch::Receiver<RecorderView>> {
        self.session(user_id).ok().map(|s| s.views.subscribe())
    }
}

async fn run_countdown(session: Weak<RecorderSession>) {
    let mut interval = tokio::time::interval(Duration::from_millis(COUNTDOWN_TICK_MS));
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(session) = session.upgrade() else {
            return;
        };
        match session.update(|r| r.tick()) {
            Ok(None) => continue,
            Ok(Some(CaptureCommand::Start)) => {
                tracing::debug!("Countdown finished, recording");
                return;
            }
            Ok(Some(_)) | Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::Screen;

    fn granted() -> CameraReport {
        CameraReport::Granted {
            label: "FaceTime HD".into(),
        }
    }

    #[test]
    fn camera_report_parses_browser_json() {
        let ok: CameraReport =
            serde_json::from_str(r#"{"status":"granted","label":"cam"}"#).unwrap();
        assert!(ok.open().is_ok());

        let denied: CameraReport =
            serde_json::from_str(r#"{"status":"failed","error":"NotAllowedError"}"#).unwrap();
        assert_eq!(denied.open().err(), Some(CaptureError::PermissionDenied));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_runs_to_recording_and_clip_lands_in_queue() {
        let queues = Arc::new(QueueStore::new());
        let hub = RecorderHub::new(queues.clone());
        let user = Uuid::new_v4();

        hub.attach(user, &granted());
        let mut rx = hub.subscribe(user).unwrap();

        let view = hub.start(user).unwrap();
        assert_eq!(view.countdown, Some(5));

        tokio::time::sleep(Duration::from_millis(5 * COUNTDOWN_TICK_MS + 50)).await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().recording);

        assert_eq!(hub.stop(user).unwrap(), CaptureCommand::Stop);
        assert_eq!(hub.view(user).unwrap().screen, Screen::Processing);

        let clip = hub
            .submit_clip(user, Bytes::from_static(b"clip"), "video/webm")
            .unwrap();
        assert_eq!(hub.view(user).unwrap().screen, Screen::Playback);

        let queued = queues.snapshot(user);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued.iter().next().unwrap().name, clip.name);

        let view = hub.retry(user).unwrap();
        assert_eq!(view.screen, Screen::Live);
        // Retry does not pull the clip back out of the queue
        assert_eq!(queues.snapshot(user).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_clip_upload_unblocks_the_recorder() {
        let queues = Arc::new(QueueStore::new());
        let hub = RecorderHub::new(queues.clone());
        let user = Uuid::new_v4();

        hub.attach(user, &granted());
        hub.start(user).unwrap();
        tokio::time::sleep(Duration::from_millis(5 * COUNTDOWN_TICK_MS + 50)).await;
        hub.stop(user).unwrap();
        assert!(matches!(hub.retry(user), Err(HubError::Transition(_))));

        let view = hub.clip_failed(user, "too many requests").unwrap();
        assert_eq!(view.screen, Screen::Live);
        assert!(view.controls.start);
        assert_eq!(view.notice.as_deref(), Some("too many requests"));
        assert!(queues.snapshot(user).is_empty());

        // Only a pending clip can fail
        assert!(matches!(
            hub.clip_failed(user, "again"),
            Err(HubError::Transition(_))
        ));
        assert!(hub.start(user).is_ok());
    }

    #[tokio::test]
    async fn unknown_user_and_release() {
        let hub = RecorderHub::new(Arc::new(QueueStore::new()));
        let user = Uuid::new_v4();
        assert_eq!(hub.stop(user).unwrap_err(), HubError::NoRecorder);

        hub.attach(user, &granted());
        assert!(matches!(
            hub.stop(user).unwrap_err(),
            HubError::Transition(_)
        ));

        hub.release(user);
        assert!(hub.view(user).is_none());
        assert!(hub.subscribe(user).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reattach_cancels_running_countdown() {
        let hub = RecorderHub::new(Arc::new(QueueStore::new()));
        let user = Uuid::new_v4();
        hub.attach(user, &granted());
        hub.start(user).unwrap();

        let view = hub.attach(user, &granted());
        assert_eq!(view.screen, Screen::Live);
        tokio::time::sleep(Duration::from_millis(6 * COUNTDOWN_TICK_MS)).await;
        assert!(!hub.view(user).unwrap().recording);
        assert!(hub.view(user).unwrap().controls.start);
    }
}
