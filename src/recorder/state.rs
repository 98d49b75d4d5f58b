//! Webcam recording state machine
//!
//! `Idle -> Countdown(n) -> Recording -> Reviewing(Pending | Ready) ->
//! Accepted | Idle`, with `Unavailable` as the terminal state when the camera
//! cannot be used. The machine never touches media itself: transitions that
//! need the browser to act return a `CaptureCommand`.

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::constants::{COUNTDOWN_TICKS, FALLBACK_EXTENSION};
use crate::upload::QueuedFile;

/// Why the camera cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NoDevice,
    #[error("camera disconnected: {0}")]
    DeviceLost(String),
    #[error("camera error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {state}")]
pub struct TransitionError {
    pub action: &'static str,
    pub state: &'static str,
}

/// What the browser has to do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureCommand {
    Start,
    Stop,
}

/// The live camera stream. Exactly one recorder owns it; dropping it stops
/// every track.
pub struct CameraStream {
    label: String,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl CameraStream {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            on_release: None,
        }
    }

    /// Run `f` when the stream is released
    pub fn on_release(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(f));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        tracing::debug!("Releasing camera stream {}", self.label);
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

/// Something that can hand out a camera stream
pub trait CameraSource {
    fn open(&self) -> Result<CameraStream, CaptureError>;
}

/// Metadata of the last finished clip; the bytes went to the callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipInfo {
    pub name: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Review {
    /// Stop was pressed, the encoded output has not arrived yet
    Pending,
    Ready(ClipInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Countdown(u8),
    Recording,
    Reviewing(Review),
    Accepted(ClipInfo),
    Unavailable(CaptureError),
}

impl RecorderState {
    fn name(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Countdown(_) => "counting down",
            RecorderState::Recording => "recording",
            RecorderState::Reviewing(Review::Pending) => "processing",
            RecorderState::Reviewing(Review::Ready(_)) => "reviewing",
            RecorderState::Accepted(_) => "accepted",
            RecorderState::Unavailable(_) => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    /// Mirrored camera preview
    Live,
    /// Spinner while the clip is encoded
    Processing,
    /// The recorded clip
    Playback,
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub start: bool,
    /// Stop is shown during the countdown but only enabled while recording
    pub stop_visible: bool,
    pub stop_enabled: bool,
    pub retry: bool,
    pub accept: bool,
}

/// Everything the page needs to draw the recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecorderView {
    pub screen: Screen,
    pub countdown: Option<u8>,
    pub recording: bool,
    pub controls: Controls,
    pub clip: Option<ClipInfo>,
    pub accepted: bool,
    pub error: Option<String>,
    /// Why the last clip was dropped, until the next start
    pub notice: Option<String>,
}

pub type ClipCallback = Box<dyn FnMut(QueuedFile) + Send>;

pub struct Recorder {
    state: RecorderState,
    stream: Option<CameraStream>,
    on_complete: ClipCallback,
    notice: Option<String>,
}

impl Recorder {
    /// Open the camera. Failure is not retried: the recorder starts out
    /// `Unavailable` and shows no preview.
    pub fn acquire(source: &dyn CameraSource, on_complete: ClipCallback) -> Self {
        match source.open() {
            Ok(stream) => {
                tracing::debug!("Camera acquired: {}", stream.label());
                Self {
                    state: RecorderState::Idle,
                    stream: Some(stream),
                    on_complete,
                    notice: None,
                }
            }
            Err(e) => {
                tracing::warn!("Camera unavailable: {}", e);
                Self {
                    state: RecorderState::Unavailable(e),
                    stream: None,
                    on_complete,
                    notice: None,
                }
            }
        }
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    fn refuse<T>(&self, action: &'static str) -> Result<T, TransitionError> {
        Err(TransitionError {
            action,
            state: self.state.name(),
        })
    }

    /// Begin the countdown. Any previous clip is dropped from the preview.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.state {
            RecorderState::Idle | RecorderState::Accepted(_) => {
                self.state = RecorderState::Countdown(COUNTDOWN_TICKS);
                self.notice = None;
                Ok(())
            }
            _ => self.refuse("start"),
        }
    }

    /// One countdown second. The tick that would reach zero starts recording.
    pub fn tick(&mut self) -> Result<Option<CaptureCommand>, TransitionError> {
        match self.state {
            RecorderState::Countdown(n) if n > 1 => {
                self.state = RecorderState::Countdown(n - 1);
                Ok(None)
            }
            RecorderState::Countdown(_) => {
                self.state = RecorderState::Recording;
                Ok(Some(CaptureCommand::Start))
            }
            _ => self.refuse("tick"),
        }
    }

    /// Stop recording and wait for the encoded output
    pub fn stop(&mut self) -> Result<CaptureCommand, TransitionError> {
        match self.state {
            RecorderState::Recording => {
                self.state = RecorderState::Reviewing(Review::Pending);
                Ok(CaptureCommand::Stop)
            }
            _ => self.refuse("stop"),
        }
    }

    /// The encoded clip arrived. It is wrapped as a named file and handed to
    /// the completion callback.
    pub fn output_ready(
        &mut self,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<ClipInfo, TransitionError> {
        if self.state != RecorderState::Reviewing(Review::Pending) {
            return self.refuse("finish a clip");
        }

        let mime = base_mime(content_type);
        let name = format!(
            "webcam-recording-{}.{}",
            Utc::now().timestamp_millis(),
            extension_for(mime)
        );
        let file = QueuedFile::new(name, mime, bytes);
        let info = ClipInfo {
            name: file.name.clone(),
            size: file.size,
            content_type: file.content_type.clone(),
        };

        (self.on_complete)(file);
        self.state = RecorderState::Reviewing(Review::Ready(info.clone()));
        Ok(info)
    }

    /// The encoded clip never made it: upload refused or lost on the way.
    /// Back to the live preview, keeping `reason` for the user.
    pub fn output_failed(&mut self, reason: &str) -> Result<(), TransitionError> {
        if self.state != RecorderState::Reviewing(Review::Pending) {
            return self.refuse("drop a clip");
        }
        tracing::warn!("Webcam clip dropped: {}", reason);
        self.state = RecorderState::Idle;
        self.notice = Some(reason.to_string());
        Ok(())
    }

    pub fn accept(&mut self) -> Result<(), TransitionError> {
        match &self.state {
            RecorderState::Reviewing(Review::Ready(clip)) => {
                self.state = RecorderState::Accepted(clip.clone());
                Ok(())
            }
            _ => self.refuse("accept"),
        }
    }

    /// Discard the clip reference and go back to the live preview
    pub fn retry(&mut self) -> Result<(), TransitionError> {
        match self.state {
            RecorderState::Reviewing(Review::Ready(_)) | RecorderState::Accepted(_) => {
                self.state = RecorderState::Idle;
                Ok(())
            }
            _ => self.refuse("retry"),
        }
    }

    /// The camera went away; nothing but a new recorder can recover
    pub fn device_lost(&mut self, reason: &str) {
        tracing::warn!("Camera lost while {}: {}", self.state.name(), reason);
        self.stream = None;
        self.state = RecorderState::Unavailable(CaptureError::DeviceLost(reason.to_string()));
    }

    pub fn view(&self) -> RecorderView {
        let mut controls = Controls::default();
        let (screen, countdown, recording, clip, accepted) = match &self.state {
            RecorderState::Idle => {
                controls.start = true;
                (Screen::Live, None, false, None, false)
            }
            RecorderState::Countdown(n) => {
                controls.stop_visible = true;
                (Screen::Live, Some(*n), false, None, false)
            }
            RecorderState::Recording => {
                controls.stop_visible = true;
                controls.stop_enabled = true;
                (Screen::Live, None, true, None, false)
            }
            RecorderState::Reviewing(Review::Pending) => {
                (Screen::Processing, None, false, None, false)
            }
            RecorderState::Reviewing(Review::Ready(clip)) => {
                controls.retry = true;
                controls.accept = true;
                (Screen::Playback, None, false, Some(clip.clone()), false)
            }
            RecorderState::Accepted(clip) => {
                controls.start = true;
                controls.retry = true;
                (Screen::Playback, None, false, Some(clip.clone()), true)
            }
            RecorderState::Unavailable(_) => (Screen::Unavailable, None, false, None, false),
        };

        RecorderView {
            screen,
            countdown,
            recording,
            controls,
            clip,
            accepted,
            error: match &self.state {
                RecorderState::Unavailable(e) => Some(e.to_string()),
                _ => None,
            },
            notice: self.notice.clone(),
        }
    }
}

/// `video/webm;codecs=vp9` -> `video/webm`
fn base_mime(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("video/mp4")
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "video/ogg" => "ogv",
        _ => FALLBACK_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    struct FakeCamera {
        fail: Option<CaptureError>,
        released: Arc<AtomicBool>,
    }

    impl FakeCamera {
        fn working() -> Self {
            Self {
                fail: None,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl CameraSource for FakeCamera {
        fn open(&self) -> Result<CameraStream, CaptureError> {
            if let Some(e) = &self.fail {
                return Err(e.clone());
            }
            let released = self.released.clone();
            Ok(CameraStream::new("fake").on_release(move || released.store(true, Ordering::SeqCst)))
        }
    }

    fn recorder() -> (Recorder, Arc<Mutex<Vec<QueuedFile>>>) {
        let clips = Arc::new(Mutex::new(Vec::new()));
        let sink = clips.clone();
        let r = Recorder::acquire(
            &FakeCamera::working(),
            Box::new(move |f| sink.lock().unwrap().push(f)),
        );
        (r, clips)
    }

    fn run_countdown(r: &mut Recorder) -> Option<CaptureCommand> {
        let mut last = None;
        for _ in 0..COUNTDOWN_TICKS {
            last = r.tick().unwrap();
        }
        last
    }

    #[test]
    fn countdown_then_record() {
        let (mut r, _) = recorder();
        r.start().unwrap();
        assert_eq!(r.view().countdown, Some(5));
        assert!(r.view().controls.stop_visible);
        assert!(!r.view().controls.stop_enabled);

        for expected in [4, 3, 2, 1] {
            assert_eq!(r.tick().unwrap(), None);
            assert_eq!(r.state(), &RecorderState::Countdown(expected));
        }
        assert_eq!(r.tick().unwrap(), Some(CaptureCommand::Start));
        assert_eq!(r.state(), &RecorderState::Recording);

        let view = r.view();
        assert!(view.recording);
        assert!(view.controls.stop_enabled);
        assert_eq!(view.countdown, None);
    }

    #[test]
    fn stop_goes_to_review_and_never_shows_live() {
        let (mut r, clips) = recorder();
        r.start().unwrap();
        run_countdown(&mut r);

        assert_eq!(r.stop().unwrap(), CaptureCommand::Stop);
        assert_eq!(r.state(), &RecorderState::Reviewing(Review::Pending));
        assert_eq!(r.view().screen, Screen::Processing);

        let clip = r
            .output_ready(Bytes::from_static(b"webm!"), "video/webm;codecs=vp9")
            .unwrap();
        assert!(clip.name.starts_with("webcam-recording-"));
        assert!(clip.name.ends_with(".webm"));
        assert_eq!(clip.size, 5);
        assert_eq!(r.view().screen, Screen::Playback);

        let handed = clips.lock().unwrap();
        assert_eq!(handed.len(), 1);
        assert_eq!(handed[0].content_type, "video/webm");
    }

    #[test]
    fn failed_output_returns_to_live_preview() {
        let (mut r, clips) = recorder();
        r.start().unwrap();
        run_countdown(&mut r);
        r.stop().unwrap();

        // Neither retry nor start can leave a pending review
        assert!(r.retry().is_err());
        assert!(r.start().is_err());

        r.output_failed("queue full").unwrap();
        assert_eq!(r.state(), &RecorderState::Idle);
        let view = r.view();
        assert_eq!(view.screen, Screen::Live);
        assert!(view.controls.start);
        assert_eq!(view.notice.as_deref(), Some("queue full"));
        assert!(clips.lock().unwrap().is_empty());

        // A late clip for the dropped take is refused
        assert!(r.output_ready(Bytes::from_static(b"late"), "video/webm").is_err());
        assert!(r.output_failed("again").is_err());

        r.start().unwrap();
        assert_eq!(r.view().notice, None);
    }

    #[test]
    fn invalid_transitions_leave_state_alone() {
        let (mut r, clips) = recorder();

        assert!(r.stop().is_err());
        assert!(r.retry().is_err());
        assert!(r.accept().is_err());
        assert!(r.output_ready(Bytes::new(), "video/mp4").is_err());
        assert_eq!(r.state(), &RecorderState::Idle);

        r.start().unwrap();
        let err = r.start().unwrap_err();
        assert_eq!(err.action, "start");
        assert_eq!(r.state(), &RecorderState::Countdown(5));

        run_countdown(&mut r);
        assert!(r.tick().is_err());
        assert!(clips.lock().unwrap().is_empty());
    }

    #[test]
    fn retry_and_accept_paths() {
        let (mut r, clips) = recorder();
        r.start().unwrap();
        run_countdown(&mut r);
        r.stop().unwrap();
        r.output_ready(Bytes::from_static(b"a"), "").unwrap();

        r.accept().unwrap();
        let view = r.view();
        assert!(view.accepted);
        assert!(view.controls.start);
        assert!(view.clip.unwrap().name.ends_with(".mp4"));

        r.retry().unwrap();
        assert_eq!(r.state(), &RecorderState::Idle);
        assert_eq!(r.view().screen, Screen::Live);

        // A second take from Accepted goes straight to the countdown
        r.start().unwrap();
        run_countdown(&mut r);
        r.stop().unwrap();
        r.output_ready(Bytes::from_static(b"b"), "video/mp4").unwrap();
        r.accept().unwrap();
        r.start().unwrap();
        assert_eq!(r.state(), &RecorderState::Countdown(5));

        assert_eq!(clips.lock().unwrap().len(), 2);
    }

    #[test]
    fn acquisition_failure_is_terminal() {
        let camera = FakeCamera {
            fail: Some(CaptureError::PermissionDenied),
            released: Arc::new(AtomicBool::new(false)),
        };
        let mut r = Recorder::acquire(&camera, Box::new(|_| {}));

        assert_eq!(r.view().screen, Screen::Unavailable);
        assert_eq!(r.view().error.as_deref(), Some("camera permission denied"));
        assert!(r.start().is_err());
    }

    #[test]
    fn device_loss_and_drop_release_the_stream() {
        let camera = FakeCamera::working();
        let released = camera.released.clone();
        let mut r = Recorder::acquire(&camera, Box::new(|_| {}));
        r.start().unwrap();
        r.device_lost("unplugged");
        assert!(released.load(Ordering::SeqCst));
        assert!(matches!(r.state(), RecorderState::Unavailable(CaptureError::DeviceLost(_))));

        let camera = FakeCamera::working();
        let released = camera.released.clone();
        let r = Recorder::acquire(&camera, Box::new(|_| {}));
        assert!(!released.load(Ordering::SeqCst));
        drop(r);
        assert!(released.load(Ordering::SeqCst));
    }
}
