//! Webcam recording: the per-user state machine and the hub that hosts it.

pub mod session;
pub mod state;

pub use session::{CameraReport, HubError, RecorderHub};
pub use state::{CaptureCommand, RecorderView};
