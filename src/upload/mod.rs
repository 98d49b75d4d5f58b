//! Contribution uploads: the per-user submission queue and the sequential
//! storage-then-row writer that drains it.

pub mod orchestrator;
pub mod queue;

pub use orchestrator::{SubmitError, SubmitReport, submit};
pub use queue::{QueueFull, QueueStore, QueuedFile, SubmissionQueue};
