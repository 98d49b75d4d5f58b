//! Application constants

/// Storage bucket holding contributed videos
pub const DEFAULT_VIDEO_BUCKET: &str = "contributi_video";

/// Maximum request body size for queue uploads (200 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Signed playback URL expiry in seconds (1 hour)
pub const SIGNED_URL_EXPIRY_SECS: u32 = 60 * 60;

/// Countdown ticks before the webcam starts recording
pub const COUNTDOWN_TICKS: u8 = 5;

/// Interval between countdown ticks in milliseconds
pub const COUNTDOWN_TICK_MS: u64 = 1000;

/// Number of profiles shown on the community leaderboard
pub const LEADERBOARD_SIZE: usize = 10;

/// Average clip length used to estimate collected data minutes
pub const SECONDS_PER_CLIP: i64 = 5;

/// Extension used when a queued file name carries none
pub const FALLBACK_EXTENSION: &str = "mp4";

/// Where the auth callback sends the user when `next` is absent
pub const DEFAULT_AFTER_LOGIN: &str = "/contribuisci";

/// Redirect target for a failed code exchange
pub const AUTH_ERROR_PATH: &str = "/auth/auth-code-error";

/// Files one user may keep waiting in the submission queue
pub const MAX_QUEUED_FILES: usize = 20;

/// Bytes one user may keep waiting in the submission queue (400 MB)
pub const MAX_QUEUED_BYTES: usize = 400 * 1024 * 1024;

/// Queues left untouched this long are dropped (2 hours)
pub const QUEUE_IDLE_SECS: u64 = 2 * 60 * 60;
