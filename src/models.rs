//! Rows read from and written to the database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dictionary entry a contribution demonstrates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Word {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: i64,
    pub user_id: Uuid,
    pub word_id: i64,
    /// Storage path inside the video bucket, never a public URL
    pub video_url: String,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; `id` and `created_at` are assigned by the database
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewContribution {
    pub user_id: Uuid,
    pub word_id: i64,
    pub video_url: String,
    pub is_approved: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub total_uploads: Option<i64>,
}

impl Profile {
    pub fn uploads(&self) -> i64 {
        self.total_uploads.unwrap_or(0)
    }

    /// Username, or `None` for anonymous profiles
    pub fn display_name(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Uppercase first letter of the username, for the avatar placeholder
    pub fn initial(&self) -> Option<char> {
        self.display_name()
            .and_then(|u| u.chars().next())
            .and_then(|c| c.to_uppercase().next())
    }
}

/// `words(text)` embedded resource
#[derive(Debug, Clone, Deserialize)]
pub struct WordText {
    pub text: String,
}

/// Unapproved contribution as selected for moderation
#[derive(Debug, Clone, Deserialize)]
pub struct PendingRow {
    pub id: i64,
    pub video_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub words: Option<WordText>,
}

/// Moderation entry with its freshly signed playback URL
#[derive(Debug, Clone)]
pub struct PendingContribution {
    pub id: i64,
    pub video_path: String,
    pub word: String,
    pub created_at: DateTime<Utc>,
    /// `None` when signing failed; the entry is still listed
    pub signed_url: Option<String>,
}

/// Totals shown on the home and community pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommunityStats {
    pub total_videos: i64,
    pub total_words: i64,
}

impl CommunityStats {
    /// Estimated minutes of collected footage, assuming a fixed clip length
    pub fn data_minutes(&self) -> i64 {
        self.total_videos * crate::constants::SECONDS_PER_CLIP / 60
    }
}
