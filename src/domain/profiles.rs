//! Profile domain - public statistics and the leaderboard
//!
//! `total_uploads` is maintained outside this application; it is only read.

use crate::constants::LEADERBOARD_SIZE;
use crate::models::{CommunityStats, Profile};
use crate::services::db::Postgrest;
use crate::services::error::BackendError;

use super::words;

/// Top contributors, most uploads first, skipping profiles with none
pub async fn leaderboard(db: &Postgrest) -> Result<Vec<Profile>, BackendError> {
    db.from("profiles")
        .select("username,avatar_url,total_uploads")
        .gt("total_uploads", 0)
        .order("total_uploads", false)
        .limit(LEADERBOARD_SIZE)
        .fetch()
        .await
}

/// Sum of every profile's upload counter
pub async fn total_uploads(db: &Postgrest) -> Result<i64, BackendError> {
    let rows: Vec<Profile> = db.from("profiles").select("total_uploads").fetch().await?;
    Ok(sum_uploads(&rows))
}

fn sum_uploads(rows: &[Profile]) -> i64 {
    rows.iter().map(Profile::uploads).sum()
}

/// Upload total and dictionary size, fetched concurrently
pub async fn community_stats(db: &Postgrest) -> Result<CommunityStats, BackendError> {
    let (total_videos, total_words) =
        futures::try_join!(total_uploads(db), words::count_words(db))?;
    Ok(CommunityStats {
        total_videos,
        total_words,
    })
}
