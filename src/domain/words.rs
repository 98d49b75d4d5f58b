//! Word domain - dictionary queries

use crate::models::Word;
use crate::services::db::Postgrest;
use crate::services::error::BackendError;
use crate::services::session::AuthSession;

/// All words, alphabetical, for the contribute page selector
pub async fn list_words(db: &Postgrest, session: &AuthSession) -> Result<Vec<Word>, BackendError> {
    db.from("words")
        .select("id,text")
        .order("text", true)
        .auth(session)
        .fetch()
        .await
}

/// Dictionary size, counted without fetching rows
pub async fn count_words(db: &Postgrest) -> Result<i64, BackendError> {
    db.from("words").select("*").count().await
}
