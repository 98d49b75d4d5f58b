pub mod admin;
pub mod auth;
pub mod contribute;
pub mod error;
pub mod pages;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the site
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(admin::routes())
        .merge(auth::routes())
        .merge(contribute::routes())
        .merge(pages::routes())
}
