pub mod auth;
pub mod auth_events;
pub mod cookies;
pub mod db;
pub mod error;
pub mod rate_limit;
pub mod session;
