//! Runtime configuration loaded from the environment (and `.env` when present).

use std::env;

use anyhow::{Context, Result, bail};

use crate::constants::{DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_VIDEO_BUCKET};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Supabase project, without trailing slash
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// When set, access tokens are validated locally instead of via `/auth/v1/user`
    pub supabase_jwt_secret: Option<String>,
    /// Public origin of this site, used to build OAuth redirect URLs
    pub site_url: String,
    pub host: String,
    pub port: u16,
    pub video_bucket: String,
    pub max_upload_bytes: usize,
    pub cookies: CookieSettings,
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let supabase_url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("PORT must be a valid port number")?;

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(v) => v
                .parse()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            video_bucket: env::var("VIDEO_BUCKET").unwrap_or_else(|_| DEFAULT_VIDEO_BUCKET.into()),
            max_upload_bytes,
            cookies: CookieSettings {
                secure: env::var("ENV").as_deref() == Ok("prod"),
                same_site: normalize_same_site(
                    &env::var("COOKIE_SAMESITE").unwrap_or_else(|_| "Lax".into()),
                ),
            },
        })
    }
}

fn required(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("{key} must be set"),
    }
}

fn normalize_same_site(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "none" => "None",
        "strict" => "Strict",
        _ => "Lax",
    }
    .to_string()
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            supabase_url: "http://supabase.test".into(),
            supabase_anon_key: "anon".into(),
            supabase_jwt_secret: Some("test-secret".into()),
            site_url: "http://localhost:3000".into(),
            host: "127.0.0.1".into(),
            port: 3000,
            video_bucket: DEFAULT_VIDEO_BUCKET.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cookies: CookieSettings {
                secure: false,
                same_site: "Lax".into(),
            },
        }
    }
}
