//! Video object storage backed by the Supabase storage API.
//!
//! Upload, moderation and tests go through the `VideoStore` trait so the
//! two-phase write can be exercised without a backend.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::services::error::BackendError;
use crate::services::session::AuthSession;

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Write a new object; existing objects are never overwritten.
    async fn upload(
        &self,
        session: &AuthSession,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Remove an object. A missing object is `BackendError::NotFound`.
    async fn remove(&self, session: &AuthSession, path: &str) -> Result<(), BackendError>;

    /// Time-limited playback URL for a private object
    async fn signed_url(
        &self,
        session: &AuthSession,
        path: &str,
        expires_in: u32,
    ) -> Result<String, BackendError>;
}

#[derive(Clone)]
pub struct StorageClient {
    base_url: String,
    anon_key: String,
    bucket: String,
    http: Client,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl StorageClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: format!("{}/storage/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            bucket: config.video_bucket.clone(),
            http: Client::new(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl VideoStore for StorageClient {
    async fn upload(
        &self,
        session: &AuthSession,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(self.object_url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        tracing::debug!("Stored object {}/{}", self.bucket, path);
        Ok(())
    }

    async fn remove(&self, session: &AuthSession, path: &str) -> Result<(), BackendError> {
        let resp = self
            .http
            .delete(format!("{}/object/{}", self.base_url, self.bucket))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({ "prefixes": [path] }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        // The API answers 200 with the list of removed objects, empty when
        // nothing matched.
        let removed: Vec<serde_json::Value> = resp.json().await?;
        if removed.is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }
        Ok(())
    }

    async fn signed_url(
        &self,
        session: &AuthSession,
        path: &str,
        expires_in: u32,
    ) -> Result<String, BackendError> {
        let resp = self
            .http
            .post(format!(
                "{}/object/sign/{}/{}",
                self.base_url, self.bucket, path
            ))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({ "expiresIn": expires_in }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        let signed: SignedUrlResponse = resp.json().await?;
        Ok(format!("{}{}", self.base_url, signed.signed_url))
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store used by orchestrator and moderation tests.

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: Mutex<HashMap<String, Bytes>>,
        /// Upload of any path containing one of these fragments fails
        pub fail_uploads: Mutex<HashSet<String>>,
        pub fail_signing: Mutex<HashSet<String>>,
        pub calls: Mutex<usize>,
    }

    impl MemoryStore {
        pub fn fail_uploads_matching(&self, fragment: &str) {
            self.fail_uploads.lock().unwrap().insert(fragment.into());
        }

        pub fn fail_signing_for(&self, path: &str) {
            self.fail_signing.lock().unwrap().insert(path.into());
        }

        pub fn insert(&self, path: &str) {
            self.objects
                .lock()
                .unwrap()
                .insert(path.into(), Bytes::from_static(b"video"));
        }

        pub fn contains(&self, path: &str) -> bool {
            self.objects.lock().unwrap().contains_key(path)
        }

        pub fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn bump(&self) {
            *self.calls.lock().unwrap() += 1;
        }
    }

    #[async_trait]
    impl VideoStore for MemoryStore {
        async fn upload(
            &self,
            _session: &AuthSession,
            path: &str,
            bytes: Bytes,
            _content_type: &str,
        ) -> Result<(), BackendError> {
            self.bump();
            let failing = self
                .fail_uploads
                .lock()
                .unwrap()
                .iter()
                .any(|f| path.contains(f.as_str()));
            if failing {
                return Err(BackendError::Api {
                    status: 500,
                    message: "upload refused".into(),
                });
            }
            self.objects.lock().unwrap().insert(path.into(), bytes);
            Ok(())
        }

        async fn remove(&self, _session: &AuthSession, path: &str) -> Result<(), BackendError> {
            self.bump();
            match self.objects.lock().unwrap().remove(path) {
                Some(_) => Ok(()),
                None => Err(BackendError::NotFound(path.into())),
            }
        }

        async fn signed_url(
            &self,
            _session: &AuthSession,
            path: &str,
            expires_in: u32,
        ) -> Result<String, BackendError> {
            self.bump();
            if self.fail_signing.lock().unwrap().contains(path) {
                return Err(BackendError::Api {
                    status: 400,
                    message: "cannot sign".into(),
                });
            }
            Ok(format!("https://signed.test/{path}?ttl={expires_in}"))
        }
    }
}
