//! Supabase auth (GoTrue) client: password and OAuth sign-in with PKCE,
//! sign-up, refresh and logout.

use base64::Engine;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::BackendError;
use crate::config::Config;

#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    anon_key: String,
    http: Client,
}

/// Tokens returned by every successful grant
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: SupabaseUser,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupabaseUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Sign-up either starts a session right away or waits for email confirmation
#[derive(Debug)]
pub enum SignUpOutcome {
    SignedIn(TokenResponse),
    ConfirmationSent,
}

/// PKCE verifier/challenge pair; the verifier is kept in a cookie until the
/// code comes back.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier_bytes: [u8; 32] = rand::rng().random();
        let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

impl AuthClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: format!("{}/auth/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            http: Client::new(),
        }
    }

    /// URL the browser is sent to for Google sign-in
    pub fn google_authorize_url(&self, redirect_to: &str, pkce: &Pkce) -> String {
        format!(
            "{}/authorize?provider=google&redirect_to={}&code_challenge={}&code_challenge_method=s256",
            self.base_url,
            percent_encode(redirect_to),
            percent_encode(&pkce.challenge)
        )
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenResponse, BackendError> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.grant("password", &body).await
    }

    /// Register with email and password. The confirmation link carries a PKCE
    /// code that lands on `redirect_to`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
        pkce: &Pkce,
    ) -> Result<SignUpOutcome, BackendError> {
        let url = format!(
            "{}/signup?redirect_to={}",
            self.base_url,
            percent_encode(redirect_to)
        );
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "code_challenge": pkce.challenge,
            "code_challenge_method": "s256",
        });

        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        let value: serde_json::Value = resp.json().await?;
        if value.get("access_token").is_some() {
            let tokens = serde_json::from_value(value).map_err(|e| BackendError::Api {
                status: 200,
                message: format!("unexpected sign-up payload: {e}"),
            })?;
            Ok(SignUpOutcome::SignedIn(tokens))
        } else {
            Ok(SignUpOutcome::ConfirmationSent)
        }
    }

    /// Exchange an authorization code (OAuth or email confirmation) for a session
    pub async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, BackendError> {
        let body = serde_json::json!({
            "auth_code": auth_code,
            "code_verifier": code_verifier,
        });
        self.grant("pkce", &body).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, BackendError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        self.grant("refresh_token", &body).await
    }

    /// Resolve the user behind an access token
    pub async fn get_user(&self, access_token: &str) -> Result<SupabaseUser, BackendError> {
        let resp = self
            .http
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        Ok(resp.json().await?)
    }

    pub async fn logout(&self, access_token: &str) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        Ok(())
    }

    async fn grant(
        &self,
        grant_type: &str,
        body: &serde_json::Value,
    ) -> Result<TokenResponse, BackendError> {
        let resp = self
            .http
            .post(format!("{}/token?grant_type={}", self.base_url, grant_type))
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        Ok(resp.json().await?)
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_is_sha256_of_verifier() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        assert_eq!(pkce.challenge, challenge_for(&pkce.verifier));
        assert!(!pkce.challenge.contains('='));

        // RFC 7636 appendix B
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn google_url_carries_redirect_and_challenge() {
        let client = AuthClient::new(&Config::for_tests());
        let pkce = Pkce {
            verifier: "v".into(),
            challenge: "abc".into(),
        };
        let url = client.google_authorize_url("http://localhost:3000/auth/callback", &pkce);
        assert!(url.starts_with("http://supabase.test/auth/v1/authorize?provider=google"));
        assert!(url.contains("redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
        assert!(url.contains("code_challenge=abc&code_challenge_method=s256"));
    }

    #[test]
    fn token_response_parses_gotrue_payload() {
        let raw = r#"{
            "access_token": "a", "token_type": "bearer", "expires_in": 3600,
            "refresh_token": "r",
            "user": {"id": "7f1c1f5e-3b7a-4f3e-9a43-9f4f0c6f2a11", "email": "x@y.it", "aud": "authenticated"}
        }"#;
        let t: TokenResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(t.expires_in, 3600);
        assert_eq!(t.user.email.as_deref(), Some("x@y.it"));
    }
}
