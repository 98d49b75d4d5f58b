//! Thin PostgREST query builder
//!
//! Domain modules build queries with `db.from("table")`, chain filters and
//! finish with one of the async terminal calls:
//!
//! ```ignore
//! let rows: Vec<Word> = state
//!     .db
//!     .from("words")
//!     .select("id,text")
//!     .order("text", true)
//!     .auth(&session)
//!     .fetch()
//!     .await?;
//! ```
//!
//! Requests without `.auth(..)` run with the anon key, so only rows the
//! public policies expose come back.

use reqwest::{Client, Method, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};

use super::error::BackendError;
use super::session::AuthSession;
use crate::config::Config;

#[derive(Clone)]
pub struct Postgrest {
    base_url: String,
    anon_key: String,
    http: Client,
}

impl Postgrest {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: format!("{}/rest/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            http: Client::new(),
        }
    }

    pub fn from(&self, table: &str) -> Query<'_> {
        Query {
            client: self,
            table: table.to_string(),
            params: Vec::new(),
            bearer: None,
        }
    }
}

pub struct Query<'a> {
    client: &'a Postgrest,
    table: String,
    params: Vec<(String, String)>,
    bearer: Option<String>,
}

impl Query<'_> {
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".into(), columns.into()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.into(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn gt(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.into(), format!("gt.{}", value.to_string())));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        self.params.push(("order".into(), format!("{column}.{dir}")));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".into(), n.to_string()));
        self
    }

    /// Run as the signed-in user so row-level security applies
    pub fn auth(mut self, session: &AuthSession) -> Self {
        self.bearer = Some(session.access_token.clone());
        self
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let bearer = self.bearer.as_deref().unwrap_or(&self.client.anon_key);
        self.client
            .http
            .request(method, format!("{}/{}", self.client.base_url, self.table))
            .query(&self.params)
            .header("apikey", &self.client.anon_key)
            .bearer_auth(bearer)
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, BackendError> {
        let resp = self.request(Method::GET).send().await?;
        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        Ok(resp.json().await?)
    }

    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>, BackendError> {
        let rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    /// Exact row count without transferring rows
    pub async fn count(self) -> Result<i64, BackendError> {
        let resp = self
            .request(Method::HEAD)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        resp.headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| BackendError::Api {
                status: resp.status().as_u16(),
                message: "missing Content-Range total".into(),
            })
    }

    /// Insert one row and return it as stored
    pub async fn insert<B: Serialize, T: DeserializeOwned>(
        self,
        body: &B,
    ) -> Result<T, BackendError> {
        let resp = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }

        let mut rows: Vec<T> = resp.json().await?;
        if rows.is_empty() {
            return Err(BackendError::Api {
                status: 201,
                message: format!("insert into {} returned no row", self.table),
            });
        }
        Ok(rows.swap_remove(0))
    }

    /// Patch matching rows; returns how many were touched
    pub async fn update<B: Serialize>(self, body: &B) -> Result<usize, BackendError> {
        let resp = self
            .request(Method::PATCH)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(rows.len())
    }

    /// Delete matching rows; returns how many were removed
    pub async fn delete(self) -> Result<usize, BackendError> {
        let resp = self
            .request(Method::DELETE)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::from_response(resp).await);
        }
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(rows.len())
    }
}

/// `0-9/42` -> 42, `*/0` -> 0
fn parse_content_range_total(header: &str) -> Option<i64> {
    header.rsplit_once('/')?.1.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("0-9/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn filters_become_postgrest_params() {
        let db = Postgrest::new(&Config::for_tests());
        let q = db
            .from("contributions")
            .select("id,video_url")
            .eq("is_approved", false)
            .gt("total_uploads", 0)
            .order("created_at", false)
            .limit(10);

        assert_eq!(
            q.params,
            vec![
                ("select".to_string(), "id,video_url".to_string()),
                ("is_approved".to_string(), "eq.false".to_string()),
                ("total_uploads".to_string(), "gt.0".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
        assert!(q.bearer.is_none());
    }
}
