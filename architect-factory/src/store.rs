//! Remote record store speaking the D1 `/query` protocol.
//!
//! Every statement is a constant SQL string with `?` placeholders; caller
//! values only ever travel in `params`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::project::{ProjectRecord, StoredProject};

/// Fixed wait ceiling for one store request.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_QUERY_LIMIT: u32 = 100;
pub const DEFAULT_QUERY_LIMIT: u32 = 10;

pub const INSERT_PROJECT_SQL: &str =
    "INSERT INTO projects (name, idea, code, stack, timestamp) VALUES (?, ?, ?, ?, ?)";
pub const LIST_PROJECTS_SQL: &str = "SELECT * FROM projects ORDER BY timestamp DESC LIMIT ?";

/// Row limit for `list_projects`, always within `1..=MAX_QUERY_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimit(u32);

impl QueryLimit {
    pub fn new(requested: i64) -> Self {
        Self(requested.clamp(1, MAX_QUERY_LIMIT as i64) as u32)
    }

    /// Lenient parse for user input: anything non-numeric means the default.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for QueryLimit {
    fn default() -> Self {
        Self(DEFAULT_QUERY_LIMIT)
    }
}

impl From<i64> for QueryLimit {
    fn from(requested: i64) -> Self {
        Self::new(requested)
    }
}

/// Body of a `/query` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<Value>,
}

/// `result[0]` of a `/query` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub meta: Value,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<Vec<QueryResult>>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// Build the insert for a project. The record's text never touches `sql`.
pub fn insert_request(record: &ProjectRecord, timestamp_ms: i64) -> Result<QueryRequest> {
    let name = record.name.trim();
    if name.is_empty() {
        return Err(Error::Validation(
            "project name must be a non-empty string".into(),
        ));
    }
    Ok(QueryRequest {
        sql: INSERT_PROJECT_SQL.to_string(),
        params: vec![
            Value::from(name),
            Value::from(record.idea.as_str()),
            Value::from(record.code.as_str()),
            Value::from(record.stack.as_str()),
            Value::from(timestamp_ms),
        ],
    })
}

pub fn list_request(limit: QueryLimit) -> QueryRequest {
    QueryRequest {
        sql: LIST_PROJECTS_SQL.to_string(),
        params: vec![Value::from(limit.get())],
    }
}

/// Interpret a `/query` response body.
pub fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<QueryResult> {
    let envelope = serde_json::from_str::<Envelope>(body);

    if !status.is_success() {
        let detail = envelope
            .ok()
            .and_then(|e| e.errors.into_iter().next())
            .map(|m| m.message)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(Error::Store(detail));
    }

    let envelope =
        envelope.map_err(|e| Error::Store(format!("invalid response from record store: {e}")))?;

    if envelope.success == Some(false) {
        let detail = envelope
            .errors
            .into_iter()
            .next()
            .map(|m| m.message)
            .unwrap_or_else(|| "record store reported failure".to_string());
        return Err(Error::Store(detail));
    }

    envelope
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| Error::Store("invalid response from record store".into()))
}

/// Capability interface over the primary project store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_project(&self, record: &ProjectRecord) -> Result<QueryResult>;

    async fn list_projects(&self, limit: QueryLimit) -> Result<Vec<StoredProject>>;
}

/// HTTP client for a D1-style database.
pub struct D1Client {
    api_token: String,
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

fn required(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{what} must be a non-empty string")));
    }
    Ok(value.to_string())
}

impl D1Client {
    pub fn new(account_id: &str, api_token: &str, database_id: &str) -> Result<Self> {
        let account_id = required(account_id, "accountId")?;
        let api_token = required(api_token, "apiToken")?;
        let database_id = required(database_id, "databaseId")?;
        Ok(Self {
            api_token,
            base_url: format!(
                "https://api.cloudflare.com/client/v4/accounts/{account_id}/d1/database/{database_id}"
            ),
            timeout: STORE_TIMEOUT,
            http: reqwest::Client::new(),
        })
    }

    /// Point the client at another gateway, e.g. a local test server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one parameterized statement and return `result[0]`.
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<QueryResult> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(Error::Validation("SQL query must be a non-empty string".into()));
        }
        let body = QueryRequest {
            sql: sql.to_string(),
            params,
        };

        let result = self.send(&body).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Record store query failed");
        }
        result
    }

    async fn send(&self, body: &QueryRequest) -> Result<QueryResult> {
        let resp = self
            .http
            .post(format!("{}/query", self.base_url))
            .bearer_auth(&self.api_token)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Store(format!("request timed out after {:?}", self.timeout))
                } else {
                    Error::Store(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Store(e.to_string()))?;
        parse_response(status, &text)
    }
}

#[async_trait]
impl RecordStore for D1Client {
    async fn insert_project(&self, record: &ProjectRecord) -> Result<QueryResult> {
        let req = insert_request(record, Utc::now().timestamp_millis())?;
        self.query(&req.sql, req.params).await
    }

    async fn list_projects(&self, limit: QueryLimit) -> Result<Vec<StoredProject>> {
        let req = list_request(limit);
        let result = self.query(&req.sql, req.params).await?;
        result
            .results
            .into_iter()
            .map(|row| {
                serde_json::from_value::<StoredProject>(row)
                    .map_err(|e| Error::Store(format!("unexpected project row: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn record(name: &str) -> ProjectRecord {
        ProjectRecord {
            name: name.to_string(),
            idea: "{}".to_string(),
            code: "code".to_string(),
            configs: String::new(),
            growth_plan: String::new(),
            stack: "Web".to_string(),
        }
    }

    #[test]
    fn limit_clamps_into_range() {
        assert_eq!(QueryLimit::new(0).get(), 1);
        assert_eq!(QueryLimit::new(-4).get(), 1);
        assert_eq!(QueryLimit::new(500).get(), 100);
        assert_eq!(QueryLimit::new(25).get(), 25);
        assert_eq!(QueryLimit::from(100).get(), 100);
    }

    #[test]
    fn limit_parse_defaults_on_garbage() {
        assert_eq!(QueryLimit::parse(Some("abc")).get(), 10);
        assert_eq!(QueryLimit::parse(None).get(), 10);
        assert_eq!(QueryLimit::parse(Some("")).get(), 10);
        assert_eq!(QueryLimit::parse(Some("0")).get(), 1);
        assert_eq!(QueryLimit::parse(Some(" 500 ")).get(), 100);
        assert_eq!(QueryLimit::parse(Some("42")).get(), 42);
    }

    #[test]
    fn injection_name_stays_a_bound_parameter() {
        let evil = "x'); DROP TABLE projects;--";
        let req = insert_request(&record(evil), 1_700_000_000_000).unwrap();
        assert_eq!(req.sql, INSERT_PROJECT_SQL);
        assert!(!req.sql.contains("DROP"));
        assert_eq!(req.params[0], Value::from(evil));
        assert_eq!(req.params.len(), req.sql.matches('?').count());
    }

    #[test]
    fn insert_requires_name_and_trims_it() {
        assert!(matches!(
            insert_request(&record("   "), 0),
            Err(Error::Validation(_))
        ));
        let req = insert_request(&record("  Foo "), 7).unwrap();
        assert_eq!(req.params[0], "Foo");
        assert_eq!(req.params[3], "Web");
        assert_eq!(req.params[4], 7);
    }

    #[test]
    fn list_binds_limit() {
        let req = list_request(QueryLimit::new(500));
        assert_eq!(req.sql, LIST_PROJECTS_SQL);
        assert_eq!(req.params, vec![Value::from(100u32)]);
    }

    #[test]
    fn constructor_validates_credentials() {
        assert!(matches!(D1Client::new("", "t", "d"), Err(Error::Validation(_))));
        assert!(matches!(D1Client::new("a", " ", "d"), Err(Error::Validation(_))));
        assert!(matches!(D1Client::new("a", "t", ""), Err(Error::Validation(_))));
        let client = D1Client::new(" acct ", "tok", " db ").unwrap();
        assert_eq!(
            client.base_url(),
            "https://api.cloudflare.com/client/v4/accounts/acct/d1/database/db"
        );
    }

    #[test]
    fn parses_first_result() {
        let body = r#"{"result":[{"results":[{"name":"Foo"}],"success":true,"meta":{"changes":1}}],"success":true,"errors":[]}"#;
        let result = parse_response(StatusCode::OK, body).unwrap();
        assert!(result.success);
        assert_eq!(result.results[0]["name"], "Foo");
        assert_eq!(result.meta["changes"], 1);
    }

    #[test]
    fn error_envelopes_become_store_errors() {
        let err = parse_response(
            StatusCode::BAD_REQUEST,
            r#"{"result":null,"success":false,"errors":[{"code":7500,"message":"no such table: projects"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "database operation failed: no such table: projects");

        let err = parse_response(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(err.to_string().contains("502"));

        assert!(matches!(
            parse_response(StatusCode::OK, r#"{"success":true}"#),
            Err(Error::Store(_))
        ));
        assert!(matches!(
            parse_response(StatusCode::OK, r#"{"result":[],"success":true}"#),
            Err(Error::Store(_))
        ));
        assert!(matches!(
            parse_response(StatusCode::OK, r#"{"result":[{}],"success":false,"errors":[]}"#),
            Err(Error::Store(_))
        ));
    }
}
