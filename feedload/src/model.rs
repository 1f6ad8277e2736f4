use chrono::{NaiveDate, NaiveDateTime};
use feedload_core::config::SourceConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};

/// Column list shared by the insert statement and the bound values.
pub const POST_COLUMNS: [&str; 7] = [
    "title",
    "upvote_ratio",
    "score",
    "ups",
    "domain",
    "num_comments",
    "dt_updated",
];

/// Short-lived OAuth access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Headers attached to every feed request of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub user_agent: String,
    pub token: BearerToken,
}

impl AuthHeaders {
    pub fn authorization(&self) -> String {
        format!("bearer {}", self.token.as_str())
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&self.user_agent)?);
        let mut auth = HeaderValue::from_str(&self.authorization())?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    pub table: String,
}

impl From<&SourceConfig> for FeedSource {
    fn from(config: &SourceConfig) -> Self {
        Self {
            url: config.url.clone(),
            table: config.table.clone(),
        }
    }
}

/// Feed response exactly as received.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub title: String,
    pub upvote_ratio: f64,
    pub score: i64,
    pub ups: u64,
    pub domain: String,
    pub num_comments: u64,
    pub dt_updated: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub source_url: String,
    pub table: String,
    pub records: Vec<PostRecord>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Row counts from one store load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_deleted: u64,
    pub rows_inserted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub tables_loaded: usize,
    pub rows_fetched: usize,
    pub rows_deleted: u64,
    pub rows_inserted: u64,
    pub dry_run: bool,
}
