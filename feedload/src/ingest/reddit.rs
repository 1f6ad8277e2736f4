use super::{FeedClient, FEED_LIMIT};
use crate::model::{AuthHeaders, RawResponse};
use async_trait::async_trait;
use feedload_core::{Error, Result};
use tracing::{debug, instrument};

pub struct RedditFeed {
    http: reqwest::Client,
}

impl RedditFeed {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FeedClient for RedditFeed {
    #[instrument(skip(self, headers))]
    async fn fetch(&self, url: &str, headers: &AuthHeaders) -> Result<RawResponse> {
        let header_map = headers
            .to_header_map()
            .map_err(|e| Error::fetch(url, format!("invalid request header: {e}")))?;

        let response = self
            .http
            .get(url)
            .headers(header_map)
            .query(&[("limit", FEED_LIMIT)])
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(url, format!("failed to read body: {e}")))?;

        debug!(status = status.as_u16(), bytes = body.len(), "Fetched listing");

        Ok(RawResponse {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
