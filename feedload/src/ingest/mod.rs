pub mod reddit;

use crate::model::{AuthHeaders, RawResponse};
use async_trait::async_trait;
use feedload_core::Result;

/// Items requested per listing; the feed API caps a page at 100.
pub const FEED_LIMIT: u32 = 100;

#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch one listing page from `url`, returned without interpretation
    async fn fetch(&self, url: &str, headers: &AuthHeaders) -> Result<RawResponse>;
}

pub use reddit::RedditFeed;
