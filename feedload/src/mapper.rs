//! Shapes a listing response into rows for one destination table.
//!
//! Every entry must carry all six post fields with the right JSON types.
//! The first entry that does not fails the whole batch; nothing is defaulted
//! or skipped.

use crate::model::{PostRecord, RawResponse, RecordBatch};
use chrono::NaiveDateTime;
use feedload_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    // Entries stay untyped here so a bad one can be reported by position.
    children: Vec<Value>,
}

/// Fields read from `children[i].data`; anything else in the entry is ignored.
#[derive(Debug, Deserialize)]
struct PostFields {
    title: String,
    upvote_ratio: f64,
    score: i64,
    ups: u64,
    domain: String,
    num_comments: u64,
}

pub fn map(raw: &RawResponse, table: &str, ingested_at: NaiveDateTime) -> Result<RecordBatch> {
    let listing: Listing = serde_json::from_str(&raw.body).map_err(|e| Error::Mapping {
        source_name: raw.url.clone(),
        index: None,
        details: format!("not a listing response: {e}"),
    })?;

    let records = listing
        .data
        .children
        .into_iter()
        .enumerate()
        .map(|(index, child)| map_entry(&raw.url, index, child, ingested_at))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        source = %raw.url,
        status = raw.status,
        table,
        rows = records.len(),
        "Mapped listing"
    );

    Ok(RecordBatch {
        source_url: raw.url.clone(),
        table: table.to_string(),
        records,
    })
}

fn map_entry(
    source: &str,
    index: usize,
    mut child: Value,
    ingested_at: NaiveDateTime,
) -> Result<PostRecord> {
    let mapping_error = |details: String| Error::Mapping {
        source_name: source.to_string(),
        index: Some(index),
        details,
    };

    let data = child
        .get_mut("data")
        .filter(|d| d.is_object())
        .map(Value::take)
        .ok_or_else(|| mapping_error("entry has no data object".into()))?;

    let post: PostFields =
        serde_json::from_value(data).map_err(|e| mapping_error(e.to_string()))?;

    if !(0.0..=1.0).contains(&post.upvote_ratio) {
        return Err(mapping_error(format!(
            "upvote_ratio {} is outside [0, 1]",
            post.upvote_ratio
        )));
    }

    Ok(PostRecord {
        title: post.title,
        upvote_ratio: post.upvote_ratio,
        score: post.score,
        ups: post.ups,
        domain: post.domain,
        num_comments: post.num_comments,
        dt_updated: ingested_at,
    })
}
