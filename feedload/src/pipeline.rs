use crate::auth::TokenProvider;
use crate::ingest::FeedClient;
use crate::mapper;
use crate::model::{FeedSource, LoadStats, RecordBatch, RunSummary};
use crate::store::RecordStore;
use chrono::{Local, NaiveDateTime};
use feedload_core::config::PipelineConfig;
use feedload_core::Result;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One pass over every source: token, fetch and map all, then load.
///
/// No table is touched until every source has been fetched and mapped. With
/// `atomic_load` the store work is a single transaction; without it each
/// delete and insert commits on its own.
pub struct Pipeline {
    auth: Arc<dyn TokenProvider>,
    feed: Arc<dyn FeedClient>,
    store: Arc<dyn RecordStore>,
    sources: Vec<FeedSource>,
    config: PipelineConfig,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Pipeline {
    pub fn new(
        auth: Arc<dyn TokenProvider>,
        feed: Arc<dyn FeedClient>,
        store: Arc<dyn RecordStore>,
        sources: Vec<FeedSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            auth,
            feed,
            store,
            sources,
            config,
            clock: local_now,
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn run(&self) -> Result<RunSummary> {
        let run_date = (self.clock)().date();

        info!("Fetching Reddit data...");
        let batches = self.extract().await?;
        let rows_fetched = batches.iter().map(RecordBatch::len).sum();

        if self.config.dry_run {
            for batch in &batches {
                info!(table = %batch.table, rows = batch.len(), "Dry run, not loading");
            }
            return Ok(RunSummary {
                run_date,
                tables_loaded: 0,
                rows_fetched,
                rows_deleted: 0,
                rows_inserted: 0,
                dry_run: true,
            });
        }

        let stats = if self.config.atomic_load {
            self.store.replace_today(&batches).await?
        } else {
            self.load_each(&batches).await?
        };

        info!(
            tables = batches.len(),
            rows = stats.rows_inserted,
            "All tables loaded successfully for {run_date}"
        );

        Ok(RunSummary {
            run_date,
            tables_loaded: batches.len(),
            rows_fetched,
            rows_deleted: stats.rows_deleted,
            rows_inserted: stats.rows_inserted,
            dry_run: false,
        })
    }

    async fn extract(&self) -> Result<Vec<RecordBatch>> {
        let headers = self.auth.acquire_token().await?;

        let mut batches = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let raw = self.feed.fetch(&source.url, &headers).await?;
            let batch = mapper::map(&raw, &source.table, (self.clock)())?;
            debug!(
                source = %source.url,
                table = %source.table,
                rows = batch.len(),
                "Fetched source"
            );
            batches.push(batch);
        }

        Ok(batches)
    }

    async fn load_each(&self, batches: &[RecordBatch]) -> Result<LoadStats> {
        let mut stats = LoadStats::default();

        info!("Deleting today's existing data...");
        for batch in batches {
            stats.rows_deleted += self.store.delete_today(&batch.table).await?;
        }

        info!("Loading data into MySQL...");
        for batch in batches {
            stats.rows_inserted += self.store.bulk_insert(&batch.table, &batch.records).await?;
        }

        Ok(stats)
    }
}
