use crate::auth::RedditAuth;
use crate::ingest::RedditFeed;
use crate::model::{FeedSource, RunSummary};
use crate::pipeline::Pipeline;
use crate::store::{MySqlStore, RecordStore};
use feedload_core::{Config, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub struct App {
    pipeline: Pipeline,
}

impl App {
    #[instrument(skip(config))]
    pub async fn new(config: &Config) -> Result<Self> {
        info!("Initializing application");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .connect_timeout(Duration::from_secs(config.http.connect_timeout_secs))
            .user_agent(config.reddit.user_agent.as_str())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let store = Arc::new(MySqlStore::new(&config.database));

        // A dry run never touches the database
        if !config.pipeline.dry_run {
            info!("Performing health checks");
            store.health_check().await?;
        }

        let sources = config.sources.iter().map(FeedSource::from).collect();

        let pipeline = Pipeline::new(
            Arc::new(RedditAuth::new(http.clone(), config.reddit.clone())),
            Arc::new(RedditFeed::new(http)),
            store,
            sources,
            config.pipeline.clone(),
        );

        Ok(Self { pipeline })
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.pipeline.run().await
    }
}
