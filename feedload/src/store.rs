use crate::model::{LoadStats, PostRecord, RecordBatch, POST_COLUMNS};
use async_trait::async_trait;
use feedload_core::config::{is_valid_table_name, DatabaseConfig};
use feedload_core::{Error, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, MySql, QueryBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// MySQL allows 65535 placeholders per statement; 7 per row.
const INSERT_CHUNK_ROWS: usize = 5000;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Remove rows of `table` whose `dt_updated` falls on the server's current date
    async fn delete_today(&self, table: &str) -> Result<u64>;

    /// Insert every record into `table`
    async fn bulk_insert(&self, table: &str, records: &[PostRecord]) -> Result<u64>;

    /// Delete today's rows of every batch's table, then insert every batch,
    /// committing once at the end
    async fn replace_today(&self, batches: &[RecordBatch]) -> Result<LoadStats>;

    async fn health_check(&self) -> Result<()>;
}

/// Opens a fresh connection for every operation and closes it afterwards.
pub struct MySqlStore {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl MySqlStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            // Keep the server's zone so CURDATE() matches the local ingestion clock
            .timezone(None::<String>);

        Self::with_options(
            options,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.statement_timeout_secs),
        )
    }

    pub fn with_options(
        options: MySqlConnectOptions,
        connect_timeout: Duration,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            options,
            connect_timeout,
            statement_timeout,
        }
    }

    async fn connect(&self, table: &str) -> Result<MySqlConnection> {
        match tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&self.options)).await {
            Ok(conn) => conn.map_err(|e| Error::store(table, format!("connect failed: {e}"))),
            Err(_) => Err(Error::store(
                table,
                format!("connect timed out after {}s", self.connect_timeout.as_secs()),
            )),
        }
    }

    async fn bounded<T, F>(&self, table: &str, operation: F) -> Result<T>
    where
        F: Future<Output = sqlx::Result<T>>,
    {
        match tokio::time::timeout(self.statement_timeout, operation).await {
            Ok(result) => result.map_err(|e| Error::store(table, e)),
            Err(_) => Err(Error::store(
                table,
                format!("statement timed out after {}s", self.statement_timeout.as_secs()),
            )),
        }
    }

    async fn close(conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close database connection cleanly");
        }
    }
}

fn ensure_table_name(table: &str) -> Result<()> {
    if is_valid_table_name(table) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid table name {table:?}")))
    }
}

async fn delete_today_in(conn: &mut MySqlConnection, table: &str) -> sqlx::Result<u64> {
    let sql = format!("DELETE FROM {table} WHERE DATE(dt_updated) = CURDATE()");
    let result = sqlx::query(&sql).execute(conn).await?;
    Ok(result.rows_affected())
}

async fn insert_in(
    conn: &mut MySqlConnection,
    table: &str,
    records: &[PostRecord],
) -> sqlx::Result<u64> {
    let mut inserted = 0;

    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new(format!("INSERT INTO {table} ({}) ", POST_COLUMNS.join(", ")));

        // Bind order follows POST_COLUMNS
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(record.title.clone())
                .push_bind(record.upvote_ratio)
                .push_bind(record.score)
                .push_bind(record.ups)
                .push_bind(record.domain.clone())
                .push_bind(record.num_comments)
                .push_bind(record.dt_updated);
        });

        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(inserted)
}

#[async_trait]
impl RecordStore for MySqlStore {
    #[instrument(skip(self))]
    async fn delete_today(&self, table: &str) -> Result<u64> {
        ensure_table_name(table)?;
        let mut conn = self.connect(table).await?;

        let mut tx = self.bounded(table, conn.begin()).await?;
        let deleted = self.bounded(table, delete_today_in(&mut *tx, table)).await?;
        self.bounded(table, tx.commit()).await?;

        Self::close(conn).await;
        debug!(deleted, "Deleted today's rows");
        Ok(deleted)
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn bulk_insert(&self, table: &str, records: &[PostRecord]) -> Result<u64> {
        ensure_table_name(table)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect(table).await?;

        let mut tx = self.bounded(table, conn.begin()).await?;
        let inserted = self.bounded(table, insert_in(&mut *tx, table, records)).await?;
        self.bounded(table, tx.commit()).await?;

        Self::close(conn).await;
        debug!(inserted, "Inserted rows");
        Ok(inserted)
    }

    #[instrument(skip(self, batches), fields(tables = batches.len()))]
    async fn replace_today(&self, batches: &[RecordBatch]) -> Result<LoadStats> {
        let Some(first) = batches.first() else {
            return Ok(LoadStats::default());
        };
        for batch in batches {
            ensure_table_name(&batch.table)?;
        }

        let mut conn = self.connect(&first.table).await?;
        let mut tx = self.bounded(&first.table, conn.begin()).await?;
        let mut stats = LoadStats::default();

        info!("Deleting today's existing data...");
        for batch in batches {
            let deleted = self
                .bounded(&batch.table, delete_today_in(&mut *tx, &batch.table))
                .await?;
            debug!(table = %batch.table, deleted, "Deleted today's rows");
            stats.rows_deleted += deleted;
        }

        info!("Loading data into MySQL...");
        for batch in batches.iter().filter(|b| !b.is_empty()) {
            let inserted = self
                .bounded(&batch.table, insert_in(&mut *tx, &batch.table, &batch.records))
                .await?;
            debug!(table = %batch.table, source = %batch.source_url, inserted, "Inserted rows");
            stats.rows_inserted += inserted;
        }

        // Dropping an uncommitted transaction rolls it back, so any early
        // return above leaves every table untouched.
        self.bounded(&first.table, tx.commit()).await?;
        Self::close(conn).await;

        Ok(stats)
    }

    async fn health_check(&self) -> Result<()> {
        const LABEL: &str = "health check";
        let mut conn = self.connect(LABEL).await?;
        self.bounded(LABEL, sqlx::query("SELECT 1").execute(&mut conn))
            .await?;
        Self::close(conn).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveDate};
    use sqlx::Row;
    use std::str::FromStr;

    const TABLE: &str = "feedload_it_posts";

    fn record(title: &str, at: chrono::NaiveDateTime) -> PostRecord {
        PostRecord {
            title: title.into(),
            upvote_ratio: 0.75,
            score: -3,
            ups: 9,
            domain: "example.com".into(),
            num_comments: 2,
            dt_updated: at,
        }
    }

    #[tokio::test]
    async fn rejects_unsafe_table_before_connecting() {
        // Unroutable options: the name check has to fail first.
        let store = MySqlStore::with_options(
            MySqlConnectOptions::new().host("203.0.113.1"),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        let err = store.delete_today("posts; DROP TABLE x").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn empty_insert_issues_no_statement() {
        let store = MySqlStore::with_options(
            MySqlConnectOptions::new().host("203.0.113.1"),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        assert_eq!(store.bulk_insert("r_news", &[]).await.unwrap(), 0);
    }

    async fn test_store() -> Option<(MySqlStore, MySqlConnection)> {
        let url = std::env::var("FEEDLOAD_TEST_DATABASE_URL").ok()?;
        let options = MySqlConnectOptions::from_str(&url)
            .expect("valid database url")
            .timezone(None::<String>);
        let mut conn = MySqlConnection::connect_with(&options).await.expect("connect");
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                title TEXT NOT NULL,
                upvote_ratio DOUBLE NOT NULL,
                score BIGINT NOT NULL,
                ups BIGINT UNSIGNED NOT NULL,
                domain VARCHAR(255) NOT NULL,
                num_comments BIGINT UNSIGNED NOT NULL,
                dt_updated DATETIME NOT NULL
            )"
        ))
        .execute(&mut conn)
        .await
        .expect("create table");
        sqlx::query(&format!("TRUNCATE TABLE {TABLE}"))
            .execute(&mut conn)
            .await
            .expect("truncate");
        let store = MySqlStore::with_options(options, Duration::from_secs(5), Duration::from_secs(30));
        Some((store, conn))
    }

    async fn titles(conn: &mut MySqlConnection) -> Vec<String> {
        sqlx::query(&format!("SELECT title FROM {TABLE} ORDER BY title"))
            .fetch_all(conn)
            .await
            .expect("select")
            .iter()
            .map(|row| row.get::<String, _>("title"))
            .collect()
    }

    #[tokio::test]
    #[ignore = "needs FEEDLOAD_TEST_DATABASE_URL pointing at a scratch MySQL database"]
    async fn same_day_rerun_replaces_rather_than_appends() {
        let Some((store, mut conn)) = test_store().await else {
            return;
        };
        let now = Local::now().naive_local();
        let old = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        store.bulk_insert(TABLE, &[record("old", old)]).await.unwrap();
        store
            .bulk_insert(TABLE, &[record("first-a", now), record("first-b", now)])
            .await
            .unwrap();

        assert_eq!(store.delete_today(TABLE).await.unwrap(), 2);
        store
            .bulk_insert(TABLE, &[record("second", now)])
            .await
            .unwrap();

        assert_eq!(titles(&mut conn).await, vec!["old", "second"]);
    }

    #[tokio::test]
    #[ignore = "needs FEEDLOAD_TEST_DATABASE_URL pointing at a scratch MySQL database"]
    async fn replace_today_rolls_back_on_failure() {
        let Some((store, mut conn)) = test_store().await else {
            return;
        };
        let now = Local::now().naive_local();
        store.bulk_insert(TABLE, &[record("kept", now)]).await.unwrap();

        let batches = vec![
            RecordBatch {
                source_url: "https://example.com/a".into(),
                table: TABLE.into(),
                records: vec![record("replacement", now)],
            },
            RecordBatch {
                source_url: "https://example.com/b".into(),
                table: "feedload_it_missing_table".into(),
                records: vec![record("never", now)],
            },
        ];

        let err = store.replace_today(&batches).await.unwrap_err();
        assert_eq!(err.stage(), "store");
        assert_eq!(titles(&mut conn).await, vec!["kept"]);
    }
}
