use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "feedload.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub reddit: RedditConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
    pub telemetry: TelemetryConfig,
    // Kept out of the defaults layer so a configured list replaces it whole.
    #[serde(default = "default_sources", skip_serializing)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_timeout_secs: u64,
    pub statement_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    /// Token endpoint, e.g. `https://www.reddit.com/api/v1/access_token`.
    pub access_url: String,
    pub grant_type: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Run the whole delete+insert phase in a single transaction.
    pub atomic_load: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}

/// One feed endpoint and the table its posts are loaded into.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub url: String,
    pub table: String,
}

// Plain variables the deployment already exports, mapped onto config keys.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("MYSQL_HOST", "database.host"),
    ("MYSQL_PORT", "database.port"),
    ("MYSQL_USER", "database.user"),
    ("MYSQL_PASSWORD", "database.password"),
    ("MYSQL_DATABASE", "database.database"),
    ("REDDIT_CLIENT_ID", "reddit.client_id"),
    ("REDDIT_CLIENT_SECRET", "reddit.client_secret"),
    ("REDDIT_USERNAME", "reddit.username"),
    ("REDDIT_PASSWORD", "reddit.password"),
    ("REDDIT_BASE_ACCESS_URL", "reddit.access_url"),
];

impl Config {
    /// Loads defaults, then `feedload.toml` (or `path`), then `FEEDLOAD__*`
    /// variables, then the plain `MYSQL_*` / `REDDIT_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Load default configuration
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // Layer on config file; an explicit path must exist
        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        // Layer on environment variables (FEEDLOAD_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("FEEDLOAD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let settings: Config = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("database.host", &self.database.host),
            ("database.user", &self.database.user),
            ("database.database", &self.database.database),
            ("reddit.client_id", &self.reddit.client_id),
            ("reddit.client_secret", &self.reddit.client_secret),
            ("reddit.username", &self.reddit.username),
            ("reddit.password", &self.reddit.password),
            ("reddit.access_url", &self.reddit.access_url),
            ("reddit.grant_type", &self.reddit.grant_type),
            ("reddit.user_agent", &self.reddit.user_agent),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{key} is required")));
            }
        }

        check_http_url("reddit.access_url", &self.reddit.access_url)?;

        if self.http.timeout_secs == 0 || self.http.connect_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "http timeouts must be greater than 0".into(),
            ));
        }

        if self.database.connect_timeout_secs == 0 || self.database.statement_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "database timeouts must be greater than 0".into(),
            ));
        }

        if self.sources.is_empty() {
            return Err(ConfigError::Message(
                "at least one source is required".into(),
            ));
        }

        let mut tables = HashSet::new();
        for source in &self.sources {
            check_http_url("sources.url", &source.url)?;
            if !is_valid_table_name(&source.table) {
                return Err(ConfigError::Message(format!(
                    "invalid table name {:?}",
                    source.table
                )));
            }
            if !tables.insert(source.table.as_str()) {
                return Err(ConfigError::Message(format!(
                    "table {} is used by more than one source",
                    source.table
                )));
            }
        }

        Ok(())
    }
}

fn check_http_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ConfigError::Message(format!("{key} {raw:?} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Message(format!(
            "{key} {raw:?} has unsupported scheme {other}"
        ))),
    }
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 64
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_sources() -> Vec<SourceConfig> {
    [
        ("news", "r_news"),
        ("nottheonion", "not_the_onion"),
        ("offbeat", "offbeat"),
        ("thenews", "the_news"),
        ("usnews", "us_news"),
        ("fullnews", "full_news"),
        ("qualitynews", "quality_news"),
        ("UpliftingNews", "uplifting_news"),
        ("inthenews", "in_the_news"),
    ]
    .into_iter()
    .map(|(subreddit, table)| SourceConfig {
        url: format!("https://oauth.reddit.com/r/{subreddit}/top?t=day"),
        table: table.to_string(),
    })
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: String::new(),
                password: String::new(),
                database: String::new(),
                connect_timeout_secs: 10,
                statement_timeout_secs: 60,
            },
            reddit: RedditConfig {
                client_id: String::new(),
                client_secret: String::new(),
                username: String::new(),
                password: String::new(),
                access_url: "https://www.reddit.com/api/v1/access_token".to_string(),
                grant_type: "client_credentials".to_string(),
                user_agent: "News/0.0.1".to_string(),
            },
            http: HttpConfig {
                timeout_secs: 30,
                connect_timeout_secs: 10,
            },
            pipeline: PipelineConfig {
                atomic_load: true,
                dry_run: false,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Compact,
            },
            sources: default_sources(),
        }
    }
}
