use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("fetch from {url} failed: {details}")]
    Fetch { url: String, details: String },

    #[error("mapping error in {source_name}{}: {details}", entry_suffix(.index))]
    Mapping {
        source_name: String,
        index: Option<usize>,
        details: String,
    },

    #[error("store error on {table}: {details}")]
    Store { table: String, details: String },
}

pub type Result<T> = std::result::Result<T, Error>;

fn entry_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (entry {i})"),
        None => String::new(),
    }
}

impl Error {
    /// Pipeline stage the error belongs to, for the fatal log line.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::Validation(_) => "config",
            Error::Authentication(_) => "auth",
            Error::Fetch { .. } => "fetch",
            Error::Mapping { .. } => "map",
            Error::Store { .. } => "store",
        }
    }

    pub fn store(table: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Error::Store {
            table: table.into(),
            details: details.to_string(),
        }
    }

    pub fn fetch(url: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Error::Fetch {
            url: url.into(),
            details: details.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_message_names_the_entry() {
        let err = Error::Mapping {
            source_name: "https://oauth.reddit.com/r/news/top".into(),
            index: Some(3),
            details: "missing field `ups`".into(),
        };
        assert_eq!(
            err.to_string(),
            "mapping error in https://oauth.reddit.com/r/news/top (entry 3): missing field `ups`"
        );
        assert_eq!(err.stage(), "map");
    }

    #[test]
    fn envelope_mapping_error_has_no_entry() {
        let err = Error::Mapping {
            source_name: "src".into(),
            index: None,
            details: "expected value".into(),
        };
        assert_eq!(err.to_string(), "mapping error in src: expected value");
    }

    #[test]
    fn stages() {
        assert_eq!(Error::Authentication("x".into()).stage(), "auth");
        assert_eq!(Error::fetch("u", "404").stage(), "fetch");
        assert_eq!(Error::store("t", "gone").stage(), "store");
        assert_eq!(Error::Config("x".into()).stage(), "config");
    }
}
