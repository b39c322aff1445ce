use std::path::PathBuf;
use thiserror::Error;

/// Common error types for the load-testing harness
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Users CSV file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("No users found in CSV file: {}", .0.display())]
    EmptyData(PathBuf),

    #[error("No users available in the list")]
    Exhausted,

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for harness operations
pub type LoadResult<T> = Result<T, LoadError>;

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        LoadError::Csv(err.to_string())
    }
}

impl From<toml::de::Error> for LoadError {
    fn from(err: toml::de::Error) -> Self {
        LoadError::Config(err.to_string())
    }
}

impl From<regex::Error> for LoadError {
    fn from(err: regex::Error) -> Self {
        LoadError::Config(format!("Invalid token pattern: {}", err))
    }
}
