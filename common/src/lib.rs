use thiserror::Error;
use url::ParseError;

pub mod channel;
pub mod config;
pub mod level;
pub mod storage;
pub mod telemetry;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] rquest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Snapshot store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid Uri: {0}")]
    InvalidUri(String),
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::StoreUnavailable(format!("Object store error: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidUri(format!("URL parse error: {}", err))
    }
}
