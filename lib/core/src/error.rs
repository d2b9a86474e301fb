use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot fit vectorizer: corpus is empty")]
    EmptyCorpus,

    #[error("Cannot fit vectorizer: corpus contains no indexable terms")]
    EmptyVocabulary,

    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),

    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("Invalid result limit: expected k >= 1, got {0}")]
    InvalidLimit(usize),

    #[error("Data integrity fault: {0}")]
    DataIntegrity(String),
}

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Startup problem with the catalog or settings. Not retried.
    Configuration,
    /// The request itself was bad; nothing was touched.
    Validation,
    /// Catalog invariants were violated.
    DataIntegrity,
    /// The answer-extraction capability failed or timed out.
    ExternalCapability,
    /// The addressed session does not exist.
    NotFound,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyQuery | Error::InvalidLimit(_) => ErrorKind::Validation,
            Error::DataIntegrity(_) => ErrorKind::DataIntegrity,
            Error::InvalidConfig(_)
            | Error::EmptyCorpus
            | Error::EmptyVocabulary
            | Error::MalformedCatalog(_) => ErrorKind::Configuration,
        }
    }
}
