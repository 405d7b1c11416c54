use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error("Schema generation failed: {0}")]
    SchemaGeneration(String),

    #[error("Oracle call failed: {0}")]
    Oracle(String),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Corrupt raw record {path:?}: {details}")]
    CorruptRecord { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not derive a report year from file name: {0}")]
    InvalidFileName(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid year pattern: {0}")]
    RegexError(#[from] regex::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConsolidationError>;
