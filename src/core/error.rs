use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchitectError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Model call failed: {0}")]
    TransportError(String),
    #[error("Cannot parse MutationPartial payload: {message}\n{excerpt}")]
    ParseError { message: String, excerpt: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
