//! Error types
//!
//! Typed errors for the request, cache and schema layers. Failures that have
//! a defined fallback are recovered before they reach the generator's caller,
//! so only [`SchemaError`] normally escapes the library.

use thiserror::Error;

/// Errors raised by the provider HTTP layer
#[derive(Error, Debug)]
pub enum RequestError {
    /// Non-429 error status; never retried
    #[error("API request failed: {status} ({url})")]
    Status { status: u16, url: String },

    /// Rate limiting or transient network failures outlasted the retry budget
    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RequestError {
    /// Whether a transport error should be retried
    pub fn is_transient(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }
}

/// Errors raised by the resource cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid cache entry: {0}")]
    Invalid(String),
}

/// Errors raised while wiring a schema into editor settings
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Schema file not found: {0} (run `cloudschema generate -o` first)")]
    MissingSchema(std::path::PathBuf),

    #[error("Existing settings are not a JSON object: {0}")]
    InvalidSettings(std::path::PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to callers of the schema generator
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No providers available for schema generation")]
    NoProviders,

    #[error("Invalid base schema: {0}")]
    InvalidBaseSchema(String),

    #[error("Schema could not be compiled: {0}")]
    Compile(String),
}

pub type Result<T, E = SchemaError> = std::result::Result<T, E>;
