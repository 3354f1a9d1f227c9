//! Unified error handling for the client.

use crate::config::ConfigError;
use parse_engine::{ClassName, ObjectId};

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] parse_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error body returned by the server.
    #[error("Parse error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Per-object failures of a batched save.
    #[error("{} of the batched saves failed", .0.len())]
    Aggregate(Vec<BatchFailure>),

    #[error("No user is logged in")]
    NotLoggedIn,

    #[error("Unsaved {0} objects reference each other")]
    CircularReference(ClassName),
}

/// One failed object within a batched save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the object in the slice passed to `save_all`
    pub index: usize,
    pub class_name: ClassName,
    pub object_id: Option<ObjectId>,
    pub code: i64,
    pub message: String,
}

/// Result type alias for client calls.
pub type Result<T> = std::result::Result<T, ClientError>;
