//! Error types for GeoSite

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeositeError {
    // Dataset errors
    #[error("Dataset not found at {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Invalid dataset: {reason}")]
    DatasetInvalid { reason: String },

    // Collaborator errors
    #[error("Embedder unavailable: {reason}. Try: {remediation}")]
    EmbedderUnavailable {
        reason: String,
        remediation: String,
    },

    #[error("Language model unavailable: {reason}. Try: {remediation}")]
    LanguageModelUnavailable {
        reason: String,
        remediation: String,
    },

    #[error("Malformed collaborator response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Probability source unavailable: {reason}")]
    ProbabilitySourceUnavailable { reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GeositeError {
    /// Whether this error aborts a selection run before retrieval starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, GeositeError::ConfigMissing { .. } | GeositeError::ConfigInvalid { .. })
    }
}

impl From<serde_json::Error> for GeositeError {
    fn from(err: serde_json::Error) -> Self {
        GeositeError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeositeError>;
