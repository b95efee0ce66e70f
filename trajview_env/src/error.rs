//! Error types for the trajview collaborator layer.

use thiserror::Error;

/// Errors that can occur while talking to a collaborator (dataset,
/// simulation backend, point-cloud source).
#[derive(Debug, Error)]
pub enum EnvError {
    /// A requested episode, subset, or observation stream is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// The dataset container exists but its contents are inconsistent
    #[error("Malformed dataset: {0}")]
    Malformed(String),

    /// No backend for this environment type is linked into the build
    #[error("Unsupported environment backend: {0}")]
    Unsupported(String),

    /// A simulation call (reset/step/render) failed
    #[error("Simulation error: {0}")]
    Sim(String),

    /// A point label outside the fixed palette {0, 1, 2}
    #[error("Point label {0} is outside the supported palette {{0, 1, 2}}")]
    BadLabel(u8),

    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset (de)serialization failed
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EnvError {
    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a malformed-dataset error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Creates a simulation error.
    pub fn sim(msg: impl Into<String>) -> Self {
        Self::Sim(msg.into())
    }
}
