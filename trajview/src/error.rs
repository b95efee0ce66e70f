//! Error types for the replay pipeline.

use thiserror::Error;
use trajview_env::EnvError;

/// Errors that can abort a playback run.
///
/// Trajectory divergence during action playback is deliberately not
/// here: it is a warning signal, never an error.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Mutually-exclusive or missing run options, detected before any
    /// episode is processed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A dataset subset, episode, or observation stream is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// No camera/sensor names could be resolved for this run
    #[error("No usable camera/sensor names: {0}")]
    MissingModality(String),

    /// The video sink or encoder failed
    #[error("Video error: {0}")]
    Video(String),

    /// A collaborator call failed
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a missing-modality error.
    pub fn missing_modality(msg: impl Into<String>) -> Self {
        Self::MissingModality(msg.into())
    }

    /// Creates a video-sink error.
    pub fn video(msg: impl Into<String>) -> Self {
        Self::Video(msg.into())
    }
}
