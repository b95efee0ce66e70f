//! Recorded-trajectory dataset interface.
//!
//! A dataset owns a set of episodes, each an ordered sequence of
//! simulation states, an action sequence, and named per-step
//! observation streams. The pipeline only ever reads; authoring is
//! out of scope.
//!
//! [`JsonDataset`] is a self-contained serde implementation of the
//! container, standing in for the original HDF5 storage behind the
//! same access pattern.

use std::collections::BTreeMap;
use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::env::EnvMeta;
use crate::error::EnvError;

/// One recorded sensor raster at one time step.
///
/// Image streams store channel values in 0..=255; depth streams store
/// a single metric channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
    /// Row-major, channel-interleaved samples, `height * width * channels` long
    pub data: Vec<f32>,
}

impl RawFrame {
    /// Interprets the frame as an 8-bit RGB raster.
    pub fn to_rgb(&self) -> Result<RgbImage, EnvError> {
        if self.channels != 3 {
            return Err(EnvError::malformed(format!(
                "expected a 3-channel frame, got {} channels",
                self.channels
            )));
        }
        let expected = (self.height * self.width * self.channels) as usize;
        if self.data.len() != expected {
            return Err(EnvError::malformed(format!(
                "frame data length {} does not match {}x{}x{}",
                self.data.len(),
                self.height,
                self.width,
                self.channels
            )));
        }
        let bytes: Vec<u8> = self.data.iter().map(|v| v.clamp(0.0, 255.0) as u8).collect();
        RgbImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| EnvError::malformed("frame buffer size mismatch"))
    }
}

/// An ordered per-step observation stream.
///
/// The two structurally different sensor families are a tagged
/// variant rather than duck-typed key sniffing, so every consumer
/// handles both cases exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObsSequence {
    /// One raster per step (camera images, depth maps)
    Frames { frames: Vec<RawFrame> },
    /// One parameter vector per step (joint angles, scene parameters)
    Vectors { values: Vec<Vec<f64>> },
}

impl ObsSequence {
    /// Number of recorded steps in the stream.
    pub fn len(&self) -> usize {
        match self {
            ObsSequence::Frames { frames } => frames.len(),
            ObsSequence::Vectors { values } => values.len(),
        }
    }

    /// Whether the stream has no steps.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One recorded interaction trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Flat simulation state per step
    pub states: Vec<Vec<f64>>,

    /// Recorded action per step
    pub actions: Vec<Vec<f64>>,

    /// Opaque scene descriptor (model XML) for backends that need it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_file: Option<String>,

    /// Named observation streams
    #[serde(default)]
    pub obs: BTreeMap<String, ObsSequence>,
}

impl Episode {
    /// Observation stream names, in stable order.
    pub fn obs_names(&self) -> impl Iterator<Item = &str> {
        self.obs.keys().map(|k| k.as_str())
    }

    /// Looks up a vector-typed stream.
    pub fn vectors(&self, name: &str) -> Result<&[Vec<f64>], EnvError> {
        match self.obs.get(name) {
            Some(ObsSequence::Vectors { values }) => Ok(values),
            Some(ObsSequence::Frames { .. }) => Err(EnvError::malformed(format!(
                "observation stream '{}' is frame-typed, expected vectors",
                name
            ))),
            None => Err(EnvError::not_found(format!("observation stream '{}'", name))),
        }
    }

    /// Looks up a frame-typed stream.
    pub fn frames(&self, name: &str) -> Result<&[RawFrame], EnvError> {
        match self.obs.get(name) {
            Some(ObsSequence::Frames { frames }) => Ok(frames),
            Some(ObsSequence::Vectors { .. }) => Err(EnvError::malformed(format!(
                "observation stream '{}' is vector-typed, expected frames",
                name
            ))),
            None => Err(EnvError::not_found(format!("observation stream '{}'", name))),
        }
    }
}

/// Read-only access to a trajectory dataset.
pub trait DatasetReader {
    /// All episode identifiers, in storage order.
    fn episode_ids(&self) -> Vec<String>;

    /// Episode identifiers belonging to a named subset.
    fn mask(&self, name: &str) -> Result<Vec<String>, EnvError>;

    /// Retrieves one episode by identifier.
    fn episode(&self, id: &str) -> Result<&Episode, EnvError>;

    /// Environment metadata recorded with the dataset.
    fn env_meta(&self) -> &EnvMeta;
}

/// A dataset stored as a single JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonDataset {
    env_meta: EnvMeta,

    /// Named subsets of episode identifiers
    #[serde(default)]
    masks: BTreeMap<String, Vec<String>>,

    episodes: BTreeMap<String, Episode>,
}

impl JsonDataset {
    /// Opens a dataset file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Builds a dataset in memory (primarily for tests).
    pub fn from_parts(
        env_meta: EnvMeta,
        masks: BTreeMap<String, Vec<String>>,
        episodes: BTreeMap<String, Episode>,
    ) -> Self {
        Self {
            env_meta,
            masks,
            episodes,
        }
    }
}

impl DatasetReader for JsonDataset {
    fn episode_ids(&self) -> Vec<String> {
        self.episodes.keys().cloned().collect()
    }

    fn mask(&self, name: &str) -> Result<Vec<String>, EnvError> {
        self.masks
            .get(name)
            .cloned()
            .ok_or_else(|| EnvError::not_found(format!("filter key '{}'", name)))
    }

    fn episode(&self, id: &str) -> Result<&Episode, EnvError> {
        self.episodes
            .get(id)
            .ok_or_else(|| EnvError::not_found(format!("episode '{}'", id)))
    }

    fn env_meta(&self) -> &EnvMeta {
        &self.env_meta
    }
}
