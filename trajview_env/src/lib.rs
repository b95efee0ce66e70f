//! Trajview Collaborator Abstraction Layer
//!
//! This crate is the seam between the replay pipeline and the external
//! systems it coordinates: the recorded-trajectory dataset, the live
//! simulation backends, and the point-cloud reconstruction network.
//! None of those are implemented here - the pipeline consumes them
//! through the narrow traits in this crate, so a backend can be
//! swapped without touching the replay logic.
//!
//! # Interfaces
//!
//! - [`DatasetReader`] - enumeration of episodes and named subsets,
//!   per-episode states/actions/observations, opaque scene descriptor.
//!   A JSON-backed implementation ([`JsonDataset`]) is provided for
//!   the CLI and tests.
//! - [`SimEnv`] - reset/step/render semantics of a stateful simulation.
//! - [`CloudSource`] - reconstruction of a labeled point cloud from
//!   recorded joint parameters.
//! - [`depth_to_rgb`] - depth raster to displayable color raster.

mod cloud;
mod dataset;
mod env;
mod error;

pub use cloud::{
    depth_to_rgb, CloudSource, CloudSpec, PointCloud, PointLabel, UnlinkedCloudSource,
};
pub use dataset::{DatasetReader, Episode, JsonDataset, ObsSequence, RawFrame};
pub use env::{
    from_metadata, EnvConfig, EnvMeta, EnvType, InitialState, ObsSpec, SimEnv, StepOutcome,
};
pub use error::EnvError;
