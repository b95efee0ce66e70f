//! Trajview Replay Pipeline
//!
//! Turns recorded robot-interaction trajectories back into watchable
//! footage. An episode is replayed in one of three modes: state-driven
//! (every recorded snapshot loaded authoritatively), action-driven
//! (recorded actions stepped open-loop, with divergence diagnostics),
//! or observation-driven (no simulator at all; the recorded sensor
//! streams are rendered directly, including software rasterization of
//! reconstructed point clouds).
//!
//! The pipeline talks to datasets, simulation backends, and cloud
//! reconstruction exclusively through the `trajview_env` traits, so
//! everything here is testable with in-memory fakes.

pub mod error;
pub mod observe;
pub mod playback;
pub mod rasterize;
pub mod replay;
pub mod select;
pub mod video;

pub use error::PlaybackError;
pub use observe::{replay_with_obs, ObserveOptions};
pub use playback::{playback_dataset, Collaborators, PlaybackOptions, RunSummary, VIDEO_FPS};
pub use rasterize::CloudRasterizer;
pub use replay::{replay_with_env, EpisodeReport, ReplayOptions, RENDER_EDGE};
pub use select::select_demos;
pub use video::{hconcat, FrameSink, VideoSink};
