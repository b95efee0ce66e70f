//! Observation replay driver.
//!
//! Reconstructs an episode's video purely from recorded sensor data,
//! with no live simulation. Point-cloud-typed streams (name contains
//! "pcd") take priority: each sampled step rebuilds the cloud from the
//! recorded joint parameters and rasterizes it. Otherwise the
//! requested image/depth streams are read back directly. The two
//! branches never mix within one composite frame.

use tracing::debug;
use trajview_env::{depth_to_rgb, CloudSource, CloudSpec, Episode};

use crate::error::PlaybackError;
use crate::rasterize::CloudRasterizer;
use crate::video::{hconcat, FrameSink};

/// Stream names with this substring hold point-cloud parameters.
const PCD_MARKER: &str = "pcd";

/// Per-step joint configuration stream.
const CURRENT_ANGLES: &str = "current_angles";
/// Per-step goal configuration stream.
const GOAL_ANGLES: &str = "goal_angles";
/// Fixed scene-description stream; only step 0 is meaningful.
const SCENE_PARAMS: &str = "compute_pcd_params";

/// Per-invocation options for the observation driver.
#[derive(Debug, Clone)]
pub struct ObserveOptions<'a> {
    /// Sample a composite frame every `stride` steps (counted from 0)
    pub stride: usize,

    /// Image/depth streams to composite, in order
    pub image_names: &'a [String],

    /// Stop after the first sampled step
    pub first: bool,
}

/// Replays one episode from its recorded observations into `sink`.
///
/// Returns the number of composite frames written: `ceil(L / stride)`
/// over trajectory length `L`, or 1 under `first`.
pub fn replay_with_obs(
    episode: &Episode,
    cloud_source: &dyn CloudSource,
    cloud_spec: &CloudSpec,
    rasterizer: &CloudRasterizer,
    sink: &mut dyn FrameSink,
    opts: &ObserveOptions<'_>,
) -> Result<usize, PlaybackError> {
    if opts.image_names.is_empty() {
        return Err(PlaybackError::missing_modality(
            "must specify at least one image observation to replay",
        ));
    }
    if opts.stride == 0 {
        return Err(PlaybackError::config("frame-sampling stride must be >= 1"));
    }

    let pcd_streams: Vec<&str> = episode
        .obs_names()
        .filter(|name| name.contains(PCD_MARKER))
        .collect();

    let traj_len = episode.actions.len();
    let mut written = 0usize;

    for i in 0..traj_len {
        if i % opts.stride == 0 {
            let composite = if pcd_streams.is_empty() {
                image_frame(episode, opts.image_names, i)?
            } else {
                cloud_frame(episode, &pcd_streams, cloud_source, cloud_spec, rasterizer, i)?
            };
            sink.append(&composite)?;
            written += 1;
        }
        if opts.first {
            break;
        }
    }

    debug!("wrote {} composite frames from observations", written);
    Ok(written)
}

/// Builds the sampled composite from recorded image/depth streams.
fn image_frame(
    episode: &Episode,
    image_names: &[String],
    step: usize,
) -> Result<image::RgbImage, PlaybackError> {
    let mut views = Vec::with_capacity(image_names.len());
    for name in image_names {
        let frames = episode.frames(name)?;
        let frame = frames.get(step).ok_or_else(|| {
            PlaybackError::NotFound(format!(
                "observation stream '{}' has no step {}",
                name, step
            ))
        })?;
        let view = if name.ends_with("depth") {
            depth_to_rgb(frame)?
        } else {
            frame.to_rgb()?
        };
        views.push(view);
    }
    hconcat(&views)
}

/// Rebuilds and rasterizes every point-cloud stream at one step.
fn cloud_frame(
    episode: &Episode,
    pcd_streams: &[&str],
    cloud_source: &dyn CloudSource,
    cloud_spec: &CloudSpec,
    rasterizer: &CloudRasterizer,
    step: usize,
) -> Result<image::RgbImage, PlaybackError> {
    let current = step_vector(episode, CURRENT_ANGLES, step)?;
    let goal = step_vector(episode, GOAL_ANGLES, step)?;
    // The scene description is captured once, at step 0.
    let scene = step_vector(episode, SCENE_PARAMS, 0)?;

    let mut views = Vec::with_capacity(pcd_streams.len());
    for _ in pcd_streams {
        let cloud = cloud_source.build(current, goal, scene, cloud_spec)?;
        views.push(rasterizer.rasterize(&cloud)?);
    }
    hconcat(&views)
}

fn step_vector<'e>(
    episode: &'e Episode,
    name: &str,
    step: usize,
) -> Result<&'e [f64], PlaybackError> {
    let values = episode.vectors(name)?;
    values
        .get(step)
        .map(|v| v.as_slice())
        .ok_or_else(|| {
            PlaybackError::NotFound(format!(
                "observation stream '{}' has no step {}",
                name, step
            ))
        })
}
