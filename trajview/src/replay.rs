//! Simulation replay driver.
//!
//! Replays one episode through a live environment, either by forcing
//! each recorded state snapshot in turn (state-driven) or by stepping
//! the recorded actions open-loop (action-driven). Rendered frames go
//! on screen or into a [`FrameSink`], never both.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use trajview_env::{InitialState, SimEnv};

use crate::error::PlaybackError;
use crate::video::{hconcat, FrameSink};

/// Offscreen render edge length for each camera view, in pixels.
pub const RENDER_EDGE: u32 = 512;

/// Per-invocation options for the simulation driver.
#[derive(Debug, Clone)]
pub struct ReplayOptions<'a> {
    /// Render camera 0 to the on-screen viewer each step
    pub render: bool,

    /// Sample a composite frame every `stride` steps (counted from 0)
    pub stride: usize,

    /// Cameras to render, in horizontal concatenation order
    pub camera_names: &'a [String],

    /// Stop after a single iteration (task-initialization preview)
    pub first: bool,
}

/// What one replayed episode produced.
#[derive(Debug, Clone, Default)]
pub struct EpisodeReport {
    /// Merged success-indicator and auxiliary info mappings, captured
    /// once at episode end
    pub stats: BTreeMap<String, f64>,

    /// Iterations actually executed (may be short of the trajectory
    /// length on early termination)
    pub steps: usize,

    /// Action-playback steps whose resulting state deviated from the
    /// recorded one; diagnostic only
    pub divergences: usize,

    /// Largest observed deviation (L2 norm)
    pub max_divergence: f64,
}

/// Replays one episode through `env` and returns its report.
///
/// With `actions` present the environment is stepped open-loop and a
/// terminal signal ends the episode early; otherwise every recorded
/// state is loaded authoritatively and no physics runs. Playback
/// divergence under action replay is logged as a warning and counted,
/// never raised: exact reproducibility is not guaranteed across
/// simulation versions.
pub fn replay_with_env(
    env: &mut dyn SimEnv,
    initial_state: &InitialState,
    states: &[Vec<f64>],
    actions: Option<&[Vec<f64>]>,
    mut sink: Option<&mut dyn FrameSink>,
    opts: &ReplayOptions<'_>,
) -> Result<EpisodeReport, PlaybackError> {
    if opts.render && sink.is_some() {
        return Err(PlaybackError::config(
            "on-screen rendering and composite frame writing are mutually exclusive",
        ));
    }
    if opts.stride == 0 {
        return Err(PlaybackError::config("frame-sampling stride must be >= 1"));
    }
    if (sink.is_some() || opts.render) && opts.camera_names.is_empty() {
        return Err(PlaybackError::missing_modality(
            "rendering needs at least one camera name",
        ));
    }

    env.reset()?;
    env.reset_to(initial_state)?;

    let traj_len = match actions {
        Some(actions) => actions.len(),
        None => states.len(),
    };

    let mut report = EpisodeReport::default();

    for i in 0..traj_len {
        match actions {
            Some(actions) => {
                let outcome = env.step(&actions[i])?;
                // Action playback is open-loop; deviation from the
                // recorded trajectory is observable but non-fatal. No
                // comparison on the final step, or when the recording
                // has no state for this step.
                if i + 1 < traj_len {
                    if let Some(recorded) = states.get(i + 1) {
                        let replayed = env.get_state()?;
                        if let Some(err) = state_divergence(recorded, &replayed) {
                            warn!("playback diverged by {:.6} at step {}", err, i);
                            report.divergences += 1;
                            report.max_divergence = report.max_divergence.max(err);
                        }
                    }
                }
                report.steps += 1;
                if outcome.done {
                    debug!("terminal signal at step {}, ending episode early", i);
                    break;
                }
            }
            None => {
                env.reset_to(&InitialState {
                    state: states[i].clone(),
                    model: None,
                })?;
                report.steps += 1;
            }
        }

        if opts.render {
            env.render_onscreen(&opts.camera_names[0])?;
        }

        if let Some(sink) = sink.as_deref_mut() {
            if i % opts.stride == 0 {
                let mut views = Vec::with_capacity(opts.camera_names.len());
                for camera in opts.camera_names {
                    views.push(env.render_offscreen(camera, RENDER_EDGE, RENDER_EDGE)?);
                }
                sink.append(&hconcat(&views)?)?;
            }
        }

        if opts.first {
            break;
        }
    }

    report.stats = env.is_success();
    report.stats.extend(env.get_info());
    Ok(report)
}

/// L2 norm between a recorded and a replayed state, when comparable.
///
/// Returns `None` for matching states and for length mismatches
/// (states are not comparable across simulation versions).
fn state_divergence(recorded: &[f64], replayed: &[f64]) -> Option<f64> {
    if recorded.len() != replayed.len() {
        return None;
    }
    let err: f64 = recorded
        .iter()
        .zip(replayed)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    (err > 1e-9).then_some(err)
}
