//! Simulation environment interface.
//!
//! The replay pipeline never owns physics: it drives an external
//! stateful backend through [`SimEnv`]. Backends register themselves
//! behind [`from_metadata`]; this crate only defines the contract.

use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::cloud::CloudSpec;
use crate::error::EnvError;

/// Family of simulation backends a dataset may have been recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvType {
    /// Robosuite-style environments (scene rebuilt from a model XML)
    Robosuite,
    /// iGibson/MOMART-style environments
    Momart,
    /// Plain gym environments (no camera support)
    Gym,
    /// Motion-planner environments (joint-space, point-cloud sensing)
    MotionPlanner,
}

impl EnvType {
    /// Default camera/sensor names used when the caller supplies none.
    ///
    /// Gym environments have no camera support and return `None`.
    pub fn default_cameras(&self) -> Option<&'static [&'static str]> {
        match self {
            EnvType::Robosuite => Some(&["agentview"]),
            EnvType::Momart => Some(&["rgb"]),
            EnvType::Gym => None,
            EnvType::MotionPlanner => Some(&["front_image"]),
        }
    }

    /// Whether the backend needs the per-episode scene descriptor to
    /// reconstruct static geometry on reset.
    pub fn needs_scene_descriptor(&self) -> bool {
        matches!(self, EnvType::Robosuite)
    }
}

/// Environment metadata recorded alongside a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvMeta {
    /// Human-readable environment name (e.g. "Lift")
    pub env_name: String,

    /// Backend family
    pub env_type: EnvType,

    /// Opaque backend construction arguments, passed through verbatim
    #[serde(default)]
    pub env_kwargs: serde_json::Value,
}

/// Observation-modality configuration handed to the backend at
/// construction time.
///
/// The backend needs to know which observation keys are low-dim vs
/// image-typed for its internal bookkeeping; this is an explicit,
/// immutable value rather than process-global state. Playback never
/// consumes the observations themselves, so the default spec is a
/// minimal placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsSpec {
    /// Low-dimensional observation keys
    pub low_dim: Vec<String>,

    /// Image observation keys
    pub rgb: Vec<String>,

    /// Depth observation keys
    pub depth: Vec<String>,
}

impl Default for ObsSpec {
    fn default() -> Self {
        Self {
            low_dim: vec!["robot0_eef_pos".to_string()],
            rgb: Vec::new(),
            depth: Vec::new(),
        }
    }
}

/// Construction-time configuration for a simulation backend.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Enable the on-screen viewer
    pub render_onscreen: bool,

    /// Enable offscreen camera rendering
    pub render_offscreen: bool,

    /// Whether the backend should set up its cameras at reset
    pub setup_cameras: bool,

    /// Observation-modality bookkeeping for the backend
    pub obs_spec: ObsSpec,

    /// Target point counts for point-cloud reconstruction
    pub cloud_spec: CloudSpec,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            render_onscreen: false,
            render_offscreen: false,
            setup_cameras: false,
            obs_spec: ObsSpec::default(),
            cloud_spec: CloudSpec::default(),
        }
    }
}

/// First snapshot of an episode, optionally carrying the opaque scene
/// descriptor some backends need to rebuild static geometry.
#[derive(Debug, Clone)]
pub struct InitialState {
    /// Flat simulation state vector
    pub state: Vec<f64>,

    /// Opaque model/scene descriptor (e.g. MJCF XML)
    pub model: Option<String>,
}

/// Result of advancing the simulation by one physics step.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Scalar reward for the transition
    pub reward: f64,

    /// Terminal signal; ends the episode early during action playback
    pub done: bool,

    /// Truncation signal (time limit), distinct from `done`
    pub truncated: bool,

    /// Auxiliary per-step info
    pub info: BTreeMap<String, f64>,
}

/// A live, stateful simulation environment.
///
/// All calls are blocking and must complete before the next replay
/// step begins. The driver owns the environment exclusively for the
/// duration of one episode.
pub trait SimEnv {
    /// Resets to the backend's own initial configuration.
    fn reset(&mut self) -> Result<(), EnvError>;

    /// Forces the environment to an exact recorded snapshot.
    ///
    /// This is an authoritative state load, not a simulated
    /// transition; no physics runs.
    fn reset_to(&mut self, state: &InitialState) -> Result<(), EnvError>;

    /// Advances one physics step with the given action.
    fn step(&mut self, action: &[f64]) -> Result<StepOutcome, EnvError>;

    /// Returns the current flat simulation state.
    fn get_state(&mut self) -> Result<Vec<f64>, EnvError>;

    /// Renders the named camera to the on-screen viewer.
    fn render_onscreen(&mut self, camera: &str) -> Result<(), EnvError>;

    /// Renders the named camera offscreen at the given resolution.
    fn render_offscreen(
        &mut self,
        camera: &str,
        height: u32,
        width: u32,
    ) -> Result<RgbImage, EnvError>;

    /// Success indicators for the current episode.
    fn is_success(&self) -> BTreeMap<String, f64>;

    /// Auxiliary info for the current episode.
    fn get_info(&self) -> BTreeMap<String, f64>;
}

/// Constructs a simulation backend from dataset metadata.
///
/// Backends are external collaborators; a build that does not link the
/// matching backend reports [`EnvError::Unsupported`]. Observation
/// playback does not go through here at all.
pub fn from_metadata(
    meta: &EnvMeta,
    _config: &EnvConfig,
) -> Result<Box<dyn SimEnv>, EnvError> {
    let backend = match meta.env_type {
        EnvType::Robosuite => "robosuite",
        EnvType::Momart => "momart",
        EnvType::Gym => "gym",
        EnvType::MotionPlanner => "motion_planner",
    };
    Err(EnvError::Unsupported(format!(
        "no {} backend linked into this build (env {})",
        backend, meta.env_name
    )))
}
