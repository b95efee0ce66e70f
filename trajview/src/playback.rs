//! Playback orchestration.
//!
//! Top-level control for a run: validates option preconditions before
//! any episode is touched, resolves default camera names, selects the
//! driver per run mode, iterates the chosen episodes, and owns the
//! video sink for the run's whole lifetime. Run statistics are
//! averaged across episodes at the end of a simulation-mode run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use trajview_env::{
    CloudSource, CloudSpec, DatasetReader, EnvConfig, EnvError, EnvMeta, InitialState, SimEnv,
};

use crate::error::PlaybackError;
use crate::observe::{replay_with_obs, ObserveOptions};
use crate::rasterize::CloudRasterizer;
use crate::replay::{replay_with_env, ReplayOptions};
use crate::select::select_demos;
use crate::video::{FrameSink, VideoSink};

/// Frame rate of the written video file.
pub const VIDEO_FPS: u32 = 20;

/// Options describing one playback run.
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Process only the subset registered under this filter key
    pub filter_key: Option<String>,

    /// Stop after this many episodes
    pub count: Option<usize>,

    /// Replay recorded observations instead of driving a simulator
    pub use_obs: bool,

    /// Replay recorded actions open-loop instead of loading states
    pub use_actions: bool,

    /// Render on-screen during playback
    pub render: bool,

    /// Write composite frames to this video file
    pub video_path: Option<PathBuf>,

    /// Sample a frame every this many steps
    pub video_skip: usize,

    /// Camera/sensor names; resolved from the environment type when
    /// absent
    pub image_names: Option<Vec<String>>,

    /// Only replay the first frame of each episode
    pub first: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            filter_key: None,
            count: None,
            use_obs: false,
            use_actions: false,
            render: false,
            video_path: None,
            video_skip: 5,
            image_names: None,
            first: false,
        }
    }
}

/// External collaborators a run is wired to.
pub struct Collaborators<'a> {
    /// Simulation backend constructor
    pub env_factory: &'a dyn Fn(&EnvMeta, &EnvConfig) -> Result<Box<dyn SimEnv>, EnvError>,

    /// Point-cloud reconstruction backend
    pub cloud_source: &'a dyn CloudSource,

    /// Video sink constructor (path, fps)
    pub sink_factory: &'a dyn Fn(&Path, u32) -> Result<Box<dyn FrameSink>, PlaybackError>,
}

impl Default for Collaborators<'static> {
    fn default() -> Self {
        Self {
            env_factory: &trajview_env::from_metadata,
            cloud_source: &trajview_env::UnlinkedCloudSource,
            sink_factory: &|path, fps| {
                Ok(Box::new(VideoSink::create(path, fps)?) as Box<dyn FrameSink>)
            },
        }
    }
}

/// What a completed run reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Episodes processed
    pub episodes: usize,

    /// Mean of each statistic across episodes; empty in observation
    /// mode
    pub stats_mean: BTreeMap<String, f64>,
}

/// Plays back every selected episode of a dataset.
pub fn playback_dataset(
    dataset: &dyn DatasetReader,
    collab: &Collaborators<'_>,
    opts: &PlaybackOptions,
) -> Result<RunSummary, PlaybackError> {
    let write_video = opts.video_path.is_some();

    // Fail fast: every precondition is checked before any episode or
    // collaborator is touched.
    if opts.video_skip == 0 {
        return Err(PlaybackError::config("frame-sampling stride must be >= 1"));
    }
    if opts.render && write_video {
        return Err(PlaybackError::config(
            "on-screen rendering and video output are mutually exclusive",
        ));
    }
    if opts.use_obs && !write_video {
        return Err(PlaybackError::config(
            "observation playback can only write to video",
        ));
    }
    if opts.use_obs && opts.use_actions {
        return Err(PlaybackError::config(
            "observation playback is offline and does not support action replay",
        ));
    }

    let image_names = resolve_image_names(dataset.env_meta(), opts.image_names.as_deref())?;
    if opts.render && image_names.len() != 1 {
        return Err(PlaybackError::config(
            "on-screen rendering supports exactly one camera",
        ));
    }

    let demos = select_demos(dataset, opts.filter_key.as_deref(), opts.count)?;

    let mut env = if opts.use_obs {
        None
    } else {
        let config = EnvConfig {
            render_onscreen: opts.render,
            render_offscreen: write_video,
            setup_cameras: opts.use_actions,
            ..EnvConfig::default()
        };
        Some((collab.env_factory)(dataset.env_meta(), &config)?)
    };

    let mut sink = match &opts.video_path {
        Some(path) => Some((collab.sink_factory)(path, VIDEO_FPS)?),
        None => None,
    };

    let rasterizer = CloudRasterizer::new();
    let cloud_spec = CloudSpec::default();
    let mut stats: Vec<BTreeMap<String, f64>> = Vec::new();

    for ep in &demos {
        info!("Playing back episode: {}", ep);
        let episode = dataset.episode(ep).map_err(|e| match e {
            EnvError::NotFound(what) => PlaybackError::NotFound(what),
            other => PlaybackError::Env(other),
        })?;

        if opts.use_obs {
            let sink = sink
                .as_deref_mut()
                .ok_or_else(|| PlaybackError::config("observation playback needs a video sink"))?;
            replay_with_obs(
                episode,
                collab.cloud_source,
                &cloud_spec,
                &rasterizer,
                sink,
                &ObserveOptions {
                    stride: opts.video_skip,
                    image_names: &image_names,
                    first: opts.first,
                },
            )?;
            continue;
        }

        let env = env
            .as_deref_mut()
            .ok_or_else(|| PlaybackError::config("simulation playback needs an environment"))?;

        let first_state = episode
            .states
            .first()
            .ok_or_else(|| EnvError::malformed(format!("episode '{}' has no states", ep)))?;
        let initial_state = InitialState {
            state: first_state.clone(),
            model: if dataset.env_meta().env_type.needs_scene_descriptor() {
                episode.model_file.clone()
            } else {
                None
            },
        };

        let report = replay_with_env(
            env,
            &initial_state,
            &episode.states,
            opts.use_actions.then_some(episode.actions.as_slice()),
            sink.as_deref_mut().map(|s| -> &mut dyn FrameSink { s }),
            &ReplayOptions {
                render: opts.render,
                stride: opts.video_skip,
                camera_names: &image_names,
                first: opts.first,
            },
        )?;
        stats.push(report.stats);
    }

    if let Some(mut sink) = sink {
        sink.finish()?;
    }

    Ok(RunSummary {
        episodes: demos.len(),
        stats_mean: mean_stats(&stats)?,
    })
}

/// Resolves the camera/sensor name list for a run.
fn resolve_image_names(
    meta: &EnvMeta,
    explicit: Option<&[String]>,
) -> Result<Vec<String>, PlaybackError> {
    match explicit {
        Some([]) => Err(PlaybackError::missing_modality(
            "camera/sensor name list is empty",
        )),
        Some(names) => Ok(names.to_vec()),
        None => meta
            .env_type
            .default_cameras()
            .map(|names| names.iter().map(|s| s.to_string()).collect())
            .ok_or_else(|| {
                PlaybackError::missing_modality(format!(
                    "no default camera names for env '{}'",
                    meta.env_name
                ))
            }),
    }
}

/// Averages each statistic across episodes.
///
/// Every episode must report the same statistic keys; a mismatch is a
/// configuration error rather than a silent key drop.
fn mean_stats(stats: &[BTreeMap<String, f64>]) -> Result<BTreeMap<String, f64>, PlaybackError> {
    let Some(reference) = stats.first() else {
        return Ok(BTreeMap::new());
    };
    for (i, s) in stats.iter().enumerate() {
        if !s.keys().eq(reference.keys()) {
            return Err(PlaybackError::config(format!(
                "episode {} reports mismatched statistic keys",
                i
            )));
        }
    }

    let n = stats.len() as f64;
    Ok(reference
        .keys()
        .map(|key| {
            let sum: f64 = stats.iter().map(|s| s[key]).sum();
            (key.clone(), sum / n)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use trajview_env::{
        EnvType, Episode, JsonDataset, ObsSequence, PointCloud, PointLabel, StepOutcome,
    };

    struct MockEnv {
        loads: Rc<RefCell<Vec<Vec<f64>>>>,
        episodes_seen: usize,
        vary_keys: bool,
    }

    impl SimEnv for MockEnv {
        fn reset(&mut self) -> Result<(), EnvError> {
            Ok(())
        }

        fn reset_to(&mut self, state: &InitialState) -> Result<(), EnvError> {
            // The per-episode load carries the scene descriptor; the
            // per-step loads do not.
            if state.model.is_some() {
                self.episodes_seen += 1;
            }
            self.loads.borrow_mut().push(state.state.clone());
            Ok(())
        }

        fn step(&mut self, _action: &[f64]) -> Result<StepOutcome, EnvError> {
            Ok(StepOutcome::default())
        }

        fn get_state(&mut self) -> Result<Vec<f64>, EnvError> {
            Ok(vec![0.0])
        }

        fn render_onscreen(&mut self, _camera: &str) -> Result<(), EnvError> {
            Ok(())
        }

        fn render_offscreen(
            &mut self,
            _camera: &str,
            height: u32,
            width: u32,
        ) -> Result<RgbImage, EnvError> {
            Ok(RgbImage::new(width, height))
        }

        fn is_success(&self) -> BTreeMap<String, f64> {
            if self.vary_keys && self.episodes_seen > 1 {
                BTreeMap::from([("other".to_string(), 1.0)])
            } else {
                BTreeMap::from([("task".to_string(), 1.0)])
            }
        }

        fn get_info(&self) -> BTreeMap<String, f64> {
            BTreeMap::new()
        }
    }

    #[derive(Default)]
    struct SharedSink {
        frames: Rc<RefCell<usize>>,
        finished: Rc<RefCell<bool>>,
    }

    impl FrameSink for SharedSink {
        fn append(&mut self, _frame: &RgbImage) -> Result<(), PlaybackError> {
            *self.frames.borrow_mut() += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<(), PlaybackError> {
            *self.finished.borrow_mut() = true;
            Ok(())
        }
    }

    fn sim_episode(steps: usize) -> Episode {
        Episode {
            states: (0..steps).map(|i| vec![i as f64]).collect(),
            actions: vec![vec![0.0]; steps.saturating_sub(1)],
            model_file: Some("<mujoco/>".to_string()),
            obs: BTreeMap::new(),
        }
    }

    fn pcd_episode(steps: usize) -> Episode {
        let mut obs = BTreeMap::new();
        obs.insert(
            "scene_pcd".to_string(),
            ObsSequence::Vectors {
                values: vec![vec![0.0; 3]; steps],
            },
        );
        obs.insert(
            "current_angles".to_string(),
            ObsSequence::Vectors {
                values: (0..steps).map(|s| vec![s as f64; 7]).collect(),
            },
        );
        obs.insert(
            "goal_angles".to_string(),
            ObsSequence::Vectors {
                values: vec![vec![0.5; 7]; steps],
            },
        );
        obs.insert(
            "compute_pcd_params".to_string(),
            ObsSequence::Vectors {
                values: vec![vec![1.0; 8]],
            },
        );
        Episode {
            states: vec![vec![0.0]; steps + 1],
            actions: vec![vec![0.0]; steps],
            model_file: None,
            obs,
        }
    }

    fn dataset(env_type: EnvType, episodes: Vec<(&str, Episode)>) -> JsonDataset {
        let meta = EnvMeta {
            env_name: "Lift".to_string(),
            env_type,
            env_kwargs: serde_json::Value::Null,
        };
        JsonDataset::from_parts(
            meta,
            BTreeMap::new(),
            episodes
                .into_iter()
                .map(|(id, ep)| (id.to_string(), ep))
                .collect(),
        )
    }

    struct StubCloudSource;

    impl CloudSource for StubCloudSource {
        fn build(
            &self,
            _current: &[f64],
            _goal: &[f64],
            _scene: &[f64],
            _spec: &CloudSpec,
        ) -> Result<PointCloud, EnvError> {
            let mut cloud = PointCloud::with_capacity(1);
            cloud.push(nalgebra::Point3::new(0.0, 0.0, 0.0), PointLabel::Robot);
            Ok(cloud)
        }
    }

    #[test]
    fn test_count_cap_processes_leading_episodes_in_order() {
        let ds = dataset(
            EnvType::Robosuite,
            vec![
                ("demo_0", sim_episode(3)),
                ("demo_1", sim_episode(3)),
                ("demo_2", sim_episode(3)),
            ],
        );

        let loads: Rc<RefCell<Vec<Vec<f64>>>> = Rc::default();
        let loads_for_env = loads.clone();
        let env_factory = move |_: &EnvMeta, _: &EnvConfig| {
            Ok(Box::new(MockEnv {
                loads: loads_for_env.clone(),
                episodes_seen: 0,
                vary_keys: false,
            }) as Box<dyn SimEnv>)
        };

        let collab = Collaborators {
            env_factory: &env_factory,
            cloud_source: &StubCloudSource,
            sink_factory: &|_, _| Ok(Box::new(SharedSink::default()) as Box<dyn FrameSink>),
        };

        let opts = PlaybackOptions {
            count: Some(2),
            ..PlaybackOptions::default()
        };
        let summary = playback_dataset(&ds, &collab, &opts).unwrap();
        assert_eq!(summary.episodes, 2);
        assert_eq!(summary.stats_mean.get("task"), Some(&1.0));
        // Two episodes of 3 states, each with an initial scene load.
        assert_eq!(loads.borrow().len(), 2 * (1 + 3));
    }

    #[test]
    fn test_render_with_video_path_fails_before_any_episode() {
        let ds = dataset(EnvType::Robosuite, vec![("demo_0", sim_episode(3))]);
        let env_factory = |_: &EnvMeta, _: &EnvConfig| -> Result<Box<dyn SimEnv>, EnvError> {
            panic!("environment must not be constructed");
        };
        let collab = Collaborators {
            env_factory: &env_factory,
            cloud_source: &StubCloudSource,
            sink_factory: &|_, _| panic!("sink must not be constructed"),
        };
        let opts = PlaybackOptions {
            render: true,
            video_path: Some(PathBuf::from("/tmp/out.mp4")),
            ..PlaybackOptions::default()
        };
        let err = playback_dataset(&ds, &collab, &opts).err().unwrap();
        assert!(matches!(err, PlaybackError::Config(_)));
    }

    #[test]
    fn test_obs_mode_requires_video_output() {
        let ds = dataset(EnvType::MotionPlanner, vec![("demo_0", pcd_episode(4))]);
        let opts = PlaybackOptions {
            use_obs: true,
            ..PlaybackOptions::default()
        };
        let err = playback_dataset(&ds, &Collaborators::default(), &opts)
            .err()
            .unwrap();
        assert!(matches!(err, PlaybackError::Config(_)));
    }

    #[test]
    fn test_obs_mode_rejects_action_replay() {
        let ds = dataset(EnvType::MotionPlanner, vec![("demo_0", pcd_episode(4))]);
        let opts = PlaybackOptions {
            use_obs: true,
            use_actions: true,
            video_path: Some(PathBuf::from("/tmp/out.mp4")),
            ..PlaybackOptions::default()
        };
        let err = playback_dataset(&ds, &Collaborators::default(), &opts)
            .err()
            .unwrap();
        assert!(matches!(err, PlaybackError::Config(_)));
    }

    #[test]
    fn test_gym_env_has_no_default_cameras() {
        let ds = dataset(EnvType::Gym, vec![("demo_0", sim_episode(3))]);
        let err = playback_dataset(&ds, &Collaborators::default(), &PlaybackOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, PlaybackError::MissingModality(_)));
    }

    #[test]
    fn test_obs_mode_point_cloud_run_writes_sampled_frames() {
        let ds = dataset(EnvType::MotionPlanner, vec![("demo_0", pcd_episode(12))]);

        let frames: Rc<RefCell<usize>> = Rc::default();
        let finished: Rc<RefCell<bool>> = Rc::default();
        let frames_for_sink = frames.clone();
        let finished_for_sink = finished.clone();
        let sink_factory = move |_: &Path, _: u32| {
            Ok(Box::new(SharedSink {
                frames: frames_for_sink.clone(),
                finished: finished_for_sink.clone(),
            }) as Box<dyn FrameSink>)
        };

        let collab = Collaborators {
            env_factory: &trajview_env::from_metadata,
            cloud_source: &StubCloudSource,
            sink_factory: &sink_factory,
        };

        let opts = PlaybackOptions {
            use_obs: true,
            video_path: Some(PathBuf::from("/tmp/out.mp4")),
            video_skip: 5,
            image_names: Some(vec!["scene_pcd".to_string()]),
            ..PlaybackOptions::default()
        };
        let summary = playback_dataset(&ds, &collab, &opts).unwrap();

        // Steps 0, 5, 10 of the 12-step trajectory.
        assert_eq!(*frames.borrow(), 3);
        assert!(*finished.borrow());
        assert_eq!(summary.episodes, 1);
        assert!(summary.stats_mean.is_empty());
    }

    #[test]
    fn test_mismatched_stat_keys_are_a_config_error() {
        let ds = dataset(
            EnvType::Robosuite,
            vec![("demo_0", sim_episode(2)), ("demo_1", sim_episode(2))],
        );

        let loads: Rc<RefCell<Vec<Vec<f64>>>> = Rc::default();
        let loads_for_env = loads.clone();
        let env_factory = move |_: &EnvMeta, _: &EnvConfig| {
            Ok(Box::new(MockEnv {
                loads: loads_for_env.clone(),
                episodes_seen: 0,
                vary_keys: true,
            }) as Box<dyn SimEnv>)
        };
        let collab = Collaborators {
            env_factory: &env_factory,
            cloud_source: &StubCloudSource,
            sink_factory: &|_, _| Ok(Box::new(SharedSink::default()) as Box<dyn FrameSink>),
        };

        let err = playback_dataset(&ds, &collab, &PlaybackOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, PlaybackError::Config(_)));
    }

    #[test]
    fn test_run_summary_serializes_for_reporting() {
        let summary = RunSummary {
            episodes: 2,
            stats_mean: BTreeMap::from([("task".to_string(), 0.5)]),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["episodes"], 2);
        assert_eq!(json["stats_mean"]["task"], 0.5);
    }

    #[test]
    fn test_mean_stats_averages_per_key() {
        let stats = vec![
            BTreeMap::from([("task".to_string(), 1.0)]),
            BTreeMap::from([("task".to_string(), 0.0)]),
        ];
        let mean = mean_stats(&stats).unwrap();
        assert_eq!(mean.get("task"), Some(&0.5));
    }
}
