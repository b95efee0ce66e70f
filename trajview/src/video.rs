//! Frame multiplexing and the video sink.
//!
//! Composite frames are horizontal concatenations of per-view rasters.
//! The sink buffers raw RGB24 frames to a temporary file and encodes
//! them with an ffmpeg subprocess when the run finishes; finalization
//! also happens on drop, so a run that dies mid-episode still encodes
//! everything appended so far.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{GenericImage, RgbImage};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::PlaybackError;

/// Accepts composite frames in temporal order.
///
/// Implemented by [`VideoSink`] for real runs and by in-memory
/// collectors in tests.
pub trait FrameSink {
    /// Appends one frame. Frames must arrive in the order they are
    /// produced and keep the dimensions of the first frame.
    fn append(&mut self, frame: &RgbImage) -> Result<(), PlaybackError>;

    /// Releases the sink after the last episode. A no-op for sinks
    /// with nothing to flush.
    fn finish(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }
}

/// Concatenates per-view rasters horizontally, in order.
///
/// All rasters must share a height; the composite width is the sum of
/// the widths.
pub fn hconcat(views: &[RgbImage]) -> Result<RgbImage, PlaybackError> {
    let first = views
        .first()
        .ok_or_else(|| PlaybackError::video("cannot composite zero views"))?;
    let height = first.height();
    let mut width = 0u32;
    for view in views {
        if view.height() != height {
            return Err(PlaybackError::video(format!(
                "view heights differ: {} vs {}",
                height,
                view.height()
            )));
        }
        width += view.width();
    }

    let mut composite = RgbImage::new(width, height);
    let mut x = 0u32;
    for view in views {
        composite
            .copy_from(view, x, 0)
            .map_err(|e| PlaybackError::video(format!("composite copy failed: {}", e)))?;
        x += view.width();
    }
    Ok(composite)
}

/// Video-writing sink backed by an ffmpeg subprocess.
///
/// Frames are staged as raw RGB24 in a temp file; encoding runs once,
/// at finalization. The frame rate and output path are fixed for the
/// sink's lifetime, the dimensions by the first appended frame.
pub struct VideoSink {
    path: PathBuf,
    fps: u32,
    raw: Option<NamedTempFile>,
    dims: Option<(u32, u32)>,
    frames: usize,
}

impl VideoSink {
    /// Creates a sink that will encode to `path` at the given rate.
    pub fn create(path: impl Into<PathBuf>, fps: u32) -> Result<Self, PlaybackError> {
        Ok(Self {
            path: path.into(),
            fps: fps.max(1),
            raw: Some(NamedTempFile::new()?),
            dims: None,
            frames: 0,
        })
    }

    /// Number of frames appended so far.
    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Flushes staged frames through the encoder and releases the sink.
    ///
    /// Safe to call once; `Drop` calls it for any sink not explicitly
    /// finished, logging failures instead of panicking.
    pub fn finish(&mut self) -> Result<(), PlaybackError> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        if self.frames == 0 {
            debug!("video sink: no frames appended, skipping encode");
            return Ok(());
        }
        let (width, height) = self
            .dims
            .ok_or_else(|| PlaybackError::video("frames recorded without dimensions"))?;

        let staged = raw.into_temp_path();
        let result = encode(&staged, &self.path, self.frames, width, height, self.fps);
        staged.close().ok();
        result?;

        info!(
            "wrote {} frames to {} ({}x{} @ {} fps)",
            self.frames,
            self.path.display(),
            width,
            height,
            self.fps
        );
        Ok(())
    }
}

impl FrameSink for VideoSink {
    fn append(&mut self, frame: &RgbImage) -> Result<(), PlaybackError> {
        let raw = self
            .raw
            .as_mut()
            .ok_or_else(|| PlaybackError::video("sink already finished"))?;

        let dims = (frame.width(), frame.height());
        match self.dims {
            None => self.dims = Some(dims),
            Some(expected) if expected != dims => {
                return Err(PlaybackError::video(format!(
                    "frame size changed mid-run: expected {}x{}, got {}x{}",
                    expected.0, expected.1, dims.0, dims.1
                )));
            }
            Some(_) => {}
        }

        raw.write_all(frame.as_raw())?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PlaybackError> {
        VideoSink::finish(self)
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("video sink finalization failed: {}", e);
        }
    }
}

/// One ffmpeg invocation candidate.
struct EncoderPlan {
    description: &'static str,
    args: &'static [&'static str],
}

const ENCODER_PLANS: &[EncoderPlan] = &[
    EncoderPlan {
        description: "H.264 (libx264)",
        args: &[
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-crf",
            "18",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ],
    },
    EncoderPlan {
        description: "MPEG-4 part 2 (mpeg4)",
        args: &["-c:v", "mpeg4", "-q:v", "3", "-pix_fmt", "yuv420p"],
    },
];

fn encode(
    raw_path: &Path,
    out_path: &Path,
    frame_count: usize,
    width: u32,
    height: u32,
    fps: u32,
) -> Result<(), PlaybackError> {
    let ffmpeg = std::env::var("TRAJVIEW_FFMPEG").unwrap_or_else(|_| "ffmpeg".into());
    let dims = format!("{}x{}", width, height);

    let mut failures = Vec::new();
    for plan in ENCODER_PLANS {
        let mut cmd = Command::new(&ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(&dims)
            .arg("-r")
            .arg(fps.to_string())
            .arg("-i")
            .arg(raw_path)
            .arg("-frames:v")
            .arg(frame_count.to_string())
            .args(plan.args)
            .arg(out_path);

        debug!("encoding {} frames with {}", frame_count, plan.description);
        match cmd.output() {
            Ok(output) if output.status.success() => return Ok(()),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                failures.push(format!("{}: {}", plan.description, stderr));
            }
            Err(e) => failures.push(format!("{}: {}", plan.description, e)),
        }
    }

    Err(PlaybackError::video(format!(
        "all encoders failed:\n{}",
        failures.join("\n")
    )))
}
