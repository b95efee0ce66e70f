//! Labeled point clouds and their collaborators.
//!
//! A point cloud is a flat array of 3-D positions with a small-integer
//! semantic label per point. The label set is fixed by the rendering
//! palette, not by the data: anything outside {0, 1, 2} is rejected.

use image::{Rgb, RgbImage};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::dataset::RawFrame;
use crate::error::EnvError;

/// Semantic group of a cloud point, with its fixed display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLabel {
    /// Robot surface (red)
    Robot = 0,
    /// Obstacle surface (green)
    Obstacle = 1,
    /// Goal indicator (blue)
    Target = 2,
}

impl PointLabel {
    /// RGB display color for this label.
    pub fn color(&self) -> [u8; 3] {
        match self {
            PointLabel::Robot => [255, 0, 0],
            PointLabel::Obstacle => [0, 255, 0],
            PointLabel::Target => [0, 0, 255],
        }
    }
}

impl TryFrom<u8> for PointLabel {
    type Error = EnvError;

    fn try_from(raw: u8) -> Result<Self, EnvError> {
        match raw {
            0 => Ok(PointLabel::Robot),
            1 => Ok(PointLabel::Obstacle),
            2 => Ok(PointLabel::Target),
            other => Err(EnvError::BadLabel(other)),
        }
    }
}

/// A labeled 3-D point set for one time step.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    /// Point positions
    pub points: Vec<Point3<f32>>,

    /// Per-point semantic label, same length as `points`
    pub labels: Vec<u8>,
}

impl PointCloud {
    /// Creates an empty cloud with reserved capacity.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            points: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
        }
    }

    /// Appends one labeled point.
    pub fn push(&mut self, point: Point3<f32>, label: PointLabel) {
        self.points.push(point);
        self.labels.push(label as u8);
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Target point counts per semantic group for reconstruction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CloudSpec {
    /// Points sampled on the robot surface
    pub num_robot_points: usize,

    /// Points sampled on obstacle surfaces
    pub num_obstacle_points: usize,
}

impl Default for CloudSpec {
    fn default() -> Self {
        Self {
            num_robot_points: 2048,
            num_obstacle_points: 4096,
        }
    }
}

/// Reconstructs a full labeled point cloud from recorded parameters.
///
/// The heavy lifting (forward kinematics, surface sampling) lives in
/// an external collaborator; the pipeline only supplies the recorded
/// per-step parameter vectors.
pub trait CloudSource {
    /// Builds the cloud for one step.
    ///
    /// `current` and `goal` are the per-step joint configuration
    /// vectors; `scene` is the fixed scene-description vector captured
    /// once at step 0.
    fn build(
        &self,
        current: &[f64],
        goal: &[f64],
        scene: &[f64],
        spec: &CloudSpec,
    ) -> Result<PointCloud, EnvError>;
}

/// Placeholder used when no reconstruction backend is linked into the
/// build; every call reports [`EnvError::Unsupported`].
pub struct UnlinkedCloudSource;

impl CloudSource for UnlinkedCloudSource {
    fn build(
        &self,
        _current: &[f64],
        _goal: &[f64],
        _scene: &[f64],
        _spec: &CloudSpec,
    ) -> Result<PointCloud, EnvError> {
        Err(EnvError::Unsupported(
            "no point-cloud reconstruction backend linked into this build".to_string(),
        ))
    }
}

/// Maps a single-channel depth raster to a displayable RGB raster.
///
/// Depth is normalized over the frame's own range and shown as a
/// grayscale ramp (near = bright).
pub fn depth_to_rgb(depth: &RawFrame) -> Result<RgbImage, EnvError> {
    if depth.channels != 1 {
        return Err(EnvError::malformed(format!(
            "expected a 1-channel depth frame, got {} channels",
            depth.channels
        )));
    }
    let expected = (depth.height * depth.width) as usize;
    if depth.data.len() != expected {
        return Err(EnvError::malformed(format!(
            "depth data length {} does not match {}x{}",
            depth.data.len(),
            depth.height,
            depth.width
        )));
    }

    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in &depth.data {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let span = (hi - lo).max(f32::EPSILON);

    let mut img = RgbImage::new(depth.width, depth.height);
    for (i, &v) in depth.data.iter().enumerate() {
        let t = 1.0 - (v - lo) / span;
        let g = (t * 255.0).round().clamp(0.0, 255.0) as u8;
        let x = (i as u32) % depth.width;
        let y = (i as u32) / depth.width;
        img.put_pixel(x, y, Rgb([g, g, g]));
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_palette() {
        assert_eq!(PointLabel::try_from(0).unwrap().color(), [255, 0, 0]);
        assert_eq!(PointLabel::try_from(1).unwrap().color(), [0, 255, 0]);
        assert_eq!(PointLabel::try_from(2).unwrap().color(), [0, 0, 255]);
    }

    #[test]
    fn test_label_outside_palette_is_rejected() {
        assert!(matches!(PointLabel::try_from(3), Err(EnvError::BadLabel(3))));
        assert!(matches!(
            PointLabel::try_from(255),
            Err(EnvError::BadLabel(255))
        ));
    }

    #[test]
    fn test_cloud_push() {
        let mut cloud = PointCloud::with_capacity(2);
        cloud.push(Point3::new(0.0, 0.0, 0.0), PointLabel::Robot);
        cloud.push(Point3::new(1.0, 0.0, 0.0), PointLabel::Target);
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.labels, vec![0, 2]);
    }

    #[test]
    fn test_depth_to_rgb_normalizes_range() {
        let depth = RawFrame {
            height: 1,
            width: 2,
            channels: 1,
            data: vec![0.5, 2.5],
        };
        let img = depth_to_rgb(&depth).unwrap();
        // Near point renders bright, far point dark.
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_depth_to_rgb_rejects_multichannel() {
        let frame = RawFrame {
            height: 1,
            width: 1,
            channels: 3,
            data: vec![0.0; 3],
        };
        assert!(depth_to_rgb(&frame).is_err());
    }
}
