//! Point-cloud rasterization.
//!
//! Projects a labeled cloud through a fixed orthographic camera and
//! splats points with an alpha-compositing blend, nearer points
//! weighted more heavily. The camera pose, output resolution, and
//! oversampling factor are fixed; the raster is a pure function of
//! the cloud.

use image::{Rgb, RgbImage};
use nalgebra::{Isometry3, Point3, Vector3};
use trajview_env::{PointCloud, PointLabel};

use crate::error::PlaybackError;

/// Blend weight of a single splatted point.
const POINT_ALPHA: f32 = 0.8;

/// Fixed-camera orthographic point rasterizer.
pub struct CloudRasterizer {
    image_size: u32,
    points_per_pixel: usize,
    znear: f32,
    view: Isometry3<f32>,
}

impl CloudRasterizer {
    /// Creates the rasterizer at the canonical viewing pose: camera at
    /// distance 1, elevation 0, azimuth 90 degrees, +X up, looking at
    /// the origin.
    pub fn new() -> Self {
        Self::with_view_angle(1.0, 0.0, 90.0, Vector3::x())
    }

    /// Creates a rasterizer from spherical look-at parameters.
    ///
    /// Angles are in degrees. An up vector collinear with the viewing
    /// direction falls back to +Y.
    pub fn with_view_angle(
        distance: f32,
        elevation: f32,
        azimuth: f32,
        up: Vector3<f32>,
    ) -> Self {
        let elev = elevation.to_radians();
        let azim = azimuth.to_radians();
        let eye = Point3::new(
            distance * elev.cos() * azim.sin(),
            distance * elev.sin(),
            distance * elev.cos() * azim.cos(),
        );
        let target = Point3::origin();

        let dir = (target - eye).normalize();
        let up = if dir.cross(&up).norm() < 1e-6 {
            Vector3::y()
        } else {
            up
        };

        Self {
            image_size: 512,
            points_per_pixel: 10,
            znear: 0.01,
            view: Isometry3::look_at_rh(&eye, &target, &up),
        }
    }

    /// Output resolution (square, in pixels).
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Rasterizes one cloud into a fixed-size color image.
    ///
    /// Fails on any point label outside the {0, 1, 2} palette before
    /// touching a single pixel.
    pub fn rasterize(&self, cloud: &PointCloud) -> Result<RgbImage, PlaybackError> {
        let colors: Vec<[u8; 3]> = cloud
            .labels
            .iter()
            .map(|&raw| PointLabel::try_from(raw).map(|l| l.color()))
            .collect::<Result<_, _>>()
            .map_err(PlaybackError::Env)?;

        let size = self.image_size as usize;
        let mut buckets: Vec<Vec<(f32, [u8; 3])>> = vec![Vec::new(); size * size];

        for (point, color) in cloud.points.iter().zip(&colors) {
            let cam = self.view.transform_point(point);
            let depth = -cam.z;
            if depth <= self.znear {
                continue;
            }
            // Orthographic NDC with unit half-extents.
            let (ndc_x, ndc_y) = (cam.x, cam.y);
            if !(-1.0..=1.0).contains(&ndc_x) || !(-1.0..=1.0).contains(&ndc_y) {
                continue;
            }
            let px = ((ndc_x + 1.0) * 0.5 * (self.image_size - 1) as f32).round() as usize;
            let py = ((1.0 - ndc_y) * 0.5 * (self.image_size - 1) as f32).round() as usize;
            buckets[py * size + px].push((depth, *color));
        }

        let mut img = RgbImage::new(self.image_size, self.image_size);
        for (idx, bucket) in buckets.iter_mut().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            bucket.sort_by(|a, b| a.0.total_cmp(&b.0));
            bucket.truncate(self.points_per_pixel);

            // Front-to-back over-compositing: each point contributes
            // POINT_ALPHA of whatever weight its occluders left over.
            let mut acc = [0.0f32; 3];
            let mut remaining = 1.0f32;
            for (_, color) in bucket.iter() {
                let w = POINT_ALPHA * remaining;
                for c in 0..3 {
                    acc[c] += w * color[c] as f32;
                }
                remaining *= 1.0 - POINT_ALPHA;
            }

            let x = (idx % size) as u32;
            let y = (idx / size) as u32;
            img.put_pixel(
                x,
                y,
                Rgb([
                    acc[0].round().clamp(0.0, 255.0) as u8,
                    acc[1].round().clamp(0.0, 255.0) as u8,
                    acc[2].round().clamp(0.0, 255.0) as u8,
                ]),
            );
        }
        Ok(img)
    }
}

impl Default for CloudRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trajview_env::EnvError;

    fn cloud_of(label: PointLabel, n: usize) -> PointCloud {
        let mut cloud = PointCloud::with_capacity(n);
        for i in 0..n {
            let t = i as f32 / n as f32 - 0.5;
            cloud.push(Point3::new(t * 0.2, t * 0.5, t * 0.5), label);
        }
        cloud
    }

    fn channel_sums(img: &RgbImage) -> [u64; 3] {
        let mut sums = [0u64; 3];
        for pixel in img.pixels() {
            for c in 0..3 {
                sums[c] += pixel.0[c] as u64;
            }
        }
        sums
    }

    #[test]
    fn test_label_zero_is_red_dominant() {
        let img = CloudRasterizer::new()
            .rasterize(&cloud_of(PointLabel::Robot, 64))
            .unwrap();
        let [r, g, b] = channel_sums(&img);
        assert!(r > 0);
        assert_eq!(g, 0);
        assert_eq!(b, 0);
    }

    #[test]
    fn test_label_outside_palette_is_fatal() {
        let mut cloud = cloud_of(PointLabel::Robot, 4);
        cloud.labels[2] = 7;
        let err = CloudRasterizer::new().rasterize(&cloud).err().unwrap();
        assert!(matches!(err, PlaybackError::Env(EnvError::BadLabel(7))));
    }

    #[test]
    fn test_raster_is_deterministic() {
        let rasterizer = CloudRasterizer::new();
        let cloud = cloud_of(PointLabel::Obstacle, 128);
        let a = rasterizer.rasterize(&cloud).unwrap();
        let b = rasterizer.rasterize(&cloud).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_output_resolution_is_fixed() {
        let img = CloudRasterizer::new().rasterize(&PointCloud::default()).unwrap();
        assert_eq!(img.dimensions(), (512, 512));
    }

    #[test]
    fn test_nearer_point_dominates_shared_pixel() {
        let mut cloud = PointCloud::with_capacity(2);
        // Both points project to the image center; the robot point is
        // nearer to the camera at (1, 0, 0).
        cloud.push(Point3::new(0.5, 0.0, 0.0), PointLabel::Robot);
        cloud.push(Point3::new(-0.5, 0.0, 0.0), PointLabel::Target);
        let img = CloudRasterizer::new().rasterize(&cloud).unwrap();
        let center = img.get_pixel(256, 256).0;
        assert!(center[0] > center[2]);
    }
}
