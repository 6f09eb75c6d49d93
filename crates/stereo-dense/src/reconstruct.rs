//! Disparity to 3D points.

use image::RgbImage;
use nalgebra::{Point3, Vector4};
use rayon::prelude::*;
use stereo_core::{ImageSize, Mat4, Real};

use crate::disparity::DisparityField;
use crate::DenseError;

/// Points at or beyond this depth are dropped from clouds by default.
pub const DEFAULT_MAX_DEPTH: f32 = 1000.0;

/// Unfiltered 3D position for every pixel of a disparity field.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGrid {
    pub width: u32,
    pub height: u32,
    pub points: Vec<Point3<f32>>,
}

impl PointGrid {
    /// Point behind pixel `(x, y)`; `None` outside the grid.
    pub fn at(&self, x: u32, y: u32) -> Option<Point3<f32>> {
        (x < self.width && y < self.height)
            .then(|| self.points[y as usize * self.width as usize + x as usize])
    }
}

/// Filtered coloured points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f32>>,
    pub colors: Vec<[u8; 3]>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub grid: PointGrid,
    pub cloud: PointCloud,
}

/// `[X Y Z W]ᵀ = Q · [x y d 1]ᵀ` for every pixel, including rejected ones.
pub fn reproject_image_to_3d(disp: &DisparityField, q: &Mat4) -> PointGrid {
    let w = disp.width as usize;
    let mut points = vec![Point3::origin(); disp.data.len()];
    points
        .par_chunks_mut(w.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, p) in row.iter_mut().enumerate() {
                let d = disp.data[y * w + x] as Real;
                let v = q * Vector4::new(x as Real, y as Real, d, 1.0);
                let inv_w = 1.0 / v.w;
                *p = Point3::new((v.x * inv_w) as f32, (v.y * inv_w) as f32, (v.z * inv_w) as f32);
            }
        });
    PointGrid {
        width: disp.width,
        height: disp.height,
        points,
    }
}

/// Keep pixels with an accepted disparity and a finite depth below
/// `max_depth`, coloured from `colors`.
pub fn filter_points(
    disp: &DisparityField,
    grid: &PointGrid,
    colors: &RgbImage,
    max_depth: f32,
) -> Result<PointCloud, DenseError> {
    let ds = disp.size();
    for other in [
        ImageSize::new(grid.width, grid.height),
        ImageSize::new(colors.width(), colors.height()),
    ] {
        if other != ds {
            return Err(DenseError::SizeMismatch {
                left: ds,
                right: other,
            });
        }
    }

    let mut cloud = PointCloud::default();
    for (i, (&d, p)) in disp.data.iter().zip(&grid.points).enumerate() {
        if !disp.is_valid(d) || !p.z.is_finite() || p.z >= max_depth {
            continue;
        }
        let (x, y) = ((i % disp.width as usize) as u32, (i / disp.width as usize) as u32);
        cloud.points.push(*p);
        cloud.colors.push(colors.get_pixel(x, y).0);
    }
    Ok(cloud)
}

/// Every `stride`-th point starting at index 0; stride 0 or 1 keeps all.
pub fn decimate(cloud: &PointCloud, stride: usize) -> PointCloud {
    let step = stride.max(1);
    PointCloud {
        points: cloud.points.iter().step_by(step).copied().collect(),
        colors: cloud.colors.iter().step_by(step).copied().collect(),
    }
}

pub fn reconstruct(
    disp: &DisparityField,
    q: &Mat4,
    colors: &RgbImage,
    max_depth: f32,
) -> Result<Reconstruction, DenseError> {
    let grid = reproject_image_to_3d(disp, q);
    let cloud = filter_points(disp, &grid, colors, max_depth)?;
    Ok(Reconstruction { grid, cloud })
}
