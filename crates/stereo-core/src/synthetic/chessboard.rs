//! Ray-traced chessboard images for detector and pipeline tests.

use image::{GrayImage, Luma};

use crate::{CalibrationTarget, ImageSize, Iso3, PinholeCamera, Pt2, Real, Vec3};

/// Appearance of a rendered chessboard frame.
#[derive(Debug, Clone, Copy)]
pub struct ChessboardStyle {
    pub dark: u8,
    pub light: u8,
    pub background: u8,
    /// Supersampling factor per axis (anti-aliasing).
    pub samples: u32,
}

impl Default for ChessboardStyle {
    fn default() -> Self {
        Self {
            dark: 25,
            light: 225,
            background: 120,
            samples: 3,
        }
    }
}

/// Render `target` as seen by `camera` from `cam_from_target`.
///
/// The board has one extra square on each side of the interior corners
/// (so interior corners are X-junctions) and a light margin of one square.
pub fn render_chessboard(
    camera: &PinholeCamera,
    cam_from_target: &Iso3,
    target: &CalibrationTarget,
    size: ImageSize,
    style: ChessboardStyle,
) -> GrayImage {
    let target_from_cam = cam_from_target.inverse();
    let origin = target_from_cam.translation.vector;
    let s = target.square_size;
    let n = style.samples.max(1);
    let inv_n = 1.0 / n as Real;

    let shade = |px: Real, py: Real| -> Real {
        let ray = camera.backproject_pixel(&Pt2::new(px, py));
        let dir: Vec3 = target_from_cam.rotation * ray;
        if dir.z.abs() < 1e-12 {
            return style.background as Real;
        }
        let t = -origin.z / dir.z;
        if t <= 0.0 {
            return style.background as Real;
        }
        let x = origin.x + t * dir.x;
        let y = origin.y + t * dir.y;
        let qx = (x / s).floor() as i64 + 1;
        let qy = (y / s).floor() as i64 + 1;
        let cols = target.cols as i64;
        let rows = target.rows as i64;
        if qx < -1 || qy < -1 || qx > cols + 1 || qy > rows + 1 {
            return style.background as Real;
        }
        if qx < 0 || qy < 0 || qx > cols || qy > rows {
            return style.light as Real;
        }
        if (qx + qy) % 2 == 0 {
            style.dark as Real
        } else {
            style.light as Real
        }
    };

    GrayImage::from_fn(size.width, size.height, |u, v| {
        let mut acc = 0.0;
        for sy in 0..n {
            for sx in 0..n {
                let px = u as Real - 0.5 + (sx as Real + 0.5) * inv_n;
                let py = v as Real - 0.5 + (sy as Real + 0.5) * inv_n;
                acc += shade(px, py);
            }
        }
        Luma([(acc * inv_n * inv_n).round().clamp(0.0, 255.0) as u8])
    })
}
