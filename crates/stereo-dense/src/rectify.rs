//! Bouguet stereo rectification.
//!
//! Each camera is rotated by half of the relative rotation so both look in
//! the same direction, then both are rotated together so the baseline lies
//! along the image x axis (or y for vertical rigs). Both rectified cameras
//! share one focal length and, in zero-disparity mode, one principal point.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Mat3, Mat34, Mat4, PinholeCamera, Pt2, Real, StereoParameters, Vec2, Vec3};

use crate::DenseError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyOptions {
    /// Free scaling: `0` keeps only valid pixels, `1` keeps every source
    /// pixel, `None` keeps the unscaled common focal length.
    pub alpha: Option<Real>,
}

impl Default for RectifyOptions {
    fn default() -> Self {
        Self { alpha: Some(0.0) }
    }
}

/// Integer pixel rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectificationTransforms {
    /// Rotation from the left camera frame into the rectified left frame.
    pub r1: Mat3,
    pub r2: Mat3,
    /// Projection of the rectified left camera.
    pub p1: Mat34,
    /// Projection of the rectified right camera; `p2[(idx, 3)] = f · Tx`.
    pub p2: Mat34,
    /// Disparity-to-depth reprojection matrix.
    pub q: Mat4,
    /// Region of valid pixels in the rectified left image.
    pub roi1: Rect,
    pub roi2: Rect,
    pub image_size: ImageSize,
    pub alpha: Option<Real>,
}

impl RectificationTransforms {
    pub fn focal(&self) -> Real {
        self.p1[(0, 0)]
    }

    /// Signed rectified baseline along the epipolar axis.
    pub fn baseline(&self) -> Real {
        if self.p2[(0, 3)] != 0.0 {
            self.p2[(0, 3)] / self.p2[(0, 0)]
        } else {
            self.p2[(1, 3)] / self.p2[(1, 1)]
        }
    }
}

/// Axis-aligned float bounds, `(x0, y0)` to `(x1, y1)`.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    x0: Real,
    y0: Real,
    x1: Real,
    y1: Real,
}

impl Bounds {
    fn width(&self) -> Real {
        self.x1 - self.x0
    }

    fn height(&self) -> Real {
        self.y1 - self.y0
    }
}

fn rectified_pixel(camera: &PinholeCamera, r: &Mat3, f: Real, c: Vec2, px: &Pt2) -> Pt2 {
    let n = camera.pixel_to_normalized(px);
    let v = r * Vec3::new(n.x, n.y, 1.0);
    Pt2::new(f * v.x / v.z + c.x, f * v.y / v.z + c.y)
}

/// Inscribed and bounding rectangles of the rectified image border.
fn border_rectangles(camera: &PinholeCamera, r: &Mat3, f: Real, c: Vec2, size: ImageSize) -> (Bounds, Bounds) {
    const N: usize = 9;
    let (w, h) = ((size.width - 1) as Real, (size.height - 1) as Real);
    let mut inner = Bounds {
        x0: Real::MIN,
        y0: Real::MIN,
        x1: Real::MAX,
        y1: Real::MAX,
    };
    let mut outer = Bounds {
        x0: Real::MAX,
        y0: Real::MAX,
        x1: Real::MIN,
        y1: Real::MIN,
    };
    for iy in 0..N {
        for ix in 0..N {
            let src = Pt2::new(ix as Real * w / (N - 1) as Real, iy as Real * h / (N - 1) as Real);
            let p = rectified_pixel(camera, r, f, c, &src);
            outer.x0 = outer.x0.min(p.x);
            outer.x1 = outer.x1.max(p.x);
            outer.y0 = outer.y0.min(p.y);
            outer.y1 = outer.y1.max(p.y);
            if ix == 0 {
                inner.x0 = inner.x0.max(p.x);
            }
            if ix == N - 1 {
                inner.x1 = inner.x1.min(p.x);
            }
            if iy == 0 {
                inner.y0 = inner.y0.max(p.y);
            }
            if iy == N - 1 {
                inner.y1 = inner.y1.min(p.y);
            }
        }
    }
    (inner, outer)
}

/// Scale that maps the rectangle `b` (around principal point `c`) onto the
/// full image: the largest per-side ratio for inner rectangles, the
/// smallest for outer ones.
fn side_ratios(b: &Bounds, c: Vec2, size: ImageSize) -> [Real; 4] {
    let (w, h) = (size.width as Real, size.height as Real);
    [
        c.x / (c.x - b.x0),
        c.y / (c.y - b.y0),
        (w - c.x) / (b.x1 - c.x),
        (h - c.y) / (b.y1 - c.y),
    ]
}

fn scaled_roi(inner: &Bounds, c: Vec2, s: Real, size: ImageSize) -> Rect {
    let x0 = ((inner.x0 - c.x) * s + c.x).ceil().max(0.0);
    let y0 = ((inner.y0 - c.y) * s + c.y).ceil().max(0.0);
    let x1 = (x0 + (inner.width() * s).floor()).min(size.width as Real);
    let y1 = (y0 + (inner.height() * s).floor()).min(size.height as Real);
    if x1 <= x0 || y1 <= y0 {
        return Rect::default();
    }
    Rect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    }
}

/// Rectifying rotations, projections and `Q` for a calibrated pair.
pub fn stereo_rectify(
    params: &StereoParameters,
    size: ImageSize,
    opts: &RectifyOptions,
) -> Result<RectificationTransforms, DenseError> {
    if size.width < 2 || size.height < 2 {
        return Err(DenseError::Rectification(format!("image size {size} too small")));
    }
    let cams = [params.left, params.right];
    let rot = Rotation3::from_matrix(&params.extrinsics.rotation);
    let half = Rotation3::from_scaled_axis(rot.scaled_axis() * -0.5);
    let t = half * params.extrinsics.translation;

    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let nt = t.norm();
    if nt <= Real::EPSILON {
        return Err(DenseError::Rectification("zero baseline".into()));
    }
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let ww = t.cross(&uu);
    let nw = ww.norm();
    let w_rot = if nw > 0.0 {
        Rotation3::from_scaled_axis(ww * ((c.abs() / nt).clamp(-1.0, 1.0).acos() / nw))
    } else {
        Rotation3::identity()
    };

    let r1 = (w_rot * half.inverse()).into_inner();
    let r2 = (w_rot * half).into_inner();
    let rs = [r1, r2];
    let t_rect = r2 * params.extrinsics.translation;

    let (nx, ny) = (size.width as Real, size.height as Real);
    let mut fc = Real::MAX;
    for cam in &cams {
        let k = cam.k_matrix();
        let mut f = k[(1 - idx, 1 - idx)];
        let k1 = cam.dist.k1;
        if k1 < 0.0 {
            f *= 1.0 + k1 * (nx * nx + ny * ny) / (4.0 * f * f);
        }
        fc = fc.min(f);
    }
    if !fc.is_finite() || fc <= 0.0 {
        return Err(DenseError::Rectification(format!("invalid focal length {fc}")));
    }

    let corners = [
        Pt2::new(0.0, 0.0),
        Pt2::new(nx - 1.0, 0.0),
        Pt2::new(0.0, ny - 1.0),
        Pt2::new(nx - 1.0, ny - 1.0),
    ];
    let centre = Vec2::new((nx - 1.0) / 2.0, (ny - 1.0) / 2.0);
    let mut cc = [Vec2::zeros(); 2];
    for k in 0..2 {
        let mean = corners
            .iter()
            .map(|p| rectified_pixel(&cams[k], &rs[k], fc, Vec2::zeros(), p).coords)
            .sum::<Vec2>()
            / corners.len() as Real;
        cc[k] = centre - mean;
    }
    let shared = (cc[0] + cc[1]) * 0.5;
    cc = [shared, shared];

    let rects: Vec<(Bounds, Bounds)> = (0..2)
        .map(|k| border_rectangles(&cams[k], &rs[k], fc, cc[k], size))
        .collect();
    let s = match opts.alpha {
        Some(alpha) => {
            let s0 = (0..2)
                .flat_map(|k| side_ratios(&rects[k].0, cc[k], size))
                .fold(Real::MIN, Real::max);
            let s1 = (0..2)
                .flat_map(|k| side_ratios(&rects[k].1, cc[k], size))
                .fold(Real::MAX, Real::min);
            s0 * (1.0 - alpha) + s1 * alpha
        }
        None => 1.0,
    };
    if !s.is_finite() || s <= 0.0 {
        return Err(DenseError::Rectification(format!("invalid scale {s}")));
    }
    let f = fc * s;

    let projection = |c: Vec2| {
        let mut p = Mat34::zeros();
        p[(0, 0)] = f;
        p[(1, 1)] = f;
        p[(0, 2)] = c.x;
        p[(1, 2)] = c.y;
        p[(2, 2)] = 1.0;
        p
    };
    let p1 = projection(cc[0]);
    let mut p2 = projection(cc[1]);
    p2[(idx, 3)] = t_rect[idx] * f;

    let tx = t_rect[idx];
    let mut q = Mat4::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -cc[0].x;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -cc[0].y;
    q[(2, 3)] = f;
    q[(3, 2)] = -1.0 / tx;
    q[(3, 3)] = (cc[0][idx] - cc[1][idx]) / tx;

    Ok(RectificationTransforms {
        r1,
        r2,
        p1,
        p2,
        q,
        roi1: scaled_roi(&rects[0].0, cc[0], s, size),
        roi2: scaled_roi(&rects[1].0, cc[1], s, size),
        image_size: size,
        alpha: opts.alpha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};
    use stereo_core::{BrownConrady5, FxFyCxCySkew, Iso3, StereoExtrinsics};

    fn params() -> StereoParameters {
        let cam = |fx: Real, cx: Real, k1: Real| {
            PinholeCamera::new(
                FxFyCxCySkew {
                    fx,
                    fy: fx,
                    cx,
                    cy: 240.0,
                    skew: 0.0,
                },
                BrownConrady5 {
                    k1,
                    ..BrownConrady5::default()
                },
            )
        };
        let rig = Iso3::from_parts(
            Translation3::new(-60.0, 1.0, 0.5),
            UnitQuaternion::from_euler_angles(0.01, -0.03, 0.005),
        );
        StereoParameters {
            image_size: ImageSize::new(640, 480),
            left: cam(800.0, 320.0, -0.1),
            right: cam(810.0, 315.0, -0.05),
            extrinsics: StereoExtrinsics::from_iso(&rig),
            essential: Mat3::identity(),
            fundamental: Mat3::identity(),
            rms: 0.2,
            rms_left: None,
            rms_right: None,
        }
    }

    #[test]
    fn rectified_frames_are_parallel_and_baseline_is_horizontal() {
        let p = params();
        let rt = stereo_rectify(&p, p.image_size, &RectifyOptions::default()).unwrap();
        // R2 · R = R1: both rectified frames share an orientation.
        let diff = rt.r2 * p.extrinsics.rotation - rt.r1;
        assert!(diff.norm() < 1e-9);
        let t = rt.r2 * p.extrinsics.translation;
        assert!(t.y.abs() < 1e-9 && t.z.abs() < 1e-9);
        assert!((rt.baseline() - t.x).abs() < 1e-9);
        assert_eq!(rt.p1[(0, 2)], rt.p2[(0, 2)]);
        assert_eq!(rt.p1[(1, 2)], rt.p2[(1, 2)]);
    }

    #[test]
    fn alpha_zero_zooms_in_relative_to_alpha_one() {
        let p = params();
        let crop = stereo_rectify(&p, p.image_size, &RectifyOptions { alpha: Some(0.0) }).unwrap();
        let keep = stereo_rectify(&p, p.image_size, &RectifyOptions { alpha: Some(1.0) }).unwrap();
        assert!(crop.focal() > keep.focal());
        // With alpha = 0 the valid region covers most of the frame.
        let full = 640 * 480;
        assert!(crop.roi1.area() as f64 > 0.9 * full as f64);
        assert!(keep.roi1.area() < crop.roi1.area());
    }

    #[test]
    fn zero_baseline_is_an_error() {
        let mut p = params();
        p.extrinsics.translation = Vec3::zeros();
        assert!(stereo_rectify(&p, p.image_size, &RectifyOptions::default()).is_err());
    }
}
