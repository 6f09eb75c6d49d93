//! Iterative sub-pixel corner refinement.
//!
//! At the true corner `q`, every image gradient `g_p` inside the window is
//! orthogonal to `p - q`. Summing `g gᵀ (q - p) = 0` with Gaussian weights
//! gives a 2×2 linear system per iteration.
//!
//! Gradients are Sobel responses at pixel centres of a Gaussian-smoothed
//! copy of the image, and `p` are exact pixel positions. Nothing is
//! resampled at fractional coordinates, so the estimate carries no pull
//! toward the pixel or half-pixel lattice.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stereo_core::{Pt2, Real, Vec2};

use crate::image_f32::{gaussian_blur, ImageF32};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the search window in pixels.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once the update is shorter than this (pixels).
    pub epsilon: Real,
    /// Gaussian smoothing applied before taking gradients.
    pub blur_sigma: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 1e-3,
            blur_sigma: 1.0,
        }
    }
}

/// 3×3 Sobel gradient at a pixel centre, borders clamped.
fn sobel(img: &ImageF32, x: isize, y: isize) -> (Real, Real) {
    let p = |dx: isize, dy: isize| img.get_clamped(x + dx, y + dy) as Real;
    let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
    let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
    (gx / 8.0, gy / 8.0)
}

/// Refine a single corner on an already smoothed image. Corners that drift
/// out of their window keep the initial position.
pub fn refine_corner(smoothed: &ImageF32, initial: Pt2, params: &SubPixParams) -> Pt2 {
    let win = params.half_window.max(1) as isize;
    // Window weights with sigma = half_window / 2.
    let coeff = 2.0 / (win * win) as Real;
    let eps2 = params.epsilon * params.epsilon;

    let mut c = initial;
    for _ in 0..params.max_iters.max(1) {
        let (cx, cy) = (c.x.round() as isize, c.y.round() as isize);
        let (mut a, mut b, mut cc) = (0.0, 0.0, 0.0);
        let (mut bb1, mut bb2) = (0.0, 0.0);
        for py in cy - win..=cy + win {
            for px in cx - win..=cx + win {
                let dx = px as Real - c.x;
                let dy = py as Real - c.y;
                let m = (-(dx * dx + dy * dy) * coeff).exp();
                let (gx, gy) = sobel(smoothed, px, py);
                let (gxx, gxy, gyy) = (gx * gx * m, gx * gy * m, gy * gy * m);
                a += gxx;
                b += gxy;
                cc += gyy;
                bb1 += gxx * dx + gxy * dy;
                bb2 += gxy * dx + gyy * dy;
            }
        }

        let det = a * cc - b * b;
        if det.abs() <= Real::EPSILON * (a * cc).abs().max(1.0) {
            break;
        }
        let scale = 1.0 / det;
        let shift = Vec2::new(
            scale * (cc * bb1 - b * bb2),
            scale * (a * bb2 - b * bb1),
        );
        c += shift;
        let out_of_image = c.x < 0.0
            || c.y < 0.0
            || c.x >= smoothed.w as Real
            || c.y >= smoothed.h as Real;
        if out_of_image || shift.norm_squared() <= eps2 {
            break;
        }
    }

    let drift = c - initial;
    let escaped = drift.x.abs() > win as Real || drift.y.abs() > win as Real;
    if escaped || !c.x.is_finite() || !c.y.is_finite() {
        initial
    } else {
        c
    }
}

/// Smooth once, then refine every corner independently.
pub fn refine_corners(img: &ImageF32, corners: &[Pt2], params: &SubPixParams) -> Vec<Pt2> {
    let smoothed = gaussian_blur(img, params.blur_sigma);
    corners
        .par_iter()
        .map(|&p| refine_corner(&smoothed, p, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Anti-aliased X-junction centred at `(cx, cy)`.
    fn x_junction(cx: f32, cy: f32) -> ImageF32 {
        let mut img = ImageF32::new(40, 40);
        let n = 4;
        for y in 0..40 {
            for x in 0..40 {
                let mut acc = 0.0;
                for sy in 0..n {
                    for sx in 0..n {
                        let fx = x as f32 + (sx as f32 + 0.5) / n as f32 - 0.5 - cx;
                        let fy = y as f32 + (sy as f32 + 0.5) / n as f32 - 0.5 - cy;
                        acc += if (fx >= 0.0) == (fy >= 0.0) { 220.0 } else { 30.0 };
                    }
                }
                img.data[y * 40 + x] = acc / (n * n) as f32;
            }
        }
        img
    }

    fn refine_one(img: &ImageF32, p: Pt2) -> Pt2 {
        refine_corners(img, &[p], &SubPixParams::default())[0]
    }

    #[test]
    fn converges_to_the_junction() {
        let img = x_junction(19.3, 20.6);
        let p = refine_one(&img, Pt2::new(18.0, 21.5));
        assert!((p.x - 19.3).abs() < 0.05, "{p}");
        assert!((p.y - 20.6).abs() < 0.05, "{p}");
    }

    #[test]
    fn accuracy_does_not_depend_on_the_subpixel_phase() {
        // Junctions swept across one full pixel, including the pixel centre
        // and the half-pixel positions.
        let mut worst: Real = 0.0;
        for k in 0..=10 {
            let t = 19.0 + k as f32 * 0.1;
            let img = x_junction(t, 40.0 - t);
            let start = Pt2::new(t as Real + 0.7, (40.0 - t) as Real - 0.6);
            let p = refine_one(&img, start);
            let err = (p - Pt2::new(t as Real, (40.0 - t) as Real)).norm();
            worst = worst.max(err);
        }
        assert!(worst < 0.05, "worst phase error {worst}");
    }

    #[test]
    fn flat_window_keeps_the_initial_guess() {
        let mut img = ImageF32::new(30, 30);
        img.data.fill(100.0);
        let p0 = Pt2::new(12.5, 14.0);
        assert_eq!(refine_one(&img, p0), p0);
    }

    #[test]
    fn sobel_of_a_ramp_is_its_slope() {
        let mut img = ImageF32::new(5, 5);
        for y in 0..5 {
            for x in 0..5 {
                img.data[y * 5 + x] = 3.0 * x as f32 - 2.0 * y as f32;
            }
        }
        let (gx, gy) = sobel(&img, 2, 2);
        assert!((gx - 3.0).abs() < 1e-9);
        assert!((gy + 2.0).abs() < 1e-9);
    }
}
