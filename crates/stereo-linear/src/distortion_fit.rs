//! Linear Brown-Conrady estimate from homography residuals.
//!
//! With K known, each correspondence gives `n_obs - n_ideal ≈ D(n_ideal)`
//! where `n_ideal` is the homography prediction in normalized coordinates
//! and `D` is linear in `(k1, k2, k3, p1, p2)`. The overdetermined system is
//! solved in the least-squares sense. Intended only as an initial guess.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use stereo_core::{BrownConrady5, Mat3, Pt2, Real, Vec2, Vec3};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DistortionFitError {
    #[error("need at least {0} points for distortion estimation, got {1}")]
    NotEnoughPoints(usize, usize),
    #[error("svd failed during distortion estimation")]
    SvdFailed,
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
}

/// Which coefficients the linear fit estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionFitOptions {
    pub fix_tangential: bool,
    pub fix_k3: bool,
}

impl Default for DistortionFitOptions {
    fn default() -> Self {
        Self {
            fix_tangential: false,
            fix_k3: true,
        }
    }
}

/// One view: homography computed from the raw (distorted) pixels plus its correspondences.
#[derive(Debug, Clone)]
pub struct DistortionView<'a> {
    pub homography: Mat3,
    pub board_points: &'a [Pt2],
    pub pixel_points: &'a [Pt2],
}

pub fn estimate_distortion_from_homographies(
    intrinsics: &Mat3,
    views: &[DistortionView<'_>],
    opts: DistortionFitOptions,
) -> Result<BrownConrady5<Real>, DistortionFitError> {
    let total: usize = views
        .iter()
        .map(|v| v.board_points.len().min(v.pixel_points.len()))
        .sum();
    let n_params = 2 + usize::from(!opts.fix_k3) + if opts.fix_tangential { 0 } else { 2 };
    if 2 * total < n_params + 1 {
        return Err(DistortionFitError::NotEnoughPoints(n_params.div_ceil(2) + 1, total));
    }

    let k_inv = intrinsics
        .try_inverse()
        .ok_or(DistortionFitError::IntrinsicsNotInvertible)?;
    let to_norm = |p: &Pt2| -> Vec2 {
        let h = k_inv * Vec3::new(p.x, p.y, 1.0);
        Vec2::new(h.x / h.z, h.y / h.z)
    };

    let mut a = DMatrix::<Real>::zeros(2 * total, n_params);
    let mut b = DVector::<Real>::zeros(2 * total);
    let mut row = 0;
    for view in views {
        for (bp, obs) in view.board_points.iter().zip(view.pixel_points) {
            let ideal = view.homography * Vec3::new(bp.x, bp.y, 1.0);
            let n_ideal = to_norm(&Pt2::new(ideal.x / ideal.z, ideal.y / ideal.z));
            let residual = to_norm(obs) - n_ideal;

            let (x, y) = (n_ideal.x, n_ideal.y);
            let r2 = x * x + y * y;
            let mut col = 0;
            for rk in [r2, r2 * r2] {
                a[(row, col)] = x * rk;
                a[(row + 1, col)] = y * rk;
                col += 1;
            }
            if !opts.fix_k3 {
                let r6 = r2 * r2 * r2;
                a[(row, col)] = x * r6;
                a[(row + 1, col)] = y * r6;
                col += 1;
            }
            if !opts.fix_tangential {
                a[(row, col)] = 2.0 * x * y;
                a[(row + 1, col)] = r2 + 2.0 * y * y;
                a[(row, col + 1)] = r2 + 2.0 * x * x;
                a[(row + 1, col + 1)] = 2.0 * x * y;
            }
            b[row] = residual.x;
            b[row + 1] = residual.y;
            row += 2;
        }
    }

    let sol = a
        .svd(true, true)
        .solve(&b, 1e-14)
        .map_err(|_| DistortionFitError::SvdFailed)?;

    let mut dist = BrownConrady5 {
        k1: sol[0],
        k2: sol[1],
        ..BrownConrady5::default()
    };
    let mut idx = 2;
    if !opts.fix_k3 {
        dist.k3 = sol[idx];
        idx += 1;
    }
    if !opts.fix_tangential {
        dist.p1 = sol[idx];
        dist.p2 = sol[idx + 1];
    }
    Ok(dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::DistortionModel;

    #[test]
    fn recovers_radial_distortion_on_fronto_parallel_view() {
        let k = Mat3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0);
        let truth = BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            ..BrownConrady5::default()
        };
        // Board at Z = 1 facing the camera: H = K diag(1, 1, 1) on metric board points.
        let board: Vec<Pt2> = (-5..=5)
            .flat_map(|j| (-7..=7).map(move |i| Pt2::new(i as f64 * 0.04, j as f64 * 0.04)))
            .collect();
        let pixels: Vec<Pt2> = board
            .iter()
            .map(|p| {
                let d = truth.distort(&Vec2::new(p.x, p.y));
                Pt2::new(800.0 * d.x + 320.0, 800.0 * d.y + 240.0)
            })
            .collect();
        let view = DistortionView {
            homography: k,
            board_points: &board,
            pixel_points: &pixels,
        };
        let est = estimate_distortion_from_homographies(
            &k,
            &[view],
            DistortionFitOptions {
                fix_tangential: true,
                fix_k3: true,
            },
        )
        .unwrap();
        assert!((est.k1 - truth.k1).abs() < 1e-6, "k1 {}", est.k1);
        assert!((est.k2 - truth.k2).abs() < 1e-5, "k2 {}", est.k2);
    }
}
