//! Single-camera calibration from planar target views.
//!
//! Initialisation: per-view homographies, Zhang's closed form (falling back
//! to a centred principal point when Zhang is degenerate), optional linear
//! distortion fit and homography pose decomposition. Refinement: LM over
//! intrinsics, distortion and all board poses.

use anyhow::{ensure, Context, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use stereo_core::{
    BrownConrady5, CorrespondenceView, FxFyCxCySkew, ImageSize, Iso3, Mat3, PinholeCamera, Real,
};
use stereo_linear::{
    dlt_homography, estimate_distortion_from_homographies,
    estimate_focal_with_fixed_principal_point, estimate_intrinsics_from_homographies,
    estimate_planar_pose_from_h, DistortionFitOptions, DistortionView,
};

use super::bundle::{BundleLayout, ObservationGroup, PlanarBundleProblem};
use crate::params::{pack_pose, CameraBlock};
use crate::{LmBackend, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoCalibOptions {
    /// Hold k3 at zero.
    pub fix_k3: bool,
    /// Hold p1 and p2 at zero.
    pub fix_tangential: bool,
    /// Seed distortion with the linear homography-residual fit instead of zero.
    pub init_distortion: bool,
    pub robust: RobustKernel,
    pub solve: SolveOptions,
}

impl Default for MonoCalibOptions {
    fn default() -> Self {
        Self {
            fix_k3: true,
            fix_tangential: false,
            init_distortion: false,
            robust: RobustKernel::None,
            solve: SolveOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonoCalibration {
    pub camera: PinholeCamera,
    /// `cam_from_board` for each input view, in input order.
    pub poses: Vec<Iso3>,
    /// `sqrt(Σ‖r‖² / N_points)` in pixels.
    pub rms: Real,
    pub per_view_rms: Vec<Real>,
    pub report: SolveReport,
}

pub fn calibrate_mono(
    views: &[CorrespondenceView],
    image_size: ImageSize,
    opts: &MonoCalibOptions,
) -> Result<MonoCalibration> {
    ensure!(!views.is_empty(), "no views to calibrate from");
    for (i, v) in views.iter().enumerate() {
        ensure!(
            v.points_3d.len() == v.points_2d.len(),
            "view {i}: 3D / 2D point counts differ"
        );
        ensure!(v.len() >= 4, "view {i}: need at least 4 points, got {}", v.len());
    }

    let board_points: Vec<_> = views.iter().map(|v| v.planar_points()).collect();
    let homographies = views
        .iter()
        .zip(&board_points)
        .enumerate()
        .map(|(i, (v, bp))| dlt_homography(bp, &v.points_2d).with_context(|| format!("view {i}")))
        .collect::<Result<Vec<Mat3>>>()?;

    let k = initial_intrinsics(&homographies, image_size)?;
    let kmtx = k.k_matrix();

    let dist = if opts.init_distortion {
        let dviews: Vec<DistortionView<'_>> = views
            .iter()
            .zip(&board_points)
            .zip(&homographies)
            .map(|((v, bp), h)| DistortionView {
                homography: *h,
                board_points: bp,
                pixel_points: &v.points_2d,
            })
            .collect();
        let fit_opts = DistortionFitOptions {
            fix_tangential: opts.fix_tangential,
            fix_k3: opts.fix_k3,
        };
        match estimate_distortion_from_homographies(&kmtx, &dviews, fit_opts) {
            Ok(d) if d.k1.abs() < 1.0 => d,
            Ok(d) => {
                log::warn!("discarding implausible distortion seed k1 = {:.3}", d.k1);
                BrownConrady5::default()
            }
            Err(e) => {
                log::warn!("distortion seed failed: {e}");
                BrownConrady5::default()
            }
        }
    } else {
        BrownConrady5::default()
    };

    let poses = homographies
        .iter()
        .enumerate()
        .map(|(i, h)| estimate_planar_pose_from_h(&kmtx, h).with_context(|| format!("view {i}")))
        .collect::<Result<Vec<Iso3>>>()?;

    let camera = PinholeCamera::new(k, dist);
    log::debug!(
        "mono init: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        k.fx,
        k.fy,
        k.cx,
        k.cy
    );

    let layout = BundleLayout {
        n_cameras: 1,
        n_views: views.len(),
    };
    let mut base = Vec::with_capacity(layout.len());
    base.extend(CameraBlock::pack(&camera));
    for pose in &poses {
        base.extend(pack_pose(pose));
    }
    let fixed = CameraBlock::fixed_offsets(opts.fix_k3, opts.fix_tangential);
    let groups = views
        .iter()
        .enumerate()
        .map(|(i, v)| ObservationGroup::new(i, 0, v))
        .collect();
    let problem =
        PlanarBundleProblem::new(layout, DVector::from_vec(base), &fixed, groups, opts.robust)?;

    let (x, report) = LmBackend.solve(&problem, problem.initial_free(), &opts.solve);
    let full = problem.expand(&x);

    let camera = problem.camera(&full, 0);
    let poses = (0..views.len()).map(|i| problem.pose(&full, i)).collect();
    let rms = problem.rms_where(&full, |_| true);
    let per_view_rms = (0..views.len())
        .map(|i| problem.rms_where(&full, |g| g.view == i))
        .collect();
    ensure!(rms.is_finite(), "mono refinement diverged");

    log::info!(
        "mono calibration: rms {:.4} px over {} views (fx={:.2} fy={:.2} cx={:.2} cy={:.2})",
        rms,
        views.len(),
        camera.k.fx,
        camera.k.fy,
        camera.k.cx,
        camera.k.cy
    );

    Ok(MonoCalibration {
        camera,
        poses,
        rms,
        per_view_rms,
        report,
    })
}

/// Closed-form intrinsics seed with zero skew.
///
/// Zhang's solution is used when it exists and is plausible for the image;
/// otherwise the principal point is fixed at the image centre.
pub fn initial_intrinsics(homographies: &[Mat3], image_size: ImageSize) -> Result<FxFyCxCySkew<Real>> {
    let (w, h) = (image_size.width as Real, image_size.height as Real);
    let plausible = |k: &FxFyCxCySkew<Real>| {
        k.fx > 0.0
            && k.fy > 0.0
            && (0.5..2.0).contains(&(k.fx / k.fy))
            && (0.0..=w).contains(&k.cx)
            && (0.0..=h).contains(&k.cy)
    };

    match estimate_intrinsics_from_homographies(homographies) {
        Ok(k) if plausible(&k) => {
            return Ok(FxFyCxCySkew { skew: 0.0, ..k });
        }
        Ok(k) => log::debug!("zhang init implausible ({k:?}), fixing principal point"),
        Err(e) => log::debug!("zhang init unavailable ({e}), fixing principal point"),
    }

    let cx = 0.5 * (w - 1.0);
    let cy = 0.5 * (h - 1.0);
    match estimate_focal_with_fixed_principal_point(homographies, cx, cy) {
        Ok(k) if plausible(&k) => Ok(k),
        Ok(k) => anyhow::bail!("intrinsics initialisation failed: implausible focal ({:.1}, {:.1})", k.fx, k.fy),
        Err(e) => Err(e).context("intrinsics initialisation failed"),
    }
}
