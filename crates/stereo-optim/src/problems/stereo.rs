//! Joint stereo refinement.
//!
//! Starts from two mono calibrations of the same views, initialises the rig
//! transform with order-independent averaging and refines both cameras, the
//! rig and the left-camera board poses against the combined reprojection
//! error of both images.

use anyhow::{anyhow, ensure, Context, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use stereo_core::{
    CorrespondenceView, ImageSize, Iso3, Mat3, PinholeCamera, Real, StereoExtrinsics,
    StereoParameters,
};
use stereo_linear::{essential_from_extrinsics, estimate_rig_extrinsics, fundamental_from_essential};

use super::bundle::{BundleLayout, ObservationGroup, PlanarBundleProblem};
use super::mono::MonoCalibration;
use crate::params::{pack_pose, CameraBlock, CAMERA_BLOCK_LEN};
use crate::{LmBackend, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCalibOptions {
    /// Keep both cameras at their mono estimates and solve only the rig and poses.
    pub fix_intrinsics: bool,
    pub fix_k3: bool,
    pub fix_tangential: bool,
    pub robust: RobustKernel,
    pub solve: SolveOptions,
}

impl Default for StereoCalibOptions {
    fn default() -> Self {
        Self {
            fix_intrinsics: false,
            fix_k3: true,
            fix_tangential: false,
            robust: RobustKernel::None,
            solve: SolveOptions {
                max_iters: 100,
                ..SolveOptions::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StereoCalibration {
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    /// `right_from_left`.
    pub rig: Iso3,
    /// `left_from_board` per view.
    pub poses: Vec<Iso3>,
    /// RMS over the points of both cameras.
    pub rms: Real,
    pub rms_left: Real,
    pub rms_right: Real,
    pub essential: Mat3,
    pub fundamental: Mat3,
    pub report: SolveReport,
}

impl StereoCalibration {
    pub fn extrinsics(&self) -> StereoExtrinsics {
        StereoExtrinsics::from_iso(&self.rig)
    }

    /// Bundle for persistence; `mono_rms` carries the per-camera mono errors.
    pub fn to_parameters(
        &self,
        image_size: ImageSize,
        mono_rms: Option<(Real, Real)>,
    ) -> StereoParameters {
        StereoParameters {
            image_size,
            left: self.left,
            right: self.right,
            extrinsics: self.extrinsics(),
            essential: self.essential,
            fundamental: self.fundamental,
            rms: self.rms,
            rms_left: mono_rms.map(|(l, _)| l),
            rms_right: mono_rms.map(|(_, r)| r),
        }
    }
}

pub fn calibrate_stereo(
    left_views: &[CorrespondenceView],
    right_views: &[CorrespondenceView],
    left: &MonoCalibration,
    right: &MonoCalibration,
    opts: &StereoCalibOptions,
) -> Result<StereoCalibration> {
    let n = left_views.len();
    ensure!(n > 0, "no views to calibrate from");
    ensure!(
        right_views.len() == n,
        "left/right view counts differ: {} vs {}",
        n,
        right_views.len()
    );
    ensure!(
        left.poses.len() == n && right.poses.len() == n,
        "mono calibrations cover {} / {} views, expected {}",
        left.poses.len(),
        right.poses.len(),
        n
    );
    for (i, (l, r)) in left_views.iter().zip(right_views).enumerate() {
        ensure!(
            l.points_3d == r.points_3d,
            "view {i}: left and right observe different target points"
        );
    }

    let rig0 = estimate_rig_extrinsics(&left.poses, &right.poses).context("rig initialisation")?;
    log::debug!(
        "rig init: baseline {:.3}, t = {:?}",
        rig0.translation.vector.norm(),
        rig0.translation.vector.as_slice()
    );

    let layout = BundleLayout {
        n_cameras: 2,
        n_views: n,
    };
    let mut base = Vec::with_capacity(layout.len());
    base.extend(CameraBlock::pack(&left.camera));
    base.extend(CameraBlock::pack(&right.camera));
    base.extend(pack_pose(&rig0));
    for pose in &left.poses {
        base.extend(pack_pose(pose));
    }

    let fixed: Vec<usize> = if opts.fix_intrinsics {
        (0..2 * CAMERA_BLOCK_LEN).collect()
    } else {
        let per_cam = CameraBlock::fixed_offsets(opts.fix_k3, opts.fix_tangential);
        (0..2)
            .flat_map(|cam| per_cam.iter().map(move |o| layout.camera_offset(cam) + o))
            .collect()
    };

    let mut groups = Vec::with_capacity(2 * n);
    for (i, (l, r)) in left_views.iter().zip(right_views).enumerate() {
        groups.push(ObservationGroup::new(i, 0, l));
        groups.push(ObservationGroup::new(i, 1, r));
    }
    let problem =
        PlanarBundleProblem::new(layout, DVector::from_vec(base), &fixed, groups, opts.robust)?;

    let (x, report) = LmBackend.solve(&problem, problem.initial_free(), &opts.solve);
    let full = problem.expand(&x);

    let left_cam = problem.camera(&full, 0);
    let right_cam = problem.camera(&full, 1);
    let rig = problem
        .rig(&full)
        .ok_or_else(|| anyhow!("stereo layout lost its rig block"))?;
    let poses = (0..n).map(|i| problem.pose(&full, i)).collect();
    let rms = problem.rms_where(&full, |_| true);
    ensure!(rms.is_finite(), "stereo refinement diverged");
    let rms_left = problem.rms_where(&full, |g| g.camera == 0);
    let rms_right = problem.rms_where(&full, |g| g.camera == 1);

    let extr = StereoExtrinsics::from_iso(&rig);
    let essential = essential_from_extrinsics(&extr.rotation, &extr.translation);
    let fundamental =
        fundamental_from_essential(&essential, &left_cam.k_matrix(), &right_cam.k_matrix())
            .ok_or_else(|| anyhow!("singular intrinsics after stereo refinement"))?;

    log::info!(
        "stereo calibration: rms {:.4} px (left {:.4}, right {:.4}), baseline {:.3}",
        rms,
        rms_left,
        rms_right,
        extr.baseline()
    );

    Ok(StereoCalibration {
        left: left_cam,
        right: right_cam,
        rig,
        poses,
        rms,
        rms_left,
        rms_right,
        essential,
        fundamental,
        report,
    })
}
