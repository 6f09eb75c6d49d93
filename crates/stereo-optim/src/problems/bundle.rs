//! Planar-target bundle adjustment for one camera or a two-camera rig.
//!
//! Parameter vector layout:
//!
//! ```text
//! [camera 0 (9)] [camera 1 (9)]? [rig right_from_left (6)]? [pose 0 (6)] ... [pose N-1 (6)]
//! ```
//!
//! Poses map the board into camera 0. Observations of camera 1 are
//! predicted through the rig transform. Any subset of entries can be held
//! fixed; the solver only sees the free ones.

use anyhow::{ensure, Result};
use nalgebra::{DMatrix, DVector};
use stereo_core::{CorrespondenceView, Iso3, PinholeCamera, Pt2, Pt3, Real, Vec2};

use crate::params::{unpack_pose, CameraBlock, CAMERA_BLOCK_LEN, POSE_BLOCK_LEN};
use crate::{NllsProblem, RobustKernel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleLayout {
    pub n_cameras: usize,
    pub n_views: usize,
}

impl BundleLayout {
    pub fn camera_offset(&self, camera: usize) -> usize {
        camera * CAMERA_BLOCK_LEN
    }

    pub fn rig_offset(&self) -> Option<usize> {
        (self.n_cameras == 2).then_some(self.n_cameras * CAMERA_BLOCK_LEN)
    }

    pub fn pose_offset(&self, view: usize) -> usize {
        let rig_len = if self.rig_offset().is_some() {
            POSE_BLOCK_LEN
        } else {
            0
        };
        self.n_cameras * CAMERA_BLOCK_LEN + rig_len + view * POSE_BLOCK_LEN
    }

    pub fn len(&self) -> usize {
        self.pose_offset(self.n_views)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Observations of one board pose by one camera.
#[derive(Debug, Clone)]
pub struct ObservationGroup {
    pub view: usize,
    pub camera: usize,
    pub points_3d: Vec<Pt3>,
    pub points_2d: Vec<Pt2>,
}

impl ObservationGroup {
    pub fn new(view: usize, camera: usize, data: &CorrespondenceView) -> Self {
        Self {
            view,
            camera,
            points_3d: data.points_3d.clone(),
            points_2d: data.points_2d.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanarBundleProblem {
    layout: BundleLayout,
    base: DVector<Real>,
    free: Vec<usize>,
    groups: Vec<ObservationGroup>,
    row_offsets: Vec<usize>,
    num_residuals: usize,
    robust: RobustKernel,
}

impl PlanarBundleProblem {
    /// `fixed` lists global parameter indices that stay at their value in `base`.
    pub fn new(
        layout: BundleLayout,
        base: DVector<Real>,
        fixed: &[usize],
        groups: Vec<ObservationGroup>,
        robust: RobustKernel,
    ) -> Result<Self> {
        ensure!(
            layout.n_cameras == 1 || layout.n_cameras == 2,
            "bundle supports one or two cameras, got {}",
            layout.n_cameras
        );
        ensure!(
            base.len() == layout.len(),
            "parameter vector has {} entries, layout needs {}",
            base.len(),
            layout.len()
        );
        let mut row_offsets = Vec::with_capacity(groups.len());
        let mut rows = 0;
        for g in &groups {
            ensure!(
                g.view < layout.n_views && g.camera < layout.n_cameras,
                "observation group (view {}, camera {}) outside layout",
                g.view,
                g.camera
            );
            ensure!(
                g.points_3d.len() == g.points_2d.len(),
                "view {}: 3D / 2D point counts differ",
                g.view
            );
            row_offsets.push(rows);
            rows += 2 * g.points_2d.len();
        }

        let free: Vec<usize> = (0..layout.len()).filter(|i| !fixed.contains(i)).collect();
        ensure!(
            rows >= free.len(),
            "under-determined problem: {} residuals for {} parameters",
            rows,
            free.len()
        );

        Ok(Self {
            layout,
            base,
            free,
            groups,
            row_offsets,
            num_residuals: rows,
            robust,
        })
    }

    pub fn layout(&self) -> BundleLayout {
        self.layout
    }

    /// Free parameters of the initial vector.
    pub fn initial_free(&self) -> DVector<Real> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.base[i]))
    }

    /// Full parameter vector with free entries taken from `x`.
    pub fn expand(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut full = self.base.clone();
        for (k, &i) in self.free.iter().enumerate() {
            full[i] = x[k];
        }
        full
    }

    pub fn camera(&self, full: &DVector<Real>, camera: usize) -> PinholeCamera {
        let o = self.layout.camera_offset(camera);
        CameraBlock::unpack(&full.as_slice()[o..o + CAMERA_BLOCK_LEN])
    }

    pub fn pose(&self, full: &DVector<Real>, view: usize) -> Iso3 {
        let o = self.layout.pose_offset(view);
        unpack_pose(&full.as_slice()[o..o + POSE_BLOCK_LEN])
    }

    pub fn rig(&self, full: &DVector<Real>) -> Option<Iso3> {
        self.layout
            .rig_offset()
            .map(|o| unpack_pose(&full.as_slice()[o..o + POSE_BLOCK_LEN]))
    }

    /// Global indices a group's residuals depend on.
    fn group_params(&self, g: &ObservationGroup) -> Vec<usize> {
        let co = self.layout.camera_offset(g.camera);
        let po = self.layout.pose_offset(g.view);
        let mut idx: Vec<usize> = (co..co + CAMERA_BLOCK_LEN).collect();
        if g.camera == 1 {
            if let Some(ro) = self.layout.rig_offset() {
                idx.extend(ro..ro + POSE_BLOCK_LEN);
            }
        }
        idx.extend(po..po + POSE_BLOCK_LEN);
        idx
    }

    fn group_residuals(&self, full: &[Real], g: &ObservationGroup, out: &mut [Real]) {
        let co = self.layout.camera_offset(g.camera);
        let camera = CameraBlock::unpack(&full[co..co + CAMERA_BLOCK_LEN]);
        let po = self.layout.pose_offset(g.view);
        let mut cam_from_board = unpack_pose(&full[po..po + POSE_BLOCK_LEN]);
        if g.camera == 1 {
            if let Some(ro) = self.layout.rig_offset() {
                cam_from_board = unpack_pose(&full[ro..ro + POSE_BLOCK_LEN]) * cam_from_board;
            }
        }

        for (k, (p3, p2)) in g.points_3d.iter().zip(&g.points_2d).enumerate() {
            let pc = cam_from_board.transform_point(p3);
            // Points behind the camera only occur far from the solution; keep
            // the residual finite so the solver can back off.
            let z = if pc.z.abs() < 1e-9 { 1e-9 } else { pc.z };
            let px = camera.normalized_to_pixel(&Vec2::new(pc.x / z, pc.y / z));
            out[2 * k] = px.x - p2.x;
            out[2 * k + 1] = px.y - p2.y;
        }
    }

    fn full_residuals(&self, full: &DVector<Real>) -> DVector<Real> {
        let mut r = DVector::zeros(self.num_residuals);
        for (g, &row) in self.groups.iter().zip(&self.row_offsets) {
            let n = 2 * g.points_2d.len();
            self.group_residuals(full.as_slice(), g, &mut r.as_mut_slice()[row..row + n]);
        }
        r
    }

    /// RMS pixel error over the points of groups accepted by `filter`.
    pub fn rms_where(&self, full: &DVector<Real>, filter: impl Fn(&ObservationGroup) -> bool) -> Real {
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        let mut buf = Vec::new();
        for g in self.groups.iter().filter(|g| filter(g)) {
            buf.resize(2 * g.points_2d.len(), 0.0);
            self.group_residuals(full.as_slice(), g, &mut buf);
            sum_sq += buf.iter().map(|v| v * v).sum::<Real>();
            count += g.points_2d.len();
        }
        if count == 0 {
            0.0
        } else {
            (sum_sq / count as Real).sqrt()
        }
    }
}

impl NllsProblem for PlanarBundleProblem {
    fn num_params(&self) -> usize {
        self.free.len()
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        self.full_residuals(&self.expand(x))
    }

    /// Central differences, evaluated per observation group so only the
    /// parameters a group touches are perturbed.
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut column_of = vec![None; self.layout.len()];
        for (k, &i) in self.free.iter().enumerate() {
            column_of[i] = Some(k);
        }

        let mut work = self.expand(x).as_slice().to_vec();
        let mut jac = DMatrix::zeros(self.num_residuals, self.free.len());
        let mut plus = Vec::new();
        let mut minus = Vec::new();

        for (g, &row) in self.groups.iter().zip(&self.row_offsets) {
            let n = 2 * g.points_2d.len();
            plus.resize(n, 0.0);
            minus.resize(n, 0.0);
            for gi in self.group_params(g) {
                let Some(col) = column_of[gi] else {
                    continue;
                };
                let orig = work[gi];
                let h = 1e-6 * orig.abs().max(1.0);
                work[gi] = orig + h;
                self.group_residuals(&work, g, &mut plus);
                work[gi] = orig - h;
                self.group_residuals(&work, g, &mut minus);
                work[gi] = orig;
                for k in 0..n {
                    jac[(row + k, col)] = (plus[k] - minus[k]) / (2.0 * h);
                }
            }
        }
        jac
    }

    fn row_scales(&self, r_unweighted: &DVector<Real>) -> Option<DVector<Real>> {
        if self.robust == RobustKernel::None {
            return None;
        }
        let mut scales = DVector::from_element(r_unweighted.len(), 1.0);
        for k in 0..r_unweighted.len() / 2 {
            let r2 = r_unweighted[2 * k].powi(2) + r_unweighted[2 * k + 1].powi(2);
            let (_, w) = self.robust.rho_and_weight(r2);
            let s = w.sqrt();
            scales[2 * k] = s;
            scales[2 * k + 1] = s;
        }
        Some(scales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{pack_pose, CameraBlock};
    use nalgebra::{Translation3, UnitQuaternion};
    use stereo_core::{synthetic::project_view, BrownConrady5, CalibrationTarget, FxFyCxCySkew};

    fn setup() -> (PlanarBundleProblem, DVector<Real>) {
        let cam = PinholeCamera::new(
            FxFyCxCySkew {
                fx: 800.0,
                fy: 790.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            BrownConrady5 {
                k1: -0.1,
                ..BrownConrady5::default()
            },
        );
        let pose = Iso3::from_parts(
            Translation3::new(-100.0, -60.0, 600.0),
            UnitQuaternion::from_euler_angles(0.2, -0.1, 0.05),
        );
        let target = CalibrationTarget::new(6, 4, 30.0);
        let view = project_view(&cam, &pose, &target.object_points()).unwrap();

        let layout = BundleLayout {
            n_cameras: 1,
            n_views: 1,
        };
        let mut base = Vec::new();
        base.extend(CameraBlock::pack(&cam));
        base.extend(pack_pose(&pose));
        let base = DVector::from_vec(base);
        let groups = vec![ObservationGroup::new(0, 0, &view)];
        let problem =
            PlanarBundleProblem::new(layout, base.clone(), &[CameraBlock::K3], groups, RobustKernel::None)
                .unwrap();
        (problem, base)
    }

    #[test]
    fn residuals_vanish_at_ground_truth() {
        let (problem, _) = setup();
        let r = problem.residuals(&problem.initial_free());
        assert_eq!(r.len(), 48);
        assert!(r.amax() < 1e-9);
        assert_eq!(problem.num_params(), 14);
    }

    #[test]
    fn jacobian_matches_forward_perturbation() {
        let (problem, _) = setup();
        let x = problem.initial_free();
        let j = problem.jacobian(&x);
        let r0 = problem.residuals(&x);
        // Column 0 is fx.
        let mut x1 = x.clone();
        x1[0] += 1e-3;
        let r1 = problem.residuals(&x1);
        let fd = (r1 - r0) / 1e-3;
        assert!((fd - j.column(0)).amax() < 1e-5);
    }

    #[test]
    fn fixed_parameters_survive_expansion() {
        let (problem, base) = setup();
        let mut x = problem.initial_free();
        x.fill(0.0);
        let full = problem.expand(&x);
        assert_eq!(full[CameraBlock::K3], base[CameraBlock::K3]);
    }
}
