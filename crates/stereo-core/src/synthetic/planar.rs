//! Synthetic planar target views for single cameras and stereo rigs.

use anyhow::Result;
use nalgebra::{Translation3, UnitQuaternion};

use crate::{
    CalibrationTarget, CorrespondenceView, Iso3, KeyedPixelNoise, PinholeCamera, Pt3, Real, Vec3,
};

/// `n_views` board poses (`cam_from_target`) circling the optical axis.
///
/// Each pose tilts the board by up to `tilt_rad` about a rotating in-plane
/// axis and places the board centre `distance` in front of the camera.
pub fn tilted_board_poses(
    target: &CalibrationTarget,
    n_views: usize,
    distance: Real,
    tilt_rad: Real,
) -> Vec<Iso3> {
    let center = Vec3::new(
        0.5 * (target.cols - 1) as Real * target.square_size,
        0.5 * (target.rows - 1) as Real * target.square_size,
        0.0,
    );
    (0..n_views)
        .map(|k| {
            let phi = std::f64::consts::TAU * k as Real / n_views.max(1) as Real + 0.3;
            let axis = Vec3::new(phi.cos(), phi.sin(), 0.0);
            let tilt = UnitQuaternion::from_scaled_axis(axis * tilt_rad);
            let roll = UnitQuaternion::from_scaled_axis(Vec3::z() * (0.08 * (2.0 * phi).sin()));
            let rotation = roll * tilt;
            let offset = Vec3::new(
                0.06 * distance * phi.cos(),
                0.04 * distance * phi.sin(),
                distance * (1.0 + 0.1 * (3.0 * phi).sin()),
            );
            let t = offset - rotation * center;
            Iso3::from_parts(Translation3::from(t), rotation)
        })
        .collect()
}

/// Project every target point; fails if any point is behind the camera.
pub fn project_view(
    camera: &PinholeCamera,
    cam_from_target: &Iso3,
    target_points: &[Pt3],
) -> Result<CorrespondenceView> {
    let mut pixels = Vec::with_capacity(target_points.len());
    for (idx, pw) in target_points.iter().enumerate() {
        let Some(uv) = camera.project_point(cam_from_target, pw) else {
            anyhow::bail!("point {idx} not projectable");
        };
        pixels.push(uv);
    }
    CorrespondenceView::new(target_points.to_vec(), pixels)
}

/// Left and right views of the same board poses through a rigid rig.
///
/// `poses` are `left_from_target`; noise is keyed by the view index so
/// reordering the output reorders identical observations.
pub fn project_stereo_views(
    left: &PinholeCamera,
    right: &PinholeCamera,
    right_from_left: &Iso3,
    poses: &[Iso3],
    target: &CalibrationTarget,
    noise: KeyedPixelNoise,
) -> Result<(Vec<CorrespondenceView>, Vec<CorrespondenceView>)> {
    let object = target.object_points();
    let mut lviews = Vec::with_capacity(poses.len());
    let mut rviews = Vec::with_capacity(poses.len());
    for (k, pose) in poses.iter().enumerate() {
        let mut l = project_view(left, pose, &object)?;
        let mut r = project_view(right, &(right_from_left * pose), &object)?;
        l.points_2d = noise.apply(2 * k, &l.points_2d);
        r.points_2d = noise.apply(2 * k + 1, &r.points_2d);
        lviews.push(l);
        rviews.push(r);
    }
    Ok((lviews, rviews))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrownConrady5, FxFyCxCySkew};

    #[test]
    fn tilted_poses_keep_board_in_view() {
        let target = CalibrationTarget::default();
        let cam = PinholeCamera::new(
            FxFyCxCySkew {
                fx: 800.0,
                fy: 800.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            BrownConrady5::default(),
        );
        let poses = tilted_board_poses(&target, 8, 600.0, 0.4);
        for pose in &poses {
            let view = project_view(&cam, pose, &target.object_points()).unwrap();
            for p in &view.points_2d {
                assert!(p.x > 0.0 && p.x < 640.0 && p.y > 0.0 && p.y < 480.0, "{p:?}");
            }
        }
    }
}
