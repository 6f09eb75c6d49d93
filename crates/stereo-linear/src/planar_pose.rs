use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use stereo_core::{project_to_rotation, Iso3, Mat3, Vec3};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum PlanarPoseError {
    #[error("intrinsics matrix is not invertible")]
    SingularIntrinsics,
    #[error("homography has a zero column")]
    DegenerateHomography,
    #[error("svd failed")]
    SvdFailed,
}

/// Pose `cam_from_board` of a planar board (Z = 0) from its homography.
///
/// `H ~ K [r1 r2 t]`; the scale is the average of the two column norms of
/// `K⁻¹H`, its sign puts the board in front of the camera, and the rotation
/// is the nearest element of SO(3).
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PlanarPoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PlanarPoseError::SingularIntrinsics)?;

    let k_inv_h1: Vec3 = k_inv * hmtx.column(0);
    let k_inv_h2: Vec3 = k_inv * hmtx.column(1);
    let k_inv_h3: Vec3 = k_inv * hmtx.column(2);

    let mean_norm = 0.5 * (k_inv_h1.norm() + k_inv_h2.norm());
    if mean_norm <= f64::EPSILON {
        return Err(PlanarPoseError::DegenerateHomography);
    }
    let mut lambda = 1.0 / mean_norm;
    if k_inv_h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let r_mat = Mat3::from_columns(&[r1, r2, r3]);
    let r_orth = project_to_rotation(&r_mat).ok_or(PlanarPoseError::SvdFailed)?;

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(lambda * k_inv_h3), rot))
}
