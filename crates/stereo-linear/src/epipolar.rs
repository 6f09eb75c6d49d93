//! Essential and fundamental matrices of a calibrated rig.

use stereo_core::{skew_symmetric, Mat3, Pt2, Real, Vec3};

/// `E = [T]× R` for `X_r = R X_l + T`.
pub fn essential_from_extrinsics(rotation: &Mat3, translation: &Vec3) -> Mat3 {
    skew_symmetric(translation) * rotation
}

/// `F = K2⁻ᵀ E K1⁻¹`, scaled so that `F[2,2] = 1` when that entry is non-zero.
///
/// Returns `None` if either K is singular.
pub fn fundamental_from_essential(essential: &Mat3, k_left: &Mat3, k_right: &Mat3) -> Option<Mat3> {
    let k1_inv = k_left.try_inverse()?;
    let k2_inv = k_right.try_inverse()?;
    let mut f = k2_inv.transpose() * essential * k1_inv;
    let s = f[(2, 2)];
    if s.abs() > 1e-12 * f.abs().max() {
        f /= s;
    }
    Some(f)
}

/// Distance in pixels of `right` from the epipolar line `F · left`.
pub fn epipolar_line_distance(fundamental: &Mat3, left: &Pt2, right: &Pt2) -> Real {
    let line = fundamental * Vec3::new(left.x, left.y, 1.0);
    let norm = (line.x * line.x + line.y * line.y).sqrt();
    if norm <= Real::EPSILON {
        return Real::INFINITY;
    }
    (line.x * right.x + line.y * right.y + line.z).abs() / norm
}
