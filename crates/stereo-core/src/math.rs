//! Scalar and matrix aliases plus a few geometry helpers.

use nalgebra::{Isometry3, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
/// Projection matrix `P = K [R | t]`.
pub type Mat34 = Matrix3x4<Real>;
/// Disparity-to-depth matrix `Q`.
pub type Mat4 = Matrix4<Real>;
/// Rigid transform, named `a_from_b` by the frames it maps between.
pub type Iso3 = Isometry3<Real>;

pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Dehomogenise; `v.z` must be non-zero.
pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Cross-product matrix `[v]×` such that `[v]× u = v × u`.
pub fn skew_symmetric(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Project an arbitrary 3×3 matrix onto SO(3) in the Frobenius sense.
///
/// Returns `None` when the SVD does not produce both factors.
pub fn project_to_rotation(m: &Mat3) -> Option<Mat3> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Some(r)
}

/// Largest absolute deviation of `RᵀR` from identity, plus `|det R - 1|`.
pub fn rotation_defect(r: &Mat3) -> Real {
    let ortho = (r.transpose() * r - Mat3::identity()).abs().max();
    ortho.max((r.determinant() - 1.0).abs())
}
