use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::{BrownConrady5, DistortionModel, FxFyCxCySkew, IntrinsicsModel};
use crate::{Iso3, Mat3, Pt2, Real, Vec2, Vec3};

/// Pinhole camera with Brown-Conrady lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub k: FxFyCxCySkew<Real>,
    pub dist: BrownConrady5<Real>,
}

impl PinholeCamera {
    pub fn new(k: FxFyCxCySkew<Real>, dist: BrownConrady5<Real>) -> Self {
        Self { k, dist }
    }

    /// Camera from a K matrix and a `[k1, k2, p1, p2, k3]` coefficient slice.
    pub fn from_parts(k: &Mat3, coeffs: &[Real]) -> Self {
        Self {
            k: FxFyCxCySkew::from_k_matrix(k),
            dist: BrownConrady5::from_coeffs(coeffs),
        }
    }

    pub fn k_matrix(&self) -> Mat3 {
        self.k.k_matrix()
    }

    /// Map undistorted normalized coordinates to pixels.
    pub fn normalized_to_pixel(&self, n: &Vec2) -> Pt2 {
        let px = self.k.plane_to_pixel(&self.dist.distort(n));
        Pt2::new(px.x, px.y)
    }

    /// Map a pixel to undistorted normalized coordinates.
    pub fn pixel_to_normalized(&self, px: &Pt2) -> Vec2 {
        let n_d = self.k.pixel_to_plane(&Vector2::new(px.x, px.y));
        self.dist.undistort(&n_d)
    }

    /// Pixel position the point would have without lens distortion.
    pub fn undistort_pixel(&self, px: &Pt2) -> Pt2 {
        let n = self.pixel_to_normalized(px);
        let p = self.k.plane_to_pixel(&n);
        Pt2::new(p.x, p.y)
    }

    /// Project a point given in the camera frame; `None` behind the camera.
    pub fn project_point_c(&self, p_c: &Vector3<Real>) -> Option<Pt2> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        Some(self.normalized_to_pixel(&n))
    }

    /// Project a target point through `cam_from_target`.
    pub fn project_point(&self, cam_from_target: &Iso3, p: &Point3<Real>) -> Option<Pt2> {
        self.project_point_c(&cam_from_target.transform_point(p).coords)
    }

    /// Unit viewing ray through an (distorted) pixel.
    pub fn backproject_pixel(&self, px: &Pt2) -> Vec3 {
        let n = self.pixel_to_normalized(px);
        Vec3::new(n.x, n.y, 1.0).normalize()
    }
}
