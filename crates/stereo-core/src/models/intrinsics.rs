use nalgebra::{Matrix3, RealField, Vector2};
use serde::{Deserialize, Serialize};

/// Affine map between the (distorted) normalized image plane and pixels.
pub trait IntrinsicsModel<S: RealField + Copy> {
    fn plane_to_pixel(&self, plane: &Vector2<S>) -> Vector2<S>;
    fn pixel_to_plane(&self, pixel: &Vector2<S>) -> Vector2<S>;
}

/// Pinhole intrinsics `K = [fx s cx; 0 fy cy; 0 0 1]`.
///
/// Calibration keeps `skew` at zero; it is carried so that any K read
/// from disk survives a round trip.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew<S: RealField + Copy> {
    pub fx: S,
    pub fy: S,
    pub cx: S,
    pub cy: S,
    pub skew: S,
}

impl<S: RealField + Copy> FxFyCxCySkew<S> {
    pub fn k_matrix(&self) -> Matrix3<S> {
        let (zero, one) = (S::zero(), S::one());
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            zero, self.fy, self.cy, //
            zero, zero, one,
        )
    }

    /// Entries of an upper-triangular K; the bottom row is not checked.
    pub fn from_k_matrix(k: &Matrix3<S>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        }
    }
}

impl<S: RealField + Copy> IntrinsicsModel<S> for FxFyCxCySkew<S> {
    fn plane_to_pixel(&self, plane: &Vector2<S>) -> Vector2<S> {
        Vector2::new(
            self.fx * plane.x + self.skew * plane.y + self.cx,
            self.fy * plane.y + self.cy,
        )
    }

    fn pixel_to_plane(&self, pixel: &Vector2<S>) -> Vector2<S> {
        let y = (pixel.y - self.cy) / self.fy;
        Vector2::new((pixel.x - self.cx - self.skew * y) / self.fx, y)
    }
}
