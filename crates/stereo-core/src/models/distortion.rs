use nalgebra::{RealField, Vector2};
use serde::{Deserialize, Serialize};

pub trait DistortionModel<S: RealField + Copy> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S>;
    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S>;
}

/// Brown-Conrady radial (k1, k2, k3) and tangential (p1, p2) distortion.
///
/// The exchange order used by parameter files is `[k1, k2, p1, p2, k3]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5<S: RealField> {
    pub k1: S,
    pub k2: S,
    pub k3: S,
    pub p1: S,
    pub p2: S,
    /// Fixed-point iterations used by [`DistortionModel::undistort`]; 0 selects the default.
    pub iters: u32,
}

impl<S: RealField + Copy> BrownConrady5<S> {
    /// Build from a coefficient slice in `[k1, k2, p1, p2, k3]` order.
    ///
    /// Missing trailing coefficients are zero.
    pub fn from_coeffs(coeffs: &[S]) -> Self {
        let get = |i: usize| coeffs.get(i).copied().unwrap_or_else(S::zero);
        Self {
            k1: get(0),
            k2: get(1),
            p1: get(2),
            p2: get(3),
            k3: get(4),
            iters: 0,
        }
    }

    /// Coefficients in `[k1, k2, p1, p2, k3]` order.
    pub fn coeffs(&self) -> [S; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    fn radial(&self, r2: S) -> S {
        S::one() + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    fn tangential(&self, x: S, y: S, r2: S) -> (S, S) {
        let two = S::one() + S::one();
        let xy = x * y;
        (
            two * self.p1 * xy + self.p2 * (r2 + two * x * x),
            self.p1 * (r2 + two * y * y) + two * self.p2 * xy,
        )
    }

    fn distort_impl(&self, x: S, y: S) -> (S, S) {
        let r2 = x * x + y * y;
        let radial = self.radial(r2);
        let (dx, dy) = self.tangential(x, y, r2);
        (x * radial + dx, y * radial + dy)
    }
}

impl<S: RealField + Copy> DistortionModel<S> for BrownConrady5<S> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S> {
        let (xd, yd) = self.distort_impl(n_undist.x, n_undist.y);
        Vector2::new(xd, yd)
    }

    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S> {
        let mut x = n_dist.x;
        let mut y = n_dist.y;

        let iters = if self.iters == 0 { 20 } else { self.iters };
        for _ in 0..iters {
            let r2 = x * x + y * y;
            let radial = self.radial(r2);
            if radial <= S::zero() {
                break;
            }
            let (dx, dy) = self.tangential(x, y, r2);
            x = (n_dist.x - dx) / radial;
            y = (n_dist.y - dy) / radial;
        }
        Vector2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undistort_inverts_distort() {
        let d = BrownConrady5 {
            k1: -0.28,
            k2: 0.09,
            k3: 0.0,
            p1: 0.001,
            p2: -0.0008,
            iters: 0,
        };
        for &(x, y) in &[(0.0, 0.0), (0.3, -0.2), (-0.45, 0.31), (0.1, 0.5)] {
            let n = Vector2::new(x, y);
            let back = d.undistort(&d.distort(&n));
            assert!((back - n).norm() < 1e-9, "{n:?} -> {back:?}");
        }
    }

    #[test]
    fn coefficient_order_is_k1_k2_p1_p2_k3() {
        let d = BrownConrady5::from_coeffs(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!((d.k1, d.k2, d.p1, d.p2, d.k3), (1.0, 2.0, 3.0, 4.0, 5.0));
        assert_eq!(d.coeffs(), [1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
