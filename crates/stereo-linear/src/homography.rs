use nalgebra::DMatrix;
use stereo_core::{Mat3, Pt2};
use thiserror::Error;

use crate::math::normalize_points_2d;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point counts differ: {0} board vs {1} image")]
    CountMismatch(usize, usize),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate H such that `x' ~ H x` using the normalized DLT.
///
/// The result is scaled so that `H[2,2] = 1` when that entry is non-zero.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::CountMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (wn, tw) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (im, ti) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pw, pi)) in wn.iter().zip(im.iter()).enumerate() {
        let (x, y, u, v) = (pw.x, pw.y, pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // A h = 0: right singular vector of the smallest singular value. With
    // exactly 4 points A is 8x9 and the thin SVD lacks that vector, so pad.
    if a.nrows() < 9 {
        a = a.resize_vertically(9, 0.0);
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(HomographyError::SvdFailed)?;
    let h = v_t.row(min_idx);

    let hn = Mat3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);
    let ti_inv = ti.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = ti_inv * hn * tw;

    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }
    Ok(h_mat)
}

/// Apply a homography to a point.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Pt2 {
    stereo_core::from_homogeneous(&(h * stereo_core::to_homogeneous(p)))
}
