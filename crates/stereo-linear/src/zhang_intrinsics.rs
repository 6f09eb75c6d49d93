use nalgebra::{DMatrix, DVector, SVector};
use stereo_core::{FxFyCxCySkew, Mat3, Real};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum IntrinsicsInitError {
    #[error("need at least {needed} homographies, got {got}")]
    NotEnoughViews { needed: usize, got: usize },
    #[error("degenerate view configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Build the 6-vector v_ij(H) of Zhang's method (0-based column indices).
fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form intrinsics from plane homographies (no distortion).
///
/// Requires at least 3 homographies in general position.
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Mat3],
) -> Result<FxFyCxCySkew<Real>, IntrinsicsInitError> {
    if hmtxs.len() < 3 {
        return Err(IntrinsicsInitError::NotEnoughViews {
            needed: 3,
            got: hmtxs.len(),
        });
    }

    // Condition pixel units: N maps the mean image of the board origin to
    // the origin and scales coordinates to O(1). K = N⁻¹ K' stays upper triangular.
    let n = conditioning_transform(hmtxs);
    let n_inv = n.try_inverse().ok_or(IntrinsicsInitError::Degenerate)?;

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);
    for (k, hmtx) in hmtxs.iter().enumerate() {
        let h = n * hmtx;
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // V b = 0: right singular vector of the smallest singular value.
    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(IntrinsicsInitError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(IntrinsicsInitError::SvdFailed)?;
    let b = v_t.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(IntrinsicsInitError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() || denom <= 0.0 {
        return Err(IntrinsicsInitError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k_norm = FxFyCxCySkew {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    };
    let k = FxFyCxCySkew::from_k_matrix(&(n_inv * k_norm.k_matrix()));
    if [k.fx, k.fy, k.cx, k.cy, k.skew].iter().any(|v| !v.is_finite()) {
        return Err(IntrinsicsInitError::Degenerate);
    }
    Ok(k)
}

fn conditioning_transform(hmtxs: &[Mat3]) -> Mat3 {
    let (mut cx, mut cy, mut count) = (0.0, 0.0, 0.0);
    for h in hmtxs {
        if h[(2, 2)].abs() > Real::EPSILON {
            cx += h[(0, 2)] / h[(2, 2)];
            cy += h[(1, 2)] / h[(2, 2)];
            count += 1.0;
        }
    }
    if count == 0.0 {
        return Mat3::identity();
    }
    let (cx, cy) = (cx / count, cy / count);
    let s = cx.abs().max(cy.abs()).max(1.0);
    Mat3::new(1.0 / s, 0.0, -cx / s, 0.0, 1.0 / s, -cy / s, 0.0, 0.0, 1.0)
}

/// Focal lengths with the principal point fixed at `(cx, cy)` and zero skew.
///
/// Each homography contributes the two orthogonality constraints on the
/// image of the absolute conic restricted to `diag(1/fx², 1/fy², 1)`; this
/// works from a single tilted view.
pub fn estimate_focal_with_fixed_principal_point(
    hmtxs: &[Mat3],
    cx: Real,
    cy: Real,
) -> Result<FxFyCxCySkew<Real>, IntrinsicsInitError> {
    if hmtxs.is_empty() {
        return Err(IntrinsicsInitError::NotEnoughViews { needed: 1, got: 0 });
    }

    let shift = Mat3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    let mut a = DMatrix::<Real>::zeros(2 * hmtxs.len(), 2);
    let mut rhs = DVector::<Real>::zeros(2 * hmtxs.len());
    for (k, h) in hmtxs.iter().enumerate() {
        let h = shift * h;
        // Both columns share one scale; the second constraint depends on it.
        let s = h.column(0).norm().max(h.column(1).norm());
        let h1 = h.column(0) / s;
        let h2 = h.column(1) / s;

        a[(2 * k, 0)] = h1[0] * h2[0];
        a[(2 * k, 1)] = h1[1] * h2[1];
        rhs[2 * k] = -h1[2] * h2[2];

        a[(2 * k + 1, 0)] = h1[0] * h1[0] - h2[0] * h2[0];
        a[(2 * k + 1, 1)] = h1[1] * h1[1] - h2[1] * h2[1];
        rhs[2 * k + 1] = -(h1[2] * h1[2] - h2[2] * h2[2]);
    }

    let svd = a.svd(true, true);
    let sol = svd
        .solve(&rhs, 1e-12)
        .map_err(|_| IntrinsicsInitError::SvdFailed)?;
    let (ia, ib) = (sol[0], sol[1]);
    if !(ia > 0.0 && ib > 0.0) {
        return Err(IntrinsicsInitError::Degenerate);
    }

    Ok(FxFyCxCySkew {
        fx: 1.0 / ia.sqrt(),
        fy: 1.0 / ib.sqrt(),
        cx,
        cy,
        skew: 0.0,
    })
}
