use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use stereo_core::Real;

/// Dense least-squares objective over a free parameter vector.
///
/// Robust kernels enter through [`NllsProblem::row_scales`]: the solver sees
/// residual and Jacobian rows multiplied by `sqrt(w)`, with `w` taken from
/// the unscaled residuals and held constant while differentiating.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// Row scales for the given residuals; `None` leaves every row as is.
    fn row_scales(&self, _residuals: &DVector<Real>) -> Option<DVector<Real>> {
        None
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let r = self.residuals_unweighted(x);
        match self.row_scales(&r) {
            Some(s) => r.component_mul(&s),
            None => r,
        }
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut j = self.jacobian_unweighted(x);
        if let Some(s) = self.row_scales(&self.residuals_unweighted(x)) {
            for (mut row, &scale) in j.row_iter_mut().zip(s.iter()) {
                row *= scale;
            }
        }
        j
    }

    /// Half the squared norm of the scaled residuals.
    fn cost(&self, x: &DVector<Real>) -> Real {
        0.5 * self.residuals(x).norm_squared()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Iteration budget; the LM backend allows `max_iters * (n + 1)`
    /// residual evaluations for `n` free parameters.
    pub max_iters: usize,
    pub ftol: Real,
    pub gtol: Real,
    pub xtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub evaluations: usize,
    pub initial_cost: Real,
    pub final_cost: Real,
    pub converged: bool,
    /// Solver stop reason, for logs.
    pub termination: String,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
