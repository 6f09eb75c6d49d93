use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use stereo_core::Real;

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let initial_cost = problem.cost(&x0);
        let wrapper = LmWrapper {
            problem,
            params: x0,
        };

        let (wrapper, report) = lm.minimize(wrapper);
        let summary = SolveReport {
            evaluations: report.number_of_evaluations,
            initial_cost,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
            termination: format!("{:?}", report.termination),
        };
        log::debug!(
            "lm: cost {:.3e} -> {:.3e}, {} after {} evaluations",
            summary.initial_cost,
            summary.final_cost,
            summary.termination,
            summary.evaluations
        );
        (wrapper.params(), summary)
    }
}

#[cfg(test)]
mod tests {
    use super::LmBackend;
    use crate::{NllsProblem, NllsSolverBackend, SolveOptions};
    use nalgebra::{DMatrix, DVector};
    use stereo_core::Real;

    /// Fit `y = a * exp(b * t)` to exact samples.
    struct ExpFit {
        t: Vec<Real>,
        y: Vec<Real>,
    }

    impl NllsProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            self.t.len()
        }

        fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_iterator(
                self.t.len(),
                self.t.iter().zip(&self.y).map(|(t, y)| x[0] * (x[1] * t).exp() - y),
            )
        }

        fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
            let mut j = DMatrix::zeros(self.t.len(), 2);
            for (i, t) in self.t.iter().enumerate() {
                let e = (x[1] * t).exp();
                j[(i, 0)] = e;
                j[(i, 1)] = x[0] * t * e;
            }
            j
        }
    }

    #[test]
    fn lm_backend_fits_exponential() {
        let t: Vec<Real> = (0..20).map(|i| i as Real * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        let problem = ExpFit { t, y };

        let (x, report) = LmBackend.solve(
            &problem,
            DVector::from_vec(vec![1.0, 0.0]),
            &SolveOptions::default(),
        );

        assert!((x[0] - 2.5).abs() < 1e-6, "a = {}", x[0]);
        assert!((x[1] + 1.3).abs() < 1e-6, "b = {}", x[1]);
        assert!(report.converged, "{report:?}");
        assert!(report.final_cost < report.initial_cost);
        assert!(report.final_cost < 1e-12);
    }
}
