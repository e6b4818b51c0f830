//! Levenberg-Marquardt least-squares refinement of a [`SolventModel`].
//!
//! Minimizes `sum_i (model(x_i) - y_i)^2`, or the same sum over logarithms,
//! with analytic Jacobians and Marquardt's diagonal scaling. The iteration
//! count is bounded; anything other than a converged fit is reported as
//! [`SolventError::FitConvergence`].

use crate::error::{Result, SolventError};
use crate::model::{ModelKind, SolventModel};
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;

/// Space the residuals are measured in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitSpace {
    /// `model(x) - y`.
    #[default]
    Linear,
    /// `ln model(x) - ln y`, over the samples with `y > 0`.
    Log,
}

/// Stopping criteria for the optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterParams {
    pub space: FitSpace,
    /// Maximum number of Jacobian evaluations.
    pub max_iterations: usize,
    /// Relative reduction of the squared residual below which the fit has converged.
    pub ftol: f64,
    /// Relative step length below which the fit has converged.
    pub xtol: f64,
    /// Cosine between residual and Jacobian columns below which the fit has converged.
    pub gtol: f64,
}

impl Default for FitterParams {
    fn default() -> Self {
        Self {
            space: FitSpace::Linear,
            max_iterations: 200,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 1.49012e-8,
        }
    }
}

/// Refined model and fit statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    pub model: SolventModel,
    /// Final sum of squared residuals, in the fit space.
    pub cost: f64,
    pub iterations: usize,
    /// Parameter covariance estimate, when the normal matrix is invertible.
    pub covariance: Option<DMatrix<f64>>,
}

struct Problem {
    kind: ModelKind,
    space: FitSpace,
    xs: Vec<f64>,
    /// Targets in the fit space.
    ys: Vec<f64>,
}

impl Problem {
    fn new(kind: ModelKind, space: FitSpace, xs: &[f64], ys: &[f64]) -> Self {
        let (xs, ys) = match space {
            FitSpace::Linear => (xs.to_vec(), ys.to_vec()),
            FitSpace::Log => xs
                .iter()
                .zip(ys)
                .filter(|&(_, &y)| y > 0.0)
                .map(|(&x, &y)| (x, y.ln()))
                .unzip(),
        };
        Self { kind, space, xs, ys }
    }

    fn model(&self, p: &DVector<f64>) -> Option<SolventModel> {
        SolventModel::from_params(self.kind, p.as_slice())
    }

    fn residuals(&self, p: &DVector<f64>) -> Option<DVector<f64>> {
        let model = self.model(p)?;
        let r = match self.space {
            FitSpace::Linear => DVector::from_iterator(
                self.xs.len(),
                self.xs.iter().zip(&self.ys).map(|(&x, &y)| model.eval(x) - y),
            ),
            FitSpace::Log => {
                let logs = model
                    .log_eval_many(&self.xs)
                    .into_iter()
                    .zip(&self.ys)
                    .map(|(l, &y)| l.map(|l| l - y))
                    .collect::<Option<Vec<f64>>>()?;
                DVector::from_vec(logs)
            }
        };
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self, p: &DVector<f64>) -> Option<DMatrix<f64>> {
        let model = self.model(p)?;
        let k = self.kind.n_params();
        let mut j = DMatrix::<f64>::zeros(self.xs.len(), k);
        let mut row = vec![0.0; k];
        for (i, &x) in self.xs.iter().enumerate() {
            model.gradient_into(x, &mut row);
            // d ln f = df / f
            let scale = match self.space {
                FitSpace::Linear => 1.0,
                FitSpace::Log => model.eval(x).recip(),
            };
            for (c, &v) in row.iter().enumerate() {
                j[(i, c)] = v * scale;
            }
        }
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

/// Fit `guess` to the samples `(xs, ys)`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(xs, ys, params), fields(n = xs.len()))
)]
pub fn fit_model(
    xs: &[f64],
    ys: &[f64],
    guess: SolventModel,
    params: &FitterParams,
) -> Result<FitOutcome> {
    if xs.is_empty() || xs.len() != ys.len() {
        return Err(SolventError::degenerate(format!(
            "fit needs matching non-empty domain and data ({} vs {})",
            xs.len(),
            ys.len()
        )));
    }

    let problem = Problem::new(guess.kind(), params.space, xs, ys);
    if problem.xs.is_empty() {
        return Err(SolventError::degenerate(
            "log-space fit needs at least one positive count",
        ));
    }
    let n = problem.xs.len();
    let k = problem.kind.n_params();
    let fail = |reason: &str, iterations: usize, p: &DVector<f64>| SolventError::FitConvergence {
        reason: reason.to_string(),
        iterations,
        params: p.iter().copied().collect(),
    };

    let mut p = DVector::from_vec(guess.params());
    let mut r = problem
        .residuals(&p)
        .ok_or_else(|| fail("non-finite residuals at the initial guess", 0, &p))?;
    let mut cost = r.norm_squared();
    let mut lambda = LAMBDA_INIT;

    for iter in 1..=params.max_iterations {
        let j = problem
            .jacobian(&p)
            .ok_or_else(|| fail("non-finite Jacobian", iter, &p))?;
        let jtj = j.transpose() * &j;
        let g = j.transpose() * &r;

        let diag: Vec<f64> = (0..k).map(|i| jtj[(i, i)]).collect();
        if diag.iter().any(|&d| d <= 0.0) {
            return Err(fail("singular Jacobian", iter, &p));
        }

        if cost == 0.0 || scaled_gradient(&g, &diag, cost) <= params.gtol {
            debug!("fit converged on gradient after {iter} iterations, cost {cost:.4e}");
            return finish(&problem, p, cost, iter, n);
        }

        loop {
            let mut a = jtj.clone();
            for (i, &d) in diag.iter().enumerate() {
                a[(i, i)] += lambda * d;
            }
            let step = a.cholesky().map(|c| c.solve(&(-g.clone())));
            let Some(delta) = step else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return Err(fail("singular normal equations", iter, &p));
                }
                continue;
            };

            let p_new = &p + &delta;
            let trial = problem
                .residuals(&p_new)
                .map(|r_new| (r_new.norm_squared(), r_new));
            match trial {
                Some((cost_new, r_new)) if cost_new < cost => {
                    let small_reduction = cost - cost_new <= params.ftol * cost;
                    let small_step = delta.norm() <= params.xtol * (p.norm() + params.xtol);
                    p = p_new;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    if small_reduction || small_step {
                        debug!("fit converged after {iter} iterations, cost {cost:.4e}");
                        return finish(&problem, p, cost, iter, n);
                    }
                    break;
                }
                _ => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        return Err(fail("no further reduction in the sum of squares", iter, &p));
                    }
                }
            }
        }
    }

    Err(fail(
        "maximum number of iterations exceeded",
        params.max_iterations,
        &p,
    ))
}

fn scaled_gradient(g: &DVector<f64>, diag: &[f64], cost: f64) -> f64 {
    let r_norm = cost.sqrt();
    g.iter()
        .zip(diag)
        .map(|(gi, &d)| gi.abs() / (d.sqrt() * r_norm))
        .fold(0.0, f64::max)
}

fn finish(
    problem: &Problem,
    p: DVector<f64>,
    cost: f64,
    iterations: usize,
    n: usize,
) -> Result<FitOutcome> {
    let k = problem.kind.n_params();
    let model = problem
        .model(&p)
        .ok_or_else(|| SolventError::FitConvergence {
            reason: "parameter count does not match the model".to_string(),
            iterations,
            params: p.iter().copied().collect(),
        })?
        .with_abs_widths();
    let covariance = problem.jacobian(&p).and_then(|j| {
        if n <= k {
            return None;
        }
        let jtj = j.transpose() * &j;
        jtj.try_inverse().map(|inv| inv * (cost / (n - k) as f64))
    });
    Ok(FitOutcome {
        model,
        cost,
        iterations,
        covariance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::linspace;
    use crate::model::GaussianComponent;
    use approx::assert_relative_eq;

    fn sample(model: &SolventModel, xs: &[f64]) -> Vec<f64> {
        model.eval_many(xs)
    }

    #[test]
    fn recovers_noise_free_gaussian() {
        let truth = SolventModel::one(250.0, 0.4, 1.3);
        let xs = linspace(-6.0, 6.0, 300);
        let ys = sample(&truth, &xs);

        let guess = SolventModel::one(180.0, 0.0, 2.0);
        let out = fit_model(&xs, &ys, guess, &FitterParams::default()).expect("fit");
        let s = out.model.solvent();
        assert_relative_eq!(s.scale, 250.0, max_relative = 1e-6);
        assert_relative_eq!(s.center, 0.4, epsilon = 1e-6);
        assert_relative_eq!(s.width, 1.3, max_relative = 1e-6);
        assert!(out.cost < 1e-6);
    }

    #[test]
    fn negative_width_is_reported_as_absolute() {
        let truth = SolventModel::one(10.0, 1.0, 0.7);
        let xs = linspace(-3.0, 5.0, 200);
        let ys = sample(&truth, &xs);
        let out = fit_model(&xs, &ys, SolventModel::one(8.0, 1.2, -0.9), &FitterParams::default())
            .expect("fit");
        assert_relative_eq!(out.model.solvent().width, 0.7, max_relative = 1e-6);
    }

    #[test]
    fn recovers_two_components() {
        let truth = SolventModel::two(
            GaussianComponent::new(300.0, 0.0, 1.0),
            GaussianComponent::new(40.0, 5.0, 0.8),
        );
        let xs = linspace(-5.0, 9.0, 400);
        let ys = sample(&truth, &xs);
        let guess = SolventModel::two(
            GaussianComponent::new(280.0, 0.2, 1.2),
            GaussianComponent::new(30.0, 4.6, 1.0),
        );
        let out = fit_model(&xs, &ys, guess, &FitterParams::default()).expect("fit");
        for (got, want) in out.model.params().iter().zip(truth.params()) {
            assert_relative_eq!(*got, want, epsilon = 1e-5, max_relative = 1e-5);
        }
        let cov = out.covariance.expect("covariance");
        assert_eq!(cov.shape(), (6, 6));
    }

    #[test]
    fn zero_scale_guess_has_singular_jacobian() {
        let xs = linspace(-1.0, 1.0, 50);
        let ys = vec![1.0; 50];
        let err = fit_model(&xs, &ys, SolventModel::one(0.0, 0.0, 1.0), &FitterParams::default())
            .unwrap_err();
        assert!(matches!(err, SolventError::FitConvergence { .. }), "{err:?}");
    }

    #[test]
    fn iteration_limit_surfaces_as_fit_failure() {
        let truth = SolventModel::one(100.0, 0.0, 1.0);
        let xs = linspace(-5.0, 5.0, 200);
        let ys = sample(&truth, &xs);
        let params = FitterParams {
            max_iterations: 1,
            ..FitterParams::default()
        };
        let err = fit_model(&xs, &ys, SolventModel::one(40.0, 1.5, 2.5), &params).unwrap_err();
        match err {
            SolventError::FitConvergence {
                iterations, params, ..
            } => {
                assert_eq!(iterations, 1);
                assert_eq!(params.len(), 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn log_space_recovers_gaussian() {
        let truth = SolventModel::one(250.0, 0.4, 1.3);
        let xs = linspace(-6.0, 6.0, 300);
        let ys = sample(&truth, &xs);
        let params = FitterParams {
            space: FitSpace::Log,
            ..FitterParams::default()
        };
        let out = fit_model(&xs, &ys, SolventModel::one(180.0, 0.0, 2.0), &params).expect("fit");
        let s = out.model.solvent();
        assert_relative_eq!(s.scale, 250.0, max_relative = 1e-6);
        assert_relative_eq!(s.center, 0.4, epsilon = 1e-6);
        assert_relative_eq!(s.width, 1.3, max_relative = 1e-6);
    }

    #[test]
    fn log_space_recovers_multi_lobe_content() {
        let truth = SolventModel::multi_lobe(
            GaussianComponent::new(300.0, 0.0, 1.0),
            GaussianComponent::new(5.0, 4.0, 0.5),
            1.0,
        );
        let xs = linspace(-5.0, 8.0, 400);
        let ys = sample(&truth, &xs);
        let guess = SolventModel::multi_lobe(
            GaussianComponent::new(290.0, 0.05, 1.05),
            GaussianComponent::new(5.3, 4.1, 0.55),
            0.9,
        );
        let params = FitterParams {
            space: FitSpace::Log,
            ..FitterParams::default()
        };
        let out = fit_model(&xs, &ys, guess, &params).expect("fit");
        assert_eq!(out.model.kind(), ModelKind::MultiLobe);
        for (got, want) in out.model.params().iter().zip(truth.params()) {
            assert_relative_eq!(*got, want, epsilon = 1e-4, max_relative = 1e-4);
        }
    }

    #[test]
    fn log_space_needs_positive_counts() {
        let xs = linspace(0.0, 1.0, 10);
        let params = FitterParams {
            space: FitSpace::Log,
            ..FitterParams::default()
        };
        let err = fit_model(&xs, &[0.0; 10], SolventModel::one(1.0, 0.5, 1.0), &params)
            .unwrap_err();
        assert!(matches!(err, SolventError::DegenerateInput { .. }));
    }

    #[test]
    fn zero_tolerances_never_report_convergence() {
        // noisy data: the sum of squares never reaches zero
        let truth = SolventModel::one(100.0, 0.0, 1.0);
        let xs = linspace(-4.0, 4.0, 120);
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| truth.eval(x) + 0.5 * (7.0 * x).sin())
            .collect();
        let params = FitterParams {
            ftol: 0.0,
            xtol: 0.0,
            gtol: 0.0,
            ..FitterParams::default()
        };
        let err = fit_model(&xs, &ys, SolventModel::one(90.0, 0.1, 1.2), &params).unwrap_err();
        assert!(matches!(err, SolventError::FitConvergence { .. }), "{err:?}");
    }

    #[test]
    fn non_finite_guess_is_rejected() {
        let xs = linspace(0.0, 1.0, 10);
        let ys = vec![0.0; 10];
        let err = fit_model(
            &xs,
            &ys,
            SolventModel::one(f64::NAN, 0.0, 1.0),
            &FitterParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolventError::FitConvergence { iterations: 0, .. }));
    }

    #[test]
    fn mismatched_lengths_are_degenerate() {
        let err = fit_model(
            &[0.0, 1.0],
            &[1.0],
            SolventModel::one(1.0, 0.0, 1.0),
            &FitterParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolventError::DegenerateInput { .. }));
    }
}
