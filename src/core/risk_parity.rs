use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::core::covariance::{sample_covariance, validate_covariance};
use crate::core::optimizer::{Objective, SimplexMinimizer, SolverOptions};
use crate::core::ReturnMatrix;
use crate::{Allocation, Result, ToolkitError};

pub fn portfolio_variance(weights: &DVector<f64>, cov: &DMatrix<f64>) -> f64 {
    weights.dot(&(cov * weights))
}

/// Fraction of portfolio variance attributable to each asset:
/// `w_i * (cov * w)_i / (w' cov w)`. Sums to one.
pub fn risk_contributions(weights: &DVector<f64>, cov: &DMatrix<f64>) -> DVector<f64> {
    let marginal = cov * weights;
    let variance = weights.dot(&marginal);
    weights.component_mul(&marginal) / variance
}

/// Squared distance of the risk contributions from an equal `1/N` split.
pub struct RiskParityObjective<'a> {
    cov: &'a DMatrix<f64>,
    target: f64,
}

impl<'a> RiskParityObjective<'a> {
    pub fn new(cov: &'a DMatrix<f64>) -> Self {
        Self {
            cov,
            target: 1.0 / cov.nrows() as f64,
        }
    }
}

impl Objective for RiskParityObjective<'_> {
    fn value(&self, w: &DVector<f64>) -> f64 {
        risk_contributions(w, self.cov)
            .iter()
            .map(|rc| (rc - self.target).powi(2))
            .sum()
    }

    fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
        let marginal = self.cov * w;
        let variance = w.dot(&marginal);
        let rc = w.component_mul(&marginal) / variance;
        let deviation = rc.map(|v| v - self.target);

        let direct = deviation.component_mul(&marginal);
        let cross = self.cov * deviation.component_mul(w);
        let scale = 2.0 * deviation.dot(&rc);
        (direct + cross - marginal * scale) * (2.0 / variance)
    }
}

const NEWTON_TOLERANCE: f64 = 1e-24;
const NEWTON_FULL_STEP_BELOW: f64 = 1e-10;
const MAX_HALVINGS: usize = 60;
const ARMIJO: f64 = 1e-4;
const DEGENERATE_VARIANCE: f64 = 1e-12;

/// Newton's method on `0.5 y'Σy - (1/N) Σ ln y_i` over `y > 0`.
///
/// The problem is convex and its optimum satisfies `y_i (Σy)_i = 1/N`, so the
/// normalized `y` has equal risk contributions regardless of how differently
/// the assets are scaled. Returns the weights and the Newton iterations used,
/// or `None` when the iteration settles nowhere (some positive portfolio has
/// zero variance and the barrier is unbounded).
fn equal_risk_start(cov: &DMatrix<f64>, max_iterations: usize) -> Option<(DVector<f64>, usize)> {
    let n = cov.nrows();
    let budget = 1.0 / n as f64;
    let barrier = |y: &DVector<f64>| {
        0.5 * portfolio_variance(y, cov) - budget * y.iter().map(|v| v.ln()).sum::<f64>()
    };

    // Inverse-volatility guess, scaled to unit variance.
    let inv_vol = cov.diagonal().map(|v| 1.0 / v.sqrt());
    let variance = portfolio_variance(&inv_vol, cov);
    if !variance.is_finite() || variance <= 0.0 {
        return None;
    }
    let mut y = inv_vol / variance.sqrt();
    let mut fy = barrier(&y);

    for iteration in 0..max_iterations {
        let grad = cov * &y - y.map(|v| budget / v);
        let hessian = cov + DMatrix::from_diagonal(&y.map(|v| budget / (v * v)));
        let step = hessian.cholesky()?.solve(&(-&grad));
        let decrement = -grad.dot(&step);
        if !decrement.is_finite() {
            return None;
        }
        if decrement <= NEWTON_TOLERANCE {
            return Some((&y / y.sum(), iteration));
        }

        let mut t = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_HALVINGS {
            let candidate = &y + &step * t;
            if candidate.iter().all(|&v| v > 0.0) {
                let fc = barrier(&candidate);
                // Near the optimum only positivity is checked.
                if decrement < NEWTON_FULL_STEP_BELOW
                    || (fc.is_finite() && fc <= fy - ARMIJO * t * decrement)
                {
                    accepted = Some((candidate, fc));
                    break;
                }
            }
            t *= 0.5;
        }
        let (next, f_next) = accepted?;
        y = next;
        fy = f_next;
    }
    debug!(max_iterations, "newton start did not settle");
    None
}

/// Equal-risk-contribution weights from historical returns.
///
/// A Newton solve of the convex log-barrier form supplies the starting point;
/// the simplex minimizer then confirms it against `Σ(RC_i - 1/N)²`, or
/// searches from equal weights when the Newton solve does not settle. Each
/// stage is capped at `max_iterations` from [`SolverOptions`].
pub struct RiskParitySolver {
    minimizer: SimplexMinimizer,
}

impl RiskParitySolver {
    pub fn new(options: SolverOptions) -> Self {
        Self {
            minimizer: SimplexMinimizer::new(options),
        }
    }

    pub fn solve(&self, returns: &ReturnMatrix) -> Result<Allocation> {
        if returns.periods() < 2 {
            return Err(ToolkitError::Data(format!(
                "need at least 2 return observations, got {}",
                returns.periods()
            )));
        }
        if returns.periods() <= returns.assets() {
            debug!(
                periods = returns.periods(),
                assets = returns.assets(),
                "fewer periods than assets; covariance estimate will be unstable"
            );
        }
        let cov = sample_covariance(returns)?;
        self.solve_covariance(returns.symbols(), &cov)
    }

    pub fn solve_covariance(&self, symbols: &[String], cov: &DMatrix<f64>) -> Result<Allocation> {
        let n = symbols.len();
        if n < 2 {
            return Err(ToolkitError::Data(format!(
                "risk parity needs at least 2 assets, got {}",
                n
            )));
        }
        validate_covariance(symbols, cov)?;

        let equal = DVector::from_element(n, 1.0 / n as f64);
        let scale = cov.diagonal().max();
        if portfolio_variance(&equal, cov) <= DEGENERATE_VARIANCE * scale {
            return Err(ToolkitError::Input(
                "equally weighted portfolio has zero variance; risk contributions are undefined"
                    .to_string(),
            ));
        }

        let cap = self.minimizer.options().max_iterations;
        let (start, newton_iterations) = match equal_risk_start(cov, cap) {
            Some((weights, iterations)) => (weights, iterations),
            None => {
                debug!("falling back to an equal-weight start");
                (equal, cap)
            }
        };

        let objective = RiskParityObjective::new(cov);
        let minimum = self.minimizer.minimize(&objective, start)?;
        let iterations = newton_iterations + minimum.iterations;

        let contributions = risk_contributions(&minimum.x, cov);
        info!(
            assets = n,
            iterations,
            objective = minimum.value,
            "risk parity weights solved"
        );

        Ok(Allocation {
            symbols: symbols.to_vec(),
            weights: minimum.x.iter().copied().collect(),
            risk_contributions: contributions.iter().copied().collect(),
            iterations,
            objective: minimum.value,
        })
    }
}

impl Default for RiskParitySolver {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cov() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            3,
            &[0.040, 0.006, 0.002, 0.006, 0.010, 0.001, 0.002, 0.001, 0.0225],
        )
    }

    struct NumericOnly<'a>(RiskParityObjective<'a>);

    impl Objective for NumericOnly<'_> {
        fn value(&self, x: &DVector<f64>) -> f64 {
            self.0.value(x)
        }
    }

    #[test]
    fn contributions_sum_to_one() {
        let w = DVector::from_vec(vec![0.5, 0.3, 0.2]);
        let rc = risk_contributions(&w, &sample_cov());
        assert!((rc.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn analytic_gradient_matches_finite_differences() {
        let cov = sample_cov();
        let w = DVector::from_vec(vec![0.6, 0.25, 0.15]);
        let analytic = RiskParityObjective::new(&cov).gradient(&w);
        let numeric = NumericOnly(RiskParityObjective::new(&cov)).gradient(&w);
        assert!(
            (&analytic - &numeric).amax() < 1e-6,
            "analytic {:?} numeric {:?}",
            analytic,
            numeric
        );
    }

    #[test]
    fn solved_weights_equalize_contributions() {
        let cov = sample_cov();
        let symbols: Vec<String> = vec!["A".into(), "B".into(), "C".into()];
        let allocation = RiskParitySolver::default()
            .solve_covariance(&symbols, &cov)
            .unwrap();
        assert!((allocation.total_weight() - 1.0).abs() < 1e-9);
        for rc in &allocation.risk_contributions {
            assert!((rc - 1.0 / 3.0).abs() < 1e-4, "{:?}", allocation.risk_contributions);
        }
        // Highest variance asset gets the smallest weight.
        assert!(allocation.weights[0] < allocation.weights[2]);
        assert!(allocation.weights[2] < allocation.weights[1]);
    }

    #[test]
    fn single_asset_is_a_data_error() {
        let cov = DMatrix::from_row_slice(1, 1, &[0.04]);
        let err = RiskParitySolver::default()
            .solve_covariance(&["A".to_string()], &cov)
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Data(_)));
    }
}
