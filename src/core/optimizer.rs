//! Constrained minimization over the probability simplex.
//!
//! [`SimplexMinimizer`] is a spectral projected gradient method: steps along
//! the negative gradient are projected back onto `{x : x >= 0, sum(x) = 1}`,
//! the step length follows the Barzilai-Borwein rule, and a non-monotone
//! Armijo line search guards each step. Every iterate is feasible, so a
//! result always satisfies the constraints even when it is reported as
//! not converged.

use std::collections::VecDeque;

use nalgebra::DVector;
use tracing::debug;

use crate::{Result, ToolkitError};

/// A smooth function to minimize.
pub trait Objective {
    fn value(&self, x: &DVector<f64>) -> f64;

    /// Central finite differences unless the objective knows better.
    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut grad = DVector::zeros(x.len());
        let mut probe = x.clone();
        for i in 0..x.len() {
            let h = 1e-6 * x[i].abs().max(1.0);
            probe[i] = x[i] + h;
            let up = self.value(&probe);
            probe[i] = x[i] - h;
            let down = self.value(&probe);
            probe[i] = x[i];
            grad[i] = (up - down) / (2.0 * h);
        }
        grad
    }
}

#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Converged once the projected-gradient step is this small (infinity
    /// norm) or the objective falls below its square.
    pub tolerance: f64,
    /// How many recent objective values the line search compares against.
    pub line_search_memory: usize,
    pub min_step: f64,
    pub max_step: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
            line_search_memory: 10,
            min_step: 1e-10,
            max_step: 1e10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
}

pub struct SimplexMinimizer {
    options: SolverOptions,
}

const ARMIJO_SUFFICIENT_DECREASE: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;

impl SimplexMinimizer {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn minimize<O: Objective>(&self, objective: &O, start: DVector<f64>) -> Result<Minimum> {
        if start.is_empty() {
            return Err(ToolkitError::Data("cannot minimize over an empty simplex".to_string()));
        }
        let opts = &self.options;

        let mut x = project_onto_simplex(&start);
        let mut fx = objective.value(&x);
        if !fx.is_finite() {
            return Err(ToolkitError::Input(
                "objective is undefined at the starting point".to_string(),
            ));
        }
        let mut grad = objective.gradient(&x);
        let mut recent: VecDeque<f64> = VecDeque::with_capacity(opts.line_search_memory.max(1));
        recent.push_back(fx);

        let mut step = (1.0 / projected_step(&x, &grad, 1.0).amax().max(f64::EPSILON))
            .clamp(opts.min_step, opts.max_step);

        // Only finite candidates pass the line search, so `fx` stays finite.
        for iteration in 0..=opts.max_iterations {
            let stationarity = projected_step(&x, &grad, 1.0).amax();
            if stationarity <= opts.tolerance || fx <= opts.tolerance * opts.tolerance {
                debug!(iteration, objective = fx, stationarity, "simplex minimizer converged");
                return Ok(Minimum { x, value: fx, iterations: iteration });
            }
            if iteration == opts.max_iterations {
                break;
            }

            let direction = projected_step(&x, &grad, step);
            let slope = grad.dot(&direction);
            let reference = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let mut lambda = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let candidate = &x + &direction * lambda;
                let fc = objective.value(&candidate);
                if fc.is_finite() && fc <= reference + ARMIJO_SUFFICIENT_DECREASE * lambda * slope {
                    accepted = Some((candidate, fc));
                    break;
                }
                lambda *= 0.5;
            }
            let (next, f_next) = accepted.ok_or_else(|| {
                ToolkitError::Convergence(format!(
                    "line search failed at iteration {} (objective {:.3e}, stationarity {:.3e})",
                    iteration, fx, stationarity
                ))
            })?;

            let next_grad = objective.gradient(&next);
            let s = &next - &x;
            let y = &next_grad - &grad;
            let sy = s.dot(&y);
            step = if sy > 0.0 {
                (s.dot(&s) / sy).clamp(opts.min_step, opts.max_step)
            } else {
                opts.max_step
            };

            x = next;
            fx = f_next;
            grad = next_grad;
            if recent.len() == opts.line_search_memory.max(1) {
                recent.pop_front();
            }
            recent.push_back(fx);
        }

        Err(ToolkitError::Convergence(format!(
            "no convergence within {} iterations (objective {:.3e})",
            opts.max_iterations, fx
        )))
    }
}

impl Default for SimplexMinimizer {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

fn projected_step(x: &DVector<f64>, grad: &DVector<f64>, step: f64) -> DVector<f64> {
    project_onto_simplex(&(x - grad * step)) - x
}

/// Euclidean projection onto `{x : x >= 0, sum(x) = 1}`.
pub fn project_onto_simplex(v: &DVector<f64>) -> DVector<f64> {
    let n = v.len();
    if n == 0 {
        return v.clone();
    }
    let mut sorted: Vec<f64> = v.iter().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (k, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (k + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    let mut projected = v.map(|vi| (vi - theta).max(0.0));
    // Re-normalize away the rounding left by the threshold.
    let total = projected.sum();
    if total > 0.0 {
        projected /= total;
    } else {
        projected.fill(1.0 / n as f64);
    }
    projected
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic {
        target: DVector<f64>,
    }

    impl Objective for Quadratic {
        fn value(&self, x: &DVector<f64>) -> f64 {
            (x - &self.target).norm_squared()
        }
    }

    #[test]
    fn projection_lands_on_simplex() {
        let cases = [
            vec![0.2, 0.3, 0.5],
            vec![5.0, -1.0, 0.5],
            vec![-3.0, -2.0, -1.0],
            vec![0.0, 0.0, 0.0, 0.0],
        ];
        for case in cases {
            let p = project_onto_simplex(&DVector::from_vec(case.clone()));
            assert!(p.iter().all(|&w| w >= 0.0), "{:?} -> {:?}", case, p);
            assert!((p.sum() - 1.0).abs() < 1e-12, "{:?} -> {:?}", case, p);
        }
    }

    #[test]
    fn projection_keeps_points_already_on_simplex() {
        let v = DVector::from_vec(vec![0.1, 0.6, 0.3]);
        let p = project_onto_simplex(&v);
        assert!((p - v).amax() < 1e-12);
    }

    #[test]
    fn finds_interior_minimum() {
        let objective = Quadratic {
            target: DVector::from_vec(vec![0.5, 0.3, 0.2]),
        };
        let result = SimplexMinimizer::default()
            .minimize(&objective, DVector::from_element(3, 1.0 / 3.0))
            .unwrap();
        assert!((result.x[0] - 0.5).abs() < 1e-6);
        assert!((result.x[1] - 0.3).abs() < 1e-6);
        assert!((result.x[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn finds_minimum_on_the_boundary() {
        // Unconstrained optimum lies outside the simplex.
        let objective = Quadratic {
            target: DVector::from_vec(vec![1.5, -0.5]),
        };
        let result = SimplexMinimizer::default()
            .minimize(&objective, DVector::from_element(2, 0.5))
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-8);
        assert!(result.x[1].abs() < 1e-8);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let objective = Quadratic {
            target: DVector::from_vec(vec![0.9, 0.05, 0.05]),
        };
        let minimizer = SimplexMinimizer::new(SolverOptions {
            max_iterations: 0,
            ..SolverOptions::default()
        });
        let err = minimizer
            .minimize(&objective, DVector::from_element(3, 1.0 / 3.0))
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Convergence(_)));
    }

    struct UndefinedAtCenter;

    impl Objective for UndefinedAtCenter {
        fn value(&self, x: &DVector<f64>) -> f64 {
            1.0 / (x[0] - x[1])
        }
    }

    #[test]
    fn undefined_start_is_an_input_error() {
        let err = SimplexMinimizer::default()
            .minimize(&UndefinedAtCenter, DVector::from_element(2, 0.5))
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Input(_)), "{err:?}");
    }
}
