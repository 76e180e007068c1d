use nalgebra::DMatrix;
use rand::prelude::*;
use rand_distr::{Normal, StandardNormal};

use portfolio_toolkit::{
    core::{risk_contributions, ReturnMatrix, RiskParitySolver, SolverOptions},
    ToolkitError,
};

fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("A{i}")).collect()
}

/// Zero-mean, mutually orthogonal columns taken from an 8x8 Hadamard matrix,
/// so the sample covariance is exactly diagonal.
fn orthogonal_returns(scales: &[f64]) -> ReturnMatrix {
    let columns: Vec<Vec<f64>> = scales
        .iter()
        .enumerate()
        .map(|(c, scale)| {
            (0..8usize)
                .map(|r| {
                    let sign = if (r & (c + 1)).count_ones() % 2 == 0 { 1.0 } else { -1.0 };
                    sign * 0.01 * scale
                })
                .collect()
        })
        .collect();
    ReturnMatrix::from_columns(symbols(scales.len()), &columns).unwrap()
}

fn random_returns(rng: &mut StdRng, periods: usize, vols: &[f64]) -> ReturnMatrix {
    let columns: Vec<Vec<f64>> = vols
        .iter()
        .map(|&vol| {
            let normal = Normal::new(0.0, vol).unwrap();
            (0..periods).map(|_| normal.sample(rng)).collect()
        })
        .collect();
    ReturnMatrix::from_columns(symbols(vols.len()), &columns).unwrap()
}

#[test]
fn test_equal_variance_uncorrelated_gives_equal_weights() {
    let returns = orthogonal_returns(&[1.0, 1.0, 1.0, 1.0]);
    let allocation = RiskParitySolver::default().solve(&returns).unwrap();
    for w in &allocation.weights {
        assert!((w - 0.25).abs() < 1e-9, "{:?}", allocation.weights);
    }
}

#[test]
fn test_high_variance_asset_is_underweighted() {
    let returns = orthogonal_returns(&[5.0, 1.0, 1.0, 1.0]);
    let allocation = RiskParitySolver::default().solve(&returns).unwrap();

    assert!(allocation.weights[0] < 0.25);
    // Uncorrelated assets: weights are proportional to 1 / volatility.
    let expected = [0.2 / 3.2, 1.0 / 3.2, 1.0 / 3.2, 1.0 / 3.2];
    for (w, e) in allocation.weights.iter().zip(expected) {
        assert!((w - e).abs() < 1e-4, "{:?}", allocation.weights);
    }
    for rc in &allocation.risk_contributions {
        assert!((rc - 0.25).abs() < 1e-4, "{:?}", allocation.risk_contributions);
    }
}

#[test]
fn test_iid_daily_returns_give_near_equal_weights() {
    let mut rng = StdRng::seed_from_u64(7);
    let returns = random_returns(&mut rng, 250, &[0.01, 0.01, 0.01, 0.01]);
    let allocation = RiskParitySolver::default().solve(&returns).unwrap();

    assert!((allocation.total_weight() - 1.0).abs() < 1e-6);
    for w in &allocation.weights {
        assert!((w - 0.25).abs() < 0.05, "{:?}", allocation.weights);
    }
}

#[test]
fn test_weights_are_on_the_simplex_for_random_inputs() {
    let mut rng = StdRng::seed_from_u64(2024);
    for n in 2..=6 {
        let vols: Vec<f64> = (0..n).map(|_| rng.gen_range(0.005..0.04)).collect();
        let base = random_returns(&mut rng, 300, &vols);

        // Mix in a common factor so the assets are correlated.
        let factor: Vec<f64> = (0..300).map(|_| rng.gen_range(-0.01..0.01)).collect();
        let values = DMatrix::from_fn(300, n, |r, c| base.values()[(r, c)] + factor[r] * (c as f64 + 1.0) * 0.3);
        let returns = ReturnMatrix::new(symbols(n), values).unwrap();

        let allocation = RiskParitySolver::default().solve(&returns).unwrap();
        assert!(allocation.weights.iter().all(|&w| w >= 0.0), "{:?}", allocation.weights);
        assert!((allocation.total_weight() - 1.0).abs() < 1e-6);

        let target = 1.0 / n as f64;
        let spread = allocation
            .risk_contributions
            .iter()
            .map(|rc| (rc - target).abs())
            .fold(0.0_f64, f64::max);
        assert!(spread < 1e-3, "n={n} contributions {:?}", allocation.risk_contributions);
    }
}

#[test]
fn test_reported_contributions_match_weights() {
    let mut rng = StdRng::seed_from_u64(11);
    let returns = random_returns(&mut rng, 120, &[0.02, 0.01, 0.015]);
    let allocation = RiskParitySolver::default().solve(&returns).unwrap();

    let cov = portfolio_toolkit::core::sample_covariance(&returns).unwrap();
    let w = nalgebra::DVector::from_vec(allocation.weights.clone());
    let rc = risk_contributions(&w, &cov);
    for (a, b) in rc.iter().zip(&allocation.risk_contributions) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn test_zero_variance_asset_is_input_error() {
    let returns = ReturnMatrix::from_columns(
        symbols(3),
        &[
            vec![0.01, -0.02, 0.015, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![-0.01, 0.02, 0.0, 0.01],
        ],
    )
    .unwrap();
    let err = RiskParitySolver::default().solve(&returns).unwrap_err();
    assert!(matches!(err, ToolkitError::Input(ref m) if m.contains("A1")), "{err:?}");
}

#[test]
fn test_single_observation_is_data_error() {
    let returns = ReturnMatrix::from_columns(symbols(2), &[vec![0.01], vec![0.02]]).unwrap();
    let err = RiskParitySolver::default().solve(&returns).unwrap_err();
    assert!(matches!(err, ToolkitError::Data(_)), "{err:?}");
}

#[test]
fn test_iteration_budget_exhaustion_is_convergence_error() {
    let cov = DMatrix::from_row_slice(
        3,
        3,
        &[0.040, 0.006, 0.002, 0.006, 0.010, 0.001, 0.002, 0.001, 0.0225],
    );
    let solver = RiskParitySolver::new(SolverOptions {
        max_iterations: 1,
        ..SolverOptions::default()
    });
    let err = solver.solve_covariance(&symbols(3), &cov).unwrap_err();
    assert!(matches!(err, ToolkitError::Convergence(_)), "{err:?}");
}

/// One common factor with correlation `rho` between every pair.
fn factor_returns(rng: &mut StdRng, periods: usize, vols: &[f64], rho: f64) -> ReturnMatrix {
    let common: Vec<f64> = (0..periods).map(|_| rng.sample(StandardNormal)).collect();
    let columns: Vec<Vec<f64>> = vols
        .iter()
        .map(|&vol| {
            common
                .iter()
                .map(|&z| {
                    let own: f64 = rng.sample(StandardNormal);
                    vol * (rho.sqrt() * z + (1.0 - rho).sqrt() * own)
                })
                .collect()
        })
        .collect();
    ReturnMatrix::from_columns(symbols(vols.len()), &columns).unwrap()
}

#[test]
fn test_badly_scaled_correlated_assets_still_converge() {
    // Two cash-like assets next to equities two orders of magnitude riskier.
    let vols = [0.0005, 0.003, 0.01, 0.04, 0.02, 0.0001];
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let returns = factor_returns(&mut rng, 250, &vols, 0.5);
        let allocation = RiskParitySolver::default()
            .solve(&returns)
            .unwrap_or_else(|e| panic!("seed {seed}: {e}"));

        assert!(allocation.weights.iter().all(|&w| w > 0.0), "{:?}", allocation.weights);
        assert!((allocation.total_weight() - 1.0).abs() < 1e-9);
        for rc in &allocation.risk_contributions {
            assert!((rc - 1.0 / 6.0).abs() < 1e-6, "seed {seed}: {:?}", allocation.risk_contributions);
        }
        // The quietest asset carries the most weight.
        assert!(allocation.weights[5] > allocation.weights[0]);
        assert!(allocation.weights[0] > allocation.weights[3]);
    }
}

#[test]
fn test_perfectly_offsetting_pair_is_input_error() {
    let a = vec![0.01, -0.02, 0.015, 0.004, -0.007];
    let mirrored: Vec<f64> = a.iter().map(|v| -v).collect();
    let returns = ReturnMatrix::from_columns(symbols(2), &[a, mirrored]).unwrap();

    let err = RiskParitySolver::default().solve(&returns).unwrap_err();
    assert!(matches!(err, ToolkitError::Input(_)), "{err:?}");
}
