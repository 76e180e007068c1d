use nalgebra::DMatrix;
use statrs::statistics::Statistics;

use crate::core::ReturnMatrix;
use crate::{Result, ToolkitError};

/// Sample covariance of the return columns (denominator `T - 1`).
pub fn sample_covariance(returns: &ReturnMatrix) -> Result<DMatrix<f64>> {
    let values = returns.values();
    if values.nrows() < 2 {
        return Err(ToolkitError::Data(format!(
            "need at least 2 return observations for a covariance estimate, got {}",
            values.nrows()
        )));
    }

    let n = values.ncols();
    let mut cov = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let c = values.column(i).iter().covariance(values.column(j).iter());
            cov[(i, j)] = c;
            cov[(j, i)] = c;
        }
    }
    Ok(cov)
}

/// Rejects covariance matrices the risk-contribution formula cannot use:
/// wrong shape, non-finite entries, asymmetry, zero-variance assets, or a
/// matrix that is not positive semi-definite.
pub fn validate_covariance(symbols: &[String], cov: &DMatrix<f64>) -> Result<()> {
    let n = symbols.len();
    if cov.nrows() != n || cov.ncols() != n {
        return Err(ToolkitError::Data(format!(
            "covariance is {}x{} but {} symbols were given",
            cov.nrows(),
            cov.ncols(),
            n
        )));
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(ToolkitError::Input("covariance contains non-finite values".to_string()));
    }

    let scale = cov.diagonal().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    for i in 0..n {
        for j in (i + 1)..n {
            if (cov[(i, j)] - cov[(j, i)]).abs() > 1e-12 * scale.max(1.0) {
                return Err(ToolkitError::Input("covariance matrix is not symmetric".to_string()));
            }
        }
    }

    for (i, symbol) in symbols.iter().enumerate() {
        if cov[(i, i)] <= 1e-18 {
            return Err(ToolkitError::Input(format!(
                "{} has zero variance; its risk contribution is undefined",
                symbol
            )));
        }
    }

    // A tiny ridge lets singular-but-PSD matrices through while still
    // catching clearly indefinite ones.
    let ridge = DMatrix::identity(n, n) * (scale * 1e-10);
    if (cov + ridge).cholesky().is_none() {
        return Err(ToolkitError::Input(
            "covariance matrix is not positive semi-definite".to_string(),
        ));
    }
    Ok(())
}
