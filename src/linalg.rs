//! Small dense linear algebra for the Gaussian density.
//!
//! Only what the mixture model needs: a Cholesky factor of a covariance,
//! its log-determinant, and the squared Mahalanobis distance.

use crate::types::Covariance;

/// ln(2π)
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Lower-triangular Cholesky factor `L` with `L * L^T = Σ`
#[derive(Debug, Clone)]
pub struct Cholesky {
    dim: usize,
    lower: Vec<f64>,
}

impl Cholesky {
    /// Factorize `cov`, or `None` if it is not positive definite
    pub fn decompose(cov: &Covariance) -> Option<Self> {
        let n = cov.dim;
        let mut lower = vec![0.0; n * n];

        for i in 0..n {
            for j in 0..=i {
                let mut sum = cov.get(i, j);
                for k in 0..j {
                    sum -= lower[i * n + k] * lower[j * n + k];
                }

                if i == j {
                    if !(sum > 0.0) || !sum.is_finite() {
                        return None;
                    }
                    lower[i * n + i] = sum.sqrt();
                } else {
                    lower[i * n + j] = sum / lower[j * n + j];
                }
            }
        }

        Some(Self { dim: n, lower })
    }

    /// ln |Σ| = 2 Σ ln L_ii
    pub fn log_det(&self) -> f64 {
        (0..self.dim)
            .map(|i| self.lower[i * self.dim + i].ln())
            .sum::<f64>()
            * 2.0
    }

    /// (x - μ)^T Σ^-1 (x - μ), via forward substitution on `L`
    pub fn mahalanobis_sq(&self, x: &[f64], mean: &[f64]) -> f64 {
        let n = self.dim;
        let mut z = vec![0.0; n];
        let mut total = 0.0;

        for i in 0..n {
            let mut sum = x[i] - mean[i];
            for k in 0..i {
                sum -= self.lower[i * n + k] * z[k];
            }
            z[i] = sum / self.lower[i * n + i];
            total += z[i] * z[i];
        }

        total
    }
}

/// Precomputed log-density of one Gaussian component
#[derive(Debug, Clone)]
pub struct GaussianDensity {
    chol: Cholesky,
    log_norm: f64,
}

impl GaussianDensity {
    pub fn new(cov: &Covariance) -> Option<Self> {
        let chol = Cholesky::decompose(cov)?;
        let log_norm = -0.5 * (cov.dim as f64 * LN_2PI + chol.log_det());
        Some(Self { chol, log_norm })
    }

    /// ln N(x | mean, Σ)
    pub fn log_pdf(&self, x: &[f64], mean: &[f64]) -> f64 {
        self.log_norm - 0.5 * self.chol.mahalanobis_sq(x, mean)
    }
}

/// ln Σ exp(v), safe for large negative inputs; `-inf` for an empty or all `-inf` slice
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
