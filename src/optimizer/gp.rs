//! Gaussian-process regression with a Matérn ν=2.5 kernel.
//!
//! Inputs are expected on the unit cube (see [`super::ParameterSpace::to_unit`]);
//! targets are standardized internally. The kernel length scale is chosen
//! from a fixed grid by maximizing the log marginal likelihood.

use crate::error::OptimizerError;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array2, ArrayView1};

/// Jitter retries before the kernel matrix is declared not positive definite.
const MAX_JITTER_ATTEMPTS: usize = 6;

/// Isotropic Matérn ν=2.5 covariance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matern52 {
    pub length_scale: f64,
    pub variance: f64,
}

impl Matern52 {
    pub fn new(length_scale: f64) -> Self {
        Matern52 {
            length_scale,
            variance: 1.0,
        }
    }

    pub fn evaluate(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let distance = (&a - &b).mapv(|d| d * d).sum().sqrt();
        let r = 5.0_f64.sqrt() * distance / self.length_scale;
        self.variance * (1.0 + r + r * r / 3.0) * (-r).exp()
    }
}

/// Settings for fitting a [`GaussianProcess`].
#[derive(Debug, Clone, PartialEq)]
pub struct GpSettings {
    /// Candidate length scales, in unit-cube coordinates.
    pub length_scales: Vec<f64>,
    /// Observation noise variance added to the diagonal (standardized units).
    pub noise: f64,
}

impl Default for GpSettings {
    fn default() -> Self {
        GpSettings {
            length_scales: vec![0.1, 0.2, 0.5, 1.0, 2.0],
            noise: 1e-6,
        }
    }
}

/// A fitted Gaussian process.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    kernel: Matern52,
    /// Training inputs, one row per point
    x_train: Array2<f64>,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    y_mean: f64,
    y_scale: f64,
    log_marginal_likelihood: f64,
}

impl GaussianProcess {
    /// Fits the process to `x` (unit-cube points) and `y` (targets).
    ///
    /// Every length scale in `settings` is tried; the one with the highest log
    /// marginal likelihood wins. Fails only when no length scale yields a
    /// factorizable kernel matrix.
    pub fn fit(x: &[Vec<f64>], y: &[f64], settings: &GpSettings) -> Result<Self, OptimizerError> {
        let dim = x.first().map_or(0, Vec::len);
        if x.is_empty() || x.len() != y.len() || x.iter().any(|p| p.len() != dim) {
            return Err(OptimizerError::InsufficientData {
                required: 1,
                available: x.len().min(y.len()),
            });
        }
        let x_train = Array2::from_shape_fn((x.len(), dim), |(i, j)| x[i][j]);

        let n = y.len() as f64;
        let y_mean = y.iter().sum::<f64>() / n;
        let y_std = (y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n).sqrt();
        let y_scale = if y_std > 1e-12 { y_std } else { 1.0 };
        let y_norm = DVector::from_iterator(y.len(), y.iter().map(|v| (v - y_mean) / y_scale));

        let mut best: Option<GaussianProcess> = None;
        for &length_scale in &settings.length_scales {
            let kernel = Matern52::new(length_scale);
            let Some(chol) = factorize(kernel_matrix(&kernel, &x_train), settings.noise) else {
                log::debug!("GP length scale {} not factorizable", length_scale);
                continue;
            };

            let alpha = chol.solve(&y_norm);
            let log_det: f64 = chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
            let lml = -0.5 * y_norm.dot(&alpha)
                - log_det
                - 0.5 * n * (2.0 * std::f64::consts::PI).ln();

            if best
                .as_ref()
                .map_or(true, |b| lml > b.log_marginal_likelihood)
            {
                best = Some(GaussianProcess {
                    kernel,
                    x_train: x_train.clone(),
                    chol,
                    alpha,
                    y_mean,
                    y_scale,
                    log_marginal_likelihood: lml,
                });
            }
        }

        best.ok_or(OptimizerError::NotPositiveDefinite)
    }

    /// Posterior mean and standard deviation at `x`, in target units.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let x = ArrayView1::from(x);
        let k_star = DVector::from_iterator(
            self.x_train.nrows(),
            self.x_train.rows().into_iter().map(|xi| self.kernel.evaluate(x, xi)),
        );

        let mean = k_star.dot(&self.alpha);
        let v = self
            .chol
            .l_dirty()
            .solve_lower_triangular(&k_star)
            .unwrap_or_else(|| DVector::zeros(k_star.len()));
        let variance = (self.kernel.evaluate(x, x) - v.dot(&v)).max(1e-12);

        (
            mean * self.y_scale + self.y_mean,
            variance.sqrt() * self.y_scale,
        )
    }

    pub fn length_scale(&self) -> f64 {
        self.kernel.length_scale
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    pub fn n_train(&self) -> usize {
        self.x_train.nrows()
    }
}

fn kernel_matrix(kernel: &Matern52, x: &Array2<f64>) -> DMatrix<f64> {
    let n = x.nrows();
    DMatrix::from_fn(n, n, |i, j| kernel.evaluate(x.row(i), x.row(j)))
}

/// Cholesky factorization of `k + noise*I`, growing the diagonal jitter on
/// failure.
fn factorize(k: DMatrix<f64>, noise: f64) -> Option<Cholesky<f64, Dyn>> {
    let mut jitter = noise.max(1e-10);
    for _ in 0..MAX_JITTER_ATTEMPTS {
        let mut shifted = k.clone();
        for i in 0..shifted.nrows().min(shifted.ncols()) {
            shifted[(i, i)] += jitter;
        }
        if let Some(chol) = Cholesky::new(shifted) {
            return Some(chol);
        }
        jitter *= 10.0;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kernel_properties() {
        let k = Matern52::new(0.5);
        let p = array![0.3, 0.3];
        assert!((k.evaluate(p.view(), p.view()) - 1.0).abs() < 1e-12);
        let (a, b, c) = (array![0.0], array![0.1], array![0.9]);
        let near = k.evaluate(a.view(), b.view());
        let far = k.evaluate(a.view(), c.view());
        assert!(near > far);
        assert!(far > 0.0);
        assert!((k.evaluate(b.view(), c.view()) - k.evaluate(c.view(), b.view())).abs() < 1e-15);
    }

    #[test]
    fn test_jitter_recovers_singular_matrix() {
        let k = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let chol = factorize(k, 1e-6).unwrap();
        assert!(chol.l().diagonal().iter().all(|d| *d > 0.0));

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(factorize(indefinite, 1e-6).is_none());
    }

    #[test]
    fn test_interpolates_training_points() {
        let x: Vec<Vec<f64>> = vec![vec![0.1], vec![0.4], vec![0.6], vec![0.9]];
        let y: Vec<f64> = x.iter().map(|p| (6.0 * p[0]).sin()).collect();
        let gp = GaussianProcess::fit(&x, &y, &GpSettings::default()).unwrap();

        for (xi, yi) in x.iter().zip(&y) {
            let (mean, std) = gp.predict(xi);
            assert!((mean - yi).abs() < 1e-2, "mean {} vs {}", mean, yi);
            assert!(std < 5e-2);
        }

        let (_, std_train) = gp.predict(&[0.4]);
        let (_, std_between) = gp.predict(&[0.25]);
        assert!(std_between > std_train);
        assert_eq!(gp.n_train(), 4);
    }

    #[test]
    fn test_duplicate_points_recover_with_jitter() {
        let x = vec![vec![0.5, 0.5], vec![0.5, 0.5], vec![0.2, 0.8]];
        let y = vec![1.0, 1.0, 2.0];
        let gp = GaussianProcess::fit(&x, &y, &GpSettings::default()).unwrap();
        let (mean, _) = gp.predict(&[0.5, 0.5]);
        assert!((mean - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_constant_targets() {
        let x = vec![vec![0.1], vec![0.5], vec![0.9]];
        let y = vec![3.0, 3.0, 3.0];
        let gp = GaussianProcess::fit(&x, &y, &GpSettings::default()).unwrap();
        let (mean, _) = gp.predict(&[0.3]);
        assert!((mean - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_training_set() {
        let err = GaussianProcess::fit(&[], &[], &GpSettings::default()).unwrap_err();
        assert!(matches!(err, OptimizerError::InsufficientData { .. }));
    }
}
