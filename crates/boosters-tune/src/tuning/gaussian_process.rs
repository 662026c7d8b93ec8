//! Gaussian process regression over the unit cube.
//!
//! Matérn 5/2 kernel with a shared length scale, outputs normalised to zero
//! mean and unit variance before fitting.

use ndarray::{Array1, Array2, ArrayView1};

/// Matérn 5/2 correlation at distance `r` (already divided by the length scale).
#[inline]
pub fn matern52(r: f64) -> f64 {
    let sqrt5 = 5.0_f64.sqrt();
    (1.0 + sqrt5 * r + 5.0 / 3.0 * r * r) * (-sqrt5 * r).exp()
}

#[inline]
fn kernel(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, length_scale: f64) -> f64 {
    let distance = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt();
    matern52(distance / length_scale)
}

/// A fitted Gaussian process.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scale: f64,
    x: Array2<f64>,
    /// Normalised outputs.
    y: Array1<f64>,
    /// Lower Cholesky factor of `K + noise·I`.
    chol: Array2<f64>,
    /// `(K + noise·I)⁻¹ y`.
    alpha: Array1<f64>,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// Fit to `x` (one point per row) and outputs `y`.
    ///
    /// Returns `None` if the kernel matrix is not positive definite even after
    /// adding jitter.
    pub fn fit(x: Array2<f64>, y: &Array1<f64>, length_scale: f64, noise: f64) -> Option<Self> {
        let n = y.len();
        if n == 0 || x.nrows() != n || !(length_scale > 0.0) {
            return None;
        }

        let y_mean = y.mean().unwrap_or(0.0);
        let mut y_std = y.std(0.0);
        if !(y_std > 1e-12) {
            y_std = 1.0;
        }
        let normalised = y.mapv(|v| (v - y_mean) / y_std);

        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let value = kernel(x.row(i), x.row(j), length_scale);
                k[[i, j]] = value;
                k[[j, i]] = value;
            }
        }

        let mut jitter = noise.max(1e-10);
        let chol = loop {
            let mut noisy = k.clone();
            for i in 0..n {
                noisy[[i, i]] += jitter;
            }
            match cholesky(&noisy) {
                Some(l) => break l,
                None if jitter < 1.0 => jitter *= 10.0,
                None => return None,
            }
        };
        let alpha = solve_upper_transposed(&chol, &solve_lower_triangular(&chol, &normalised));

        Some(Self {
            length_scale,
            x,
            y: normalised,
            chol,
            alpha,
            y_mean,
            y_std,
        })
    }

    /// Fit once per candidate length scale and keep the fit with the highest
    /// log marginal likelihood.
    pub fn fit_best_length_scale(
        x: &Array2<f64>,
        y: &Array1<f64>,
        length_scales: &[f64],
        noise: f64,
    ) -> Option<Self> {
        length_scales
            .iter()
            .filter_map(|&length_scale| Self::fit(x.clone(), y, length_scale, noise))
            .filter(|gp| gp.log_marginal_likelihood().is_finite())
            .max_by(|a, b| a.log_marginal_likelihood().total_cmp(&b.log_marginal_likelihood()))
    }

    #[inline]
    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    /// `−½ yᵀα − Σ ln Lᵢᵢ − n/2 ln 2π` on the normalised outputs.
    pub fn log_marginal_likelihood(&self) -> f64 {
        let n = self.y.len() as f64;
        let log_det: f64 = self.chol.diag().iter().map(|d| d.ln()).sum();
        -0.5 * self.y.dot(&self.alpha) - log_det - 0.5 * n * (2.0 * std::f64::consts::PI).ln()
    }

    /// Posterior mean and variance at `point`, in the original output units.
    pub fn predict(&self, point: ArrayView1<'_, f64>) -> (f64, f64) {
        let k_star: Array1<f64> = self
            .x
            .rows()
            .into_iter()
            .map(|row| kernel(row, point, self.length_scale))
            .collect();
        let mean = k_star.dot(&self.alpha) * self.y_std + self.y_mean;
        let v = solve_lower_triangular(&self.chol, &k_star);
        let variance = (1.0 - v.dot(&v)).max(1e-12) * self.y_std * self.y_std;
        (mean, variance)
    }
}

/// Expected reduction below `best` for a normal posterior.
pub fn expected_improvement(mean: f64, variance: f64, best: f64) -> f64 {
    let sigma = variance.sqrt();
    let improvement = best - mean;
    if !(sigma > 1e-12) {
        return improvement.max(0.0);
    }
    let z = improvement / sigma;
    improvement * normal_cdf(z) + sigma * normal_pdf(z)
}

#[inline]
fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

#[inline]
fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let pivot = a[[i, i]] - sum;
                if !(pivot > 0.0) {
                    return None;
                }
                l[[i, i]] = pivot.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L x = b`.
fn solve_lower_triangular(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * x[j]).sum();
        x[i] = (b[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve `Lᵀ x = b`.
fn solve_upper_transposed(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (b[i] - sum) / l[[i, i]];
    }
    x
}
