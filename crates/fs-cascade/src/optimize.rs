//! Bounded least squares used by the `optimize` strategy.
//!
//! Levenberg-Marquardt on a residual `r(x)` with every variable projected
//! onto `x >= 0` after each step.

use nalgebra::{DMatrix, DVector};

/// Least squares configuration.
#[derive(Debug, Clone)]
pub struct LeastSquaresConfig {
    pub max_iterations: usize,
    /// Stop once the largest residual entry is below this.
    pub abs_tol: f64,
    /// Relative finite-difference step.
    pub epsilon: f64,
    /// Initial damping factor
    pub lambda: f64,
    pub max_damping_steps: usize,
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            abs_tol: 1e-8,
            epsilon: 1e-6,
            lambda: 1e-3,
            max_damping_steps: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeastSquaresResult {
    pub x: DVector<f64>,
    /// Largest residual entry at `x`.
    pub residual_max: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Forward-difference Jacobian of `f` at `x`, given `f_x = f(x)`.
pub fn finite_difference_jacobian<E, F>(
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    f: &mut F,
    epsilon: f64,
) -> Result<DMatrix<f64>, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    let n = x.len();
    let m = f_x.len();
    let mut jac = DMatrix::zeros(m, n);
    for j in 0..n {
        let mut x_perturbed = x.clone();
        let dx = epsilon * x[j].abs().max(1.0);
        x_perturbed[j] += dx;
        let df = (f(&x_perturbed)? - f_x) / dx;
        jac.set_column(j, &df);
    }
    Ok(jac)
}

fn max_abs(r: &DVector<f64>) -> f64 {
    r.iter().fold(0.0, |acc, v| if v.is_nan() { f64::INFINITY } else { acc.max(v.abs()) })
}

/// Minimize `|r(x)|^2` subject to `x >= 0`.
///
/// Never fails on lack of progress; the caller inspects `converged`.
pub fn bounded_least_squares<E, F>(
    x0: DVector<f64>,
    mut residual: F,
    config: &LeastSquaresConfig,
) -> Result<LeastSquaresResult, E>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    let mut x = x0.map(|v| v.max(0.0));
    let mut r = residual(&x)?;
    let mut norm = r.norm_squared();
    let mut lambda = config.lambda;
    for iter in 0..config.max_iterations {
        if max_abs(&r) < config.abs_tol {
            return Ok(LeastSquaresResult {
                residual_max: max_abs(&r),
                x,
                iterations: iter,
                converged: true,
            });
        }
        let jac = finite_difference_jacobian(&x, &r, &mut residual, config.epsilon)?;
        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let grad = &jt * &r;
        let mut improved = false;
        for _ in 0..config.max_damping_steps {
            let mut lhs = jtj.clone();
            for i in 0..lhs.nrows() {
                lhs[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(dx) = lhs.lu().solve(&(-&grad)) else {
                lambda *= 10.0;
                continue;
            };
            let x_new = (&x + dx).map(|v| v.max(0.0));
            let r_new = residual(&x_new)?;
            let norm_new = r_new.norm_squared();
            if norm_new.is_finite() && norm_new < norm {
                x = x_new;
                r = r_new;
                norm = norm_new;
                lambda = (lambda * 0.1).max(1e-12);
                improved = true;
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            return Ok(LeastSquaresResult {
                residual_max: max_abs(&r),
                x,
                iterations: iter + 1,
                converged: false,
            });
        }
    }
    Ok(LeastSquaresResult {
        residual_max: max_abs(&r),
        converged: max_abs(&r) < config.abs_tol,
        x,
        iterations: config.max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type Never = std::convert::Infallible;

    #[test]
    fn jacobian_of_linear_map() {
        let mut f = |x: &DVector<f64>| -> Result<DVector<f64>, Never> {
            Ok(DVector::from_vec(vec![2.0 * x[0] + x[1], -x[1]]))
        };
        let x = DVector::from_vec(vec![1.0, 3.0]);
        let fx = f(&x).unwrap();
        let jac = finite_difference_jacobian(&x, &fx, &mut f, 1e-7).unwrap();
        assert!((jac[(0, 0)] - 2.0).abs() < 1e-5);
        assert!((jac[(0, 1)] - 1.0).abs() < 1e-5);
        assert!((jac[(1, 1)] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn solves_linear_fixed_point_residual() {
        // g(x) = 0.5 x + 1, residual g(x) - x, root at 2
        let residual = |x: &DVector<f64>| -> Result<DVector<f64>, Never> {
            Ok(x.map(|v| 0.5 * v + 1.0 - v))
        };
        let result = bounded_least_squares(
            DVector::from_vec(vec![0.0, 10.0]),
            residual,
            &LeastSquaresConfig::default(),
        )
        .unwrap();
        assert!(result.converged);
        assert!((result.x[0] - 2.0).abs() < 1e-6);
        assert!((result.x[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn respects_lower_bound() {
        // unconstrained root at -1
        let residual =
            |x: &DVector<f64>| -> Result<DVector<f64>, Never> { Ok(x.map(|v| v + 1.0)) };
        let result = bounded_least_squares(
            DVector::from_vec(vec![3.0]),
            residual,
            &LeastSquaresConfig::default(),
        )
        .unwrap();
        assert!(!result.converged);
        assert!(result.x[0] >= 0.0);
        assert!(result.x[0] < 1e-9);
    }
}
