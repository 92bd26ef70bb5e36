//! Convergence accelerators for fixed-point problems `x = g(x)`.
//!
//! Every solver drives a *conditional* map: `f(x)` returns the substitution
//! value `g(x)` together with a flag that is `true` while iteration should
//! continue. Termination (tolerances, iteration caps) is entirely the
//! caller's business, which lets the same accelerators serve recycle loops
//! and the inner loops of the stage-cascade solver.
//!
//! Variables are assumed non-negative (flows, phase ratios, K-values). An
//! extrapolated value that would cross below zero while the plain
//! substitution value does not is replaced by the substitution value.

use crate::numeric::{NOISE_FLOOR, Real};

/// Largest |w| accepted by Wegstein before falling back to substitution.
pub const WEGSTEIN_WEIGHT_BOUND: Real = 5.0;

fn guard(extrapolated: Real, substituted: Real) -> Real {
    if !extrapolated.is_finite() || (extrapolated < 0.0 && substituted >= 0.0) {
        substituted
    } else {
        extrapolated
    }
}

/// Plain successive substitution.
pub fn conditional_fixed_point<E, F>(mut f: F, x0: Vec<Real>) -> Result<Vec<Real>, E>
where
    F: FnMut(&[Real]) -> Result<(Vec<Real>, bool), E>,
{
    let mut x = x0;
    loop {
        let (gx, keep_going) = f(&x)?;
        if !keep_going {
            return Ok(gx);
        }
        x = gx;
    }
}

/// Wegstein acceleration with per-variable secant weights.
///
/// `w = dx / (dx - dg)`; weights that are non-finite or larger than
/// [`WEGSTEIN_WEIGHT_BOUND`] in magnitude reset to plain substitution.
pub fn conditional_wegstein<E, F>(mut f: F, x0: Vec<Real>) -> Result<Vec<Real>, E>
where
    F: FnMut(&[Real]) -> Result<(Vec<Real>, bool), E>,
{
    let (g0, keep_going) = f(&x0)?;
    if !keep_going {
        return Ok(g0);
    }
    let n = x0.len();
    let mut w = vec![1.0; n];
    let mut x_prev = x0;
    let mut g_prev = g0.clone();
    let mut x = g0;
    loop {
        let (g, keep_going) = f(&x)?;
        if !keep_going {
            return Ok(g);
        }
        let mut next = Vec::with_capacity(n);
        for i in 0..n {
            let dx = x[i] - x_prev[i];
            let denominator = dx - g[i] + g_prev[i];
            if denominator.abs() > NOISE_FLOOR {
                let wi = dx / denominator;
                w[i] = if wi.is_finite() && wi.abs() <= WEGSTEIN_WEIGHT_BOUND {
                    wi
                } else {
                    1.0
                };
            }
            next.push(guard(w[i] * g[i] + (1.0 - w[i]) * x[i], g[i]));
        }
        x_prev = std::mem::replace(&mut x, next);
        g_prev = g;
    }
}

/// Aitken's delta-squared extrapolation, applied elementwise every two
/// substitutions.
pub fn conditional_aitken<E, F>(mut f: F, x0: Vec<Real>) -> Result<Vec<Real>, E>
where
    F: FnMut(&[Real]) -> Result<(Vec<Real>, bool), E>,
{
    let mut x = x0;
    loop {
        let (gx, keep_going) = f(&x)?;
        if !keep_going {
            return Ok(gx);
        }
        let (ggx, keep_going) = f(&gx)?;
        if !keep_going {
            return Ok(ggx);
        }
        x = x
            .iter()
            .zip(&gx)
            .zip(&ggx)
            .map(|((&x0, &x1), &x2)| {
                let denominator = x2 - 2.0 * x1 + x0;
                if denominator.abs() > NOISE_FLOOR {
                    let dx = x1 - x0;
                    guard(x0 - dx * dx / denominator, x2)
                } else {
                    x2
                }
            })
            .collect();
    }
}

/// Fixed-point iteration until the largest change is below `xtol` or
/// `maxiter` substitutions have been made. Returns the last iterate.
pub fn fixed_point<E, F>(mut g: F, x0: Vec<Real>, xtol: Real, maxiter: usize) -> Result<Vec<Real>, E>
where
    F: FnMut(&[Real]) -> Result<Vec<Real>, E>,
{
    let mut iter = 0;
    conditional_fixed_point(
        |x| {
            iter += 1;
            let gx = g(x)?;
            let change = max_change(x, &gx);
            Ok((gx, iter < maxiter && change > xtol))
        },
        x0,
    )
}

/// Wegstein counterpart of [`fixed_point`].
pub fn wegstein<E, F>(mut g: F, x0: Vec<Real>, xtol: Real, maxiter: usize) -> Result<Vec<Real>, E>
where
    F: FnMut(&[Real]) -> Result<Vec<Real>, E>,
{
    let mut iter = 0;
    conditional_wegstein(
        |x| {
            iter += 1;
            let gx = g(x)?;
            let change = max_change(x, &gx);
            Ok((gx, iter < maxiter && change > xtol))
        },
        x0,
    )
}

fn max_change(a: &[Real], b: &[Real]) -> Real {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, |m, e| if e.is_nan() { Real::INFINITY } else { m.max(e) })
}
