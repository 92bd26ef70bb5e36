//! Phase-split arithmetic shared by the property packages.

use crate::error::{ThermoError, ThermoResult};

/// K-values above this are treated as infinite when splitting.
const K_MAX: f64 = 1e16;

/// Fraction of `z` leaving in the top phase for partition coefficients `k`.
///
/// Returns 0 when the feed cannot form a top phase and 1 when it cannot
/// form a bottom phase. `z` may be flows or fractions.
pub fn rachford_rice(z: &[f64], k: &[f64]) -> ThermoResult<f64> {
    if z.len() != k.len() {
        return Err(ThermoError::ComponentCount {
            expected: z.len(),
            got: k.len(),
        });
    }
    let total: f64 = z.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(ThermoError::InvalidArg {
            what: "rachford-rice feed must have positive total flow",
        });
    }
    let residual = |phi: f64| -> f64 {
        z.iter()
            .zip(k)
            .map(|(zi, ki)| {
                let km1 = ki.min(K_MAX) - 1.0;
                zi * km1 / (1.0 + phi * km1)
            })
            .sum::<f64>()
            / total
    };
    if residual(0.0) <= 0.0 {
        return Ok(0.0);
    }
    if residual(1.0) >= 0.0 {
        return Ok(1.0);
    }
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if residual(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-14 {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// Phase ratio B = phi / (1 - phi); infinite when everything goes up.
pub fn phase_ratio_from_fraction(phi: f64) -> f64 {
    if phi >= 1.0 { f64::INFINITY } else { phi / (1.0 - phi) }
}

/// Split flows `z` into (top, bottom) for a top-phase fraction `phi`.
pub fn split_flows(z: &[f64], k: &[f64], phi: f64) -> (Vec<f64>, Vec<f64>) {
    let mut top = Vec::with_capacity(z.len());
    let mut bottom = Vec::with_capacity(z.len());
    for (zi, ki) in z.iter().zip(k) {
        let t = if phi >= 1.0 {
            *zi
        } else if phi <= 0.0 {
            0.0
        } else {
            let ki = ki.min(K_MAX);
            zi * phi * ki / (1.0 - phi + phi * ki)
        };
        top.push(t);
        bottom.push((zi - t).max(0.0));
    }
    (top, bottom)
}

/// Root of `f` on `[lo, hi]` by Illinois false position.
pub(crate) fn solve_bracketed<F>(
    mut f: F,
    mut lo: f64,
    mut hi: f64,
    xtol: f64,
    what: &'static str,
) -> ThermoResult<f64>
where
    F: FnMut(f64) -> ThermoResult<f64>,
{
    let mut flo = f(lo)?;
    let mut fhi = f(hi)?;
    if flo == 0.0 {
        return Ok(lo);
    }
    if fhi == 0.0 {
        return Ok(hi);
    }
    if flo.signum() == fhi.signum() {
        return Err(ThermoError::ConvergenceFailed { what });
    }
    let mut side = 0;
    for _ in 0..200 {
        let x = (lo * fhi - hi * flo) / (fhi - flo);
        let fx = f(x)?;
        if fx == 0.0 || (hi - lo).abs() < xtol {
            return Ok(x);
        }
        if fx.signum() == fhi.signum() {
            hi = x;
            fhi = fx;
            if side == -1 {
                flo *= 0.5;
            }
            side = -1;
        } else {
            lo = x;
            flo = fx;
            if side == 1 {
                fhi *= 0.5;
            }
            side = 1;
        }
        if (hi - lo).abs() < xtol {
            return Ok(0.5 * (lo + hi));
        }
    }
    Err(ThermoError::ConvergenceFailed { what })
}
