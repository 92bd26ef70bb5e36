//! Inside-out acceleration for vapor-liquid cascades.
//!
//! Each outer iteration fits cheap surrogates around the current state:
//! a reference K per stage (`Kb`) that is log-linear in `1/T`, relative
//! volatilities `alpha = K / Kb` held constant, and phase enthalpies linear
//! in `T`. The inner loop then converges phase ratios against the
//! surrogates using only the linear cascade solves.

use fs_core::accelerate::fixed_point;
use nalgebra::DMatrix;
use tracing::debug;

use crate::cascade::MultiStageEquilibrium;
use crate::energy::{StageEnthalpies, phase_ratio_departures};
use crate::error::CascadeResult;
use crate::mass::{bottoms_stripping_factors, mass_balance, top_flow_rates};

/// Inner-loop phase ratios are kept within these bounds.
const PHASE_RATIO_BOUNDS: (f64, f64) = (1e-12, 1e12);
const INNER_XTOL: f64 = 1e-6;
const INNER_MAXITER: usize = 50;

/// Composition-weighted reference K per stage, `exp(sum w ln K)`.
///
/// Rows of `weights` are normalized; a row without weight falls back to
/// equal weights.
pub fn reference_k(k: &DMatrix<f64>, weights: &DMatrix<f64>) -> Vec<f64> {
    let (n, m) = k.shape();
    (0..n)
        .map(|i| {
            let total = weights.row(i).sum();
            let ln_kb: f64 = (0..m)
                .map(|j| {
                    let w = if total > 0.0 {
                        weights[(i, j)] / total
                    } else {
                        1.0 / m as f64
                    };
                    w * k[(i, j)].ln()
                })
                .sum();
            ln_kb.exp()
        })
        .collect()
}

/// Per-stage fit `ln Kb = slope / T + intercept` from adjacent stages.
///
/// Needs at least three stages; `None` when temperatures do not separate
/// the stages.
pub fn fit_partition_model(t: &[f64], kb: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = t.len();
    if n < 3 {
        return None;
    }
    let x: Vec<f64> = t.iter().map(|t| 1.0 / t).collect();
    let y: Vec<f64> = kb.iter().map(|k| k.ln()).collect();
    let mut slope = vec![0.0; n];
    for i in 0..n - 1 {
        slope[i] = (y[i + 1] - y[i]) / (x[i + 1] - x[i]);
    }
    slope[n - 1] = slope[n - 2];
    slope[n - 2] = 0.5 * (slope[n - 3] + slope[n - 1]);
    if slope.iter().any(|m| !m.is_finite()) {
        return None;
    }
    let intercept = (0..n).map(|i| y[i] - slope[i] * x[i]).collect();
    Some((slope, intercept))
}

/// Least squares line `y = m x + b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub m: f64,
    pub b: f64,
}

impl LinearFit {
    pub fn fit(x: &[f64], y: &[f64]) -> Self {
        let n = x.len() as f64;
        let x_mean = x.iter().sum::<f64>() / n;
        let y_mean = y.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (xi, yi) in x.iter().zip(y) {
            sxy += (xi - x_mean) * (yi - y_mean);
            sxx += (xi - x_mean) * (xi - x_mean);
        }
        let m = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        Self {
            m,
            b: y_mean - m * x_mean,
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.m * x + self.b
    }
}

impl MultiStageEquilibrium {
    /// Converge phase ratios against surrogate models of the current state.
    /// Only K values and phase ratios are written back; stage temperatures
    /// stay with the rigorous bubble point and energy update. Skipped for fewer than three stages or indistinct temperatures.
    pub(crate) fn solve_inside_loop(&mut self) -> CascadeResult<()> {
        let n = self.n_stages();
        if n < 3 {
            return Ok(());
        }
        let na = self.routing.n_active();
        let k = self.k_matrix();
        let top = self.active_top();
        let bottom = self.active_bottom();
        let mut weights = DMatrix::from_fn(n, na, |i, j| top[(i, j)] / k[(i, j)]);
        for i in 0..n {
            if !(weights.row(i).sum() > 0.0) {
                weights.set_row(i, &bottom.row(i));
            }
        }
        let kb = reference_k(&k, &weights);
        let alpha = DMatrix::from_fn(n, na, |i, j| k[(i, j)] / kb[i]);
        let t_outer: Vec<f64> = self.stages.iter().map(|s| s.t).collect();
        let Some((slope, intercept)) = fit_partition_model(&t_outer, &kb) else {
            debug!(cascade = %self.name, "inside-out skipped: no temperature spread");
            return Ok(());
        };
        let enthalpies = self.stage_enthalpies()?;
        let hv_fit = LinearFit::fit(&t_outer, &enthalpies.hv);
        let hl_fit = LinearFit::fit(&t_outer, &enthalpies.hl);

        let feed = self.active_feed();
        let splits = self.splits.clone();
        let specified: Vec<bool> = self.stages.iter().map(|s| s.specified()).collect();
        let b_spec: Vec<Option<f64>> = self.stages.iter().map(|s| s.b_spec).collect();
        let t_spec: Vec<Option<f64>> = self.stages.iter().map(|s| s.t_spec).collect();
        let inert_l: Vec<f64> = (0..n).map(|i| self.bottom.row(i).sum() - bottom.row(i).sum()).collect();
        let inert_v: Vec<f64> = (0..n).map(|i| self.top.row(i).sum() - top.row(i).sum()).collect();
        let h_in = enthalpies.h_in;

        let mut k_inner = k;
        let b0: Vec<f64> = self.stages.iter().map(|s| s.phase_ratio()).collect();
        let inner = |b: &[f64]| -> CascadeResult<Vec<f64>> {
            let (s, safe) = bottoms_stripping_factors(b, &k_inner);
            let mut top = top_flow_rates(&s, &feed, &splits, safe);
            let bottom = mass_balance(&mut top, &feed, &splits, &mut vec![true; n]);
            let mut kb_new = kb.clone();
            for i in 0..n {
                let l = bottom.row(i).sum();
                let x: Vec<f64> = if l > 0.0 {
                    bottom.row(i).iter().map(|v| v / l).collect()
                } else {
                    let y_over_k: Vec<f64> = (0..na).map(|j| top[(i, j)] / k_inner[(i, j)]).collect();
                    let total: f64 = y_over_k.iter().sum();
                    if !(total > 0.0) {
                        continue;
                    }
                    y_over_k.iter().map(|v| v / total).collect()
                };
                let denominator: f64 = (0..na).map(|j| alpha[(i, j)] * x[j]).sum();
                if denominator > 0.0 {
                    kb_new[i] = 1.0 / denominator;
                }
            }
            k_inner = DMatrix::from_fn(n, na, |i, j| alpha[(i, j)] * kb_new[i]);
            let mut t_new: Vec<f64> = (0..n)
                .map(|i| {
                    let t = slope[i] / (kb_new[i].ln() - intercept[i]);
                    if t.is_finite() && t > 0.0 { t } else { t_outer[i] }
                })
                .collect();
            t_new.sort_by(f64::total_cmp);
            for (t, spec) in t_new.iter_mut().zip(&t_spec) {
                if let Some(spec) = spec {
                    *t = *spec;
                }
            }
            let stage_data = StageEnthalpies {
                l: (0..n).map(|i| bottom.row(i).sum() + inert_l[i]).collect(),
                v: (0..n).map(|i| top.row(i).sum() + inert_v[i]).collect(),
                hl: t_new.iter().map(|t| hl_fit.eval(*t)).collect(),
                hv: t_new.iter().map(|t| hv_fit.eval(*t)).collect(),
                h_in: h_in.clone(),
            };
            let db = phase_ratio_departures(&stage_data, &splits, &specified);
            Ok((0..n)
                .map(|i| match b_spec[i] {
                    Some(spec) => spec,
                    None if specified[i] => b[i],
                    None => {
                        let next = b[i] + db[i];
                        if next.is_nan() {
                            b[i]
                        } else {
                            next.clamp(PHASE_RATIO_BOUNDS.0, PHASE_RATIO_BOUNDS.1)
                        }
                    }
                })
                .collect())
        };
        let b = fixed_point(inner, b0, INNER_XTOL, INNER_MAXITER)?;

        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.k = k_inner.row(i).iter().copied().collect();
            if stage.b_spec.is_none() && !specified[i] {
                stage.b = b[i];
            }
        }
        Ok(())
    }
}
