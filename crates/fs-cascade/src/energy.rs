//! Stage enthalpy balances linearized in the phase ratio or temperature.

use crate::mass::StageSplits;
use crate::tridiagonal::{solve_rbdma_careful, solve_tdma};

/// Largest temperature correction [K] applied per iterate.
pub const MAX_TEMPERATURE_STEP: f64 = 15.0;

/// Per-stage enthalpy data for the departure equations.
///
/// `l`/`v` are bottom/top molar flows [kmol/hr], `hl`/`hv` molar enthalpies
/// [kJ/kmol] of the bottom/top phase and `h_in` the enthalpy entering each
/// stage from outside the cascade (feeds plus duty) [kJ/hr].
#[derive(Debug, Clone, Default)]
pub struct StageEnthalpies {
    pub l: Vec<f64>,
    pub v: Vec<f64>,
    pub hl: Vec<f64>,
    pub hv: Vec<f64>,
    pub h_in: Vec<f64>,
}

impl StageEnthalpies {
    /// Balances written on total enthalpies [kJ/hr] of each outlet.
    pub fn from_totals(hl: Vec<f64>, hv: Vec<f64>, h_in: Vec<f64>) -> Self {
        let n = hl.len();
        Self {
            l: vec![1.0; n],
            v: vec![1.0; n],
            hl,
            hv,
            h_in,
        }
    }

    /// Energy balance residual of every stage, `in - out` [kJ/hr].
    pub fn residuals(&self, splits: &StageSplits) -> Vec<f64> {
        let n = self.l.len();
        let hl_out: Vec<f64> = self.hl.iter().zip(&self.l).map(|(h, l)| h * l).collect();
        let hv_out: Vec<f64> = self.hv.iter().zip(&self.v).map(|(h, v)| h * v).collect();
        (0..n)
            .map(|i| {
                let mut d = self.h_in[i] - hl_out[i] - hv_out[i];
                if i > 0 {
                    d += hl_out[i - 1] * splits.bsplit_left[i - 1];
                }
                if i + 1 < n {
                    d += hv_out[i + 1] * splits.asplit_left[i + 1];
                }
                d
            })
            .collect()
    }
}

/// Corrections to each stage's phase ratio that close the energy balances
/// with bottom flows held fixed.
///
/// Row `i`: `hv_i L_i dB_i - asplit_left[i+1] hv_{i+1} L_{i+1} dB_{i+1} = residual_i`.
/// Stages flagged in `specified` keep their phase ratio; their rows and the
/// couplings into them are zeroed so they receive a zero correction.
pub fn phase_ratio_departures(
    stages: &StageEnthalpies,
    splits: &StageSplits,
    specified: &[bool],
) -> Vec<f64> {
    let n = stages.l.len();
    let mut b: Vec<f64> = stages.hv.iter().zip(&stages.l).map(|(h, l)| h * l).collect();
    let mut c: Vec<f64> = (1..n).map(|i| b[i] * splits.asplit_1[i]).collect();
    let mut d = stages.residuals(splits);
    for (j, _) in specified.iter().enumerate().filter(|(_, s)| **s) {
        b[j] = 0.0;
        d[j] = 0.0;
        if j > 0 {
            c[j - 1] = 0.0;
        }
        if j + 1 < n {
            c[j] = 0.0;
        }
    }
    solve_rbdma_careful(&b, &c, &d)
}

/// Temperature corrections that close the energy balances at fixed flows,
/// clamped to [`MAX_TEMPERATURE_STEP`].
///
/// `cv`/`cl` are total heat capacities [kJ/hr/K] of the top/bottom
/// outlets. Stages flagged in `specified` hold their temperature.
pub fn temperature_departures(
    cv: &[f64],
    cl: &[f64],
    stages: &StageEnthalpies,
    splits: &StageSplits,
    specified: &[bool],
) -> Vec<f64> {
    let n = cv.len();
    let mut b: Vec<f64> = cv.iter().zip(cl).map(|(v, l)| v + l).collect();
    let mut a: Vec<f64> = (0..n.saturating_sub(1))
        .map(|i| -cl[i] * splits.bsplit_left[i])
        .collect();
    let mut c: Vec<f64> = (1..n).map(|i| -cv[i] * splits.asplit_left[i]).collect();
    let mut d = stages.residuals(splits);
    for (j, _) in specified.iter().enumerate().filter(|(_, s)| **s) {
        b[j] = 1.0;
        d[j] = 0.0;
        if j > 0 {
            a[j - 1] = 0.0;
        }
        if j + 1 < n {
            c[j] = 0.0;
        }
    }
    solve_tdma(&a, &b, &c, &d)
        .into_iter()
        .map(|dt| {
            if dt.is_nan() {
                0.0
            } else {
                dt.clamp(-MAX_TEMPERATURE_STEP, MAX_TEMPERATURE_STEP)
            }
        })
        .collect()
}
