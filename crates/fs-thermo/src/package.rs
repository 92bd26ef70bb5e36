//! Property-package trait and validation helpers.

use crate::chemicals::Chemicals;
use crate::error::{ThermoError, ThermoResult};
use crate::flash::{rachford_rice, solve_bracketed, split_flows};
use crate::stream::{Phase, PhasePair};

/// Result of a bubble-point calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct BubblePoint {
    /// Temperature [K]
    pub t: f64,
    /// Incipient vapor mole fractions.
    pub y: Vec<f64>,
    /// Partition coefficients at `t`.
    pub k: Vec<f64>,
}

/// Result of a dew-point calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct DewPoint {
    /// Temperature [K]
    pub t: f64,
    /// Incipient liquid mole fractions.
    pub x: Vec<f64>,
    /// Partition coefficients at `t`.
    pub k: Vec<f64>,
}

/// Specification closing an equilibrium calculation at fixed pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlashSpec {
    /// Fixed temperature [K].
    Temperature(f64),
    /// Fixed total enthalpy [kJ/hr].
    Enthalpy(f64),
    /// Fixed molar fraction of the feed leaving in the top phase.
    TopFraction(f64),
}

/// Two-phase split of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSplit {
    /// Temperature [K]
    pub t: f64,
    pub k: Vec<f64>,
    /// Molar fraction of the feed in the top phase.
    pub phi: f64,
    pub top: Vec<f64>,
    pub bottom: Vec<f64>,
}

/// Thermodynamic property model consumed by units and the cascade solver.
///
/// Flows are kmol/hr, temperatures K, pressures Pa, enthalpies kJ/hr.
/// Only `partition_coefficients` and `enthalpy` are required; equilibrium
/// calculations are provided on top of them and may be overridden by
/// backends with better algorithms.
pub trait PropertyPackage: Send + Sync {
    /// Get the package name (for logging).
    fn name(&self) -> &str;

    fn chemicals(&self) -> &Chemicals;

    /// Top-phase over bottom-phase mole-fraction ratios at fixed T and P.
    ///
    /// `x` is the bottom-phase and `y` the top-phase composition estimate.
    fn partition_coefficients(
        &self,
        pair: PhasePair,
        x: &[f64],
        y: &[f64],
        t: f64,
        p: f64,
    ) -> ThermoResult<Vec<f64>>;

    /// Total enthalpy [kJ/hr] of `mol` in `phase`.
    fn enthalpy(&self, mol: &[f64], phase: Phase, t: f64, p: f64) -> ThermoResult<f64>;

    /// Total heat capacity [kJ/hr/K]; defaults to a central difference.
    fn heat_capacity(&self, mol: &[f64], phase: Phase, t: f64, p: f64) -> ThermoResult<f64> {
        let dt = 1e-2;
        let hi = self.enthalpy(mol, phase, t + dt, p)?;
        let lo = self.enthalpy(mol, phase, t - dt, p)?;
        Ok((hi - lo) / (2.0 * dt))
    }

    /// Temperature bracket [K] used by the default root searches.
    fn temperature_range(&self) -> (f64, f64) {
        (50.0, 1500.0)
    }

    fn bubble_point(&self, x: &[f64], p: f64) -> ThermoResult<BubblePoint> {
        validation::validate_pressure(p)?;
        let x = validation::normalized(x)?;
        let (lo, hi) = self.temperature_range();
        let t = solve_bracketed(
            |t| {
                let k = self.partition_coefficients(PhasePair::Vle, &x, &x, t, p)?;
                let s: f64 = k.iter().zip(&x).map(|(ki, xi)| ki * xi).sum();
                Ok(s.max(1e-300).ln())
            },
            lo,
            hi,
            1e-9,
            "bubble point",
        )?;
        let k = self.partition_coefficients(PhasePair::Vle, &x, &x, t, p)?;
        let y = validation::normalized(&k.iter().zip(&x).map(|(a, b)| a * b).collect::<Vec<_>>())?;
        Ok(BubblePoint { t, y, k })
    }

    fn dew_point(&self, y: &[f64], p: f64) -> ThermoResult<DewPoint> {
        validation::validate_pressure(p)?;
        let y = validation::normalized(y)?;
        let (lo, hi) = self.temperature_range();
        let t = solve_bracketed(
            |t| {
                let k = self.partition_coefficients(PhasePair::Vle, &y, &y, t, p)?;
                let s: f64 = k.iter().zip(&y).map(|(ki, yi)| yi / ki).sum();
                Ok(-(s.max(1e-300).ln()))
            },
            lo,
            hi,
            1e-9,
            "dew point",
        )?;
        let k = self.partition_coefficients(PhasePair::Vle, &y, &y, t, p)?;
        let x = validation::normalized(&k.iter().zip(&y).map(|(a, b)| b / a).collect::<Vec<_>>())?;
        Ok(DewPoint { t, x, k })
    }

    /// Split `z` at fixed temperature by successive substitution on the
    /// phase compositions.
    fn split_at_temperature(
        &self,
        pair: PhasePair,
        z: &[f64],
        t: f64,
        p: f64,
    ) -> ThermoResult<PhaseSplit> {
        validation::validate_temperature(t)?;
        let mut x = validation::normalized(z)?;
        let mut y = x.clone();
        let mut split = PhaseSplit {
            t,
            k: Vec::new(),
            phi: 0.0,
            top: Vec::new(),
            bottom: Vec::new(),
        };
        for _ in 0..50 {
            let k = self.partition_coefficients(pair, &x, &y, t, p)?;
            let phi = rachford_rice(z, &k)?;
            let (top, bottom) = split_flows(z, &k, phi);
            let x_new = if phi >= 1.0 {
                validation::normalized(&top.iter().zip(&k).map(|(a, b)| a / b).collect::<Vec<_>>())?
            } else {
                validation::normalized(&bottom)?
            };
            let y_new = if phi <= 0.0 {
                validation::normalized(&bottom.iter().zip(&k).map(|(a, b)| a * b).collect::<Vec<_>>())?
            } else {
                validation::normalized(&top)?
            };
            let change = x_new
                .iter()
                .zip(&x)
                .chain(y_new.iter().zip(&y))
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            x = x_new;
            y = y_new;
            split = PhaseSplit {
                t,
                k,
                phi,
                top,
                bottom,
            };
            if change < 1e-10 {
                break;
            }
        }
        Ok(split)
    }

    /// Equilibrium split of `z` at pressure `p` closed by `spec`.
    fn equilibrium(
        &self,
        pair: PhasePair,
        z: &[f64],
        p: f64,
        spec: FlashSpec,
    ) -> ThermoResult<PhaseSplit> {
        match (pair, spec) {
            (_, FlashSpec::Temperature(t)) => self.split_at_temperature(pair, z, t, p),
            (PhasePair::Vle, FlashSpec::TopFraction(v)) => {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ThermoError::InvalidArg {
                        what: "top fraction must lie in [0, 1]",
                    });
                }
                let tb = self.bubble_point(z, p)?.t;
                let td = self.dew_point(z, p)?.t;
                let t = if v <= 0.0 {
                    tb
                } else if v >= 1.0 {
                    td
                } else {
                    solve_bracketed(
                        |t| Ok(self.split_at_temperature(pair, z, t, p)?.phi - v),
                        tb,
                        td,
                        1e-9,
                        "vapor fraction flash",
                    )?
                };
                self.split_at_temperature(pair, z, t, p)
            }
            (PhasePair::Vle, FlashSpec::Enthalpy(h)) => {
                let tb = self.bubble_point(z, p)?.t;
                let td = self.dew_point(z, p)?.t;
                let hl = self.enthalpy(z, Phase::Liquid, tb, p)?;
                let hv = self.enthalpy(z, Phase::Gas, td, p)?;
                if h <= hl {
                    let t = self.temperature_from_enthalpy(z, Phase::Liquid, p, h, tb)?;
                    return Ok(single_phase(z, t, false));
                }
                if h >= hv {
                    let t = self.temperature_from_enthalpy(z, Phase::Gas, p, h, td)?;
                    return Ok(single_phase(z, t, true));
                }
                let t = solve_bracketed(
                    |t| {
                        let s = self.split_at_temperature(pair, z, t, p)?;
                        Ok(self.enthalpy(&s.top, Phase::Gas, t, p)?
                            + self.enthalpy(&s.bottom, Phase::Liquid, t, p)?
                            - h)
                    },
                    tb,
                    td,
                    1e-9,
                    "enthalpy flash",
                )?;
                self.split_at_temperature(pair, z, t, p)
            }
            (PhasePair::Lle, FlashSpec::Enthalpy(h)) => {
                let t0 = self.temperature_range().0.max(298.15);
                let t = self.temperature_from_enthalpy(z, Phase::Liquid, p, h, t0)?;
                self.split_at_temperature(pair, z, t, p)
            }
            (PhasePair::Lle, FlashSpec::TopFraction(_)) => Err(ThermoError::NotSupported {
                package: self.name().to_string(),
                what: "liquid-liquid split at fixed extract fraction",
            }),
        }
    }

    /// Temperature at which `mol` in `phase` has enthalpy `h`.
    fn temperature_from_enthalpy(
        &self,
        mol: &[f64],
        phase: Phase,
        p: f64,
        h: f64,
        t_guess: f64,
    ) -> ThermoResult<f64> {
        let mut t = t_guess;
        for _ in 0..50 {
            let cp = self.heat_capacity(mol, phase, t, p)?;
            validation::validate_heat_capacity(cp)?;
            let dt = (h - self.enthalpy(mol, phase, t, p)?) / cp;
            t += dt;
            if dt.abs() < 1e-8 {
                validation::validate_temperature(t)?;
                return Ok(t);
            }
        }
        Err(ThermoError::ConvergenceFailed {
            what: "temperature from enthalpy",
        })
    }
}

fn single_phase(z: &[f64], t: f64, top: bool) -> PhaseSplit {
    let zeros = vec![0.0; z.len()];
    let (top_flows, bottom_flows, phi) = if top {
        (z.to_vec(), zeros, 1.0)
    } else {
        (zeros, z.to_vec(), 0.0)
    };
    PhaseSplit {
        t,
        k: Vec::new(),
        phi,
        top: top_flows,
        bottom: bottom_flows,
    }
}

/// Validation helpers for property inputs.
pub(crate) mod validation {
    use super::*;

    pub fn validate_pressure(p: f64) -> ThermoResult<()> {
        if !p.is_finite() || p <= 0.0 {
            return Err(ThermoError::NonPhysical {
                what: "pressure must be positive and finite",
            });
        }
        Ok(())
    }

    pub fn validate_temperature(t: f64) -> ThermoResult<()> {
        if !t.is_finite() || t <= 0.0 {
            return Err(ThermoError::NonPhysical {
                what: "temperature must be positive and finite",
            });
        }
        Ok(())
    }

    pub fn validate_heat_capacity(cp: f64) -> ThermoResult<()> {
        if !cp.is_finite() || cp <= 0.0 {
            return Err(ThermoError::NonPhysical {
                what: "heat capacity must be positive and finite",
            });
        }
        Ok(())
    }

    /// Scale non-negative amounts to fractions.
    pub fn normalized(v: &[f64]) -> ThermoResult<Vec<f64>> {
        let total: f64 = v.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(ThermoError::InvalidArg {
                what: "composition must have a positive finite total",
            });
        }
        Ok(v.iter().map(|x| x / total).collect())
    }
}
