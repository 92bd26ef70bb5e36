//! Equilibrium state of a single stage: partition coefficients, phase
//! ratio and temperature, and the thermodynamic updates that refresh them.

use fs_thermo::{
    Chemicals, FlashSpec, PhasePair, PropertyPackage, Volatility, phase_ratio_from_fraction,
    rachford_rice,
};

use crate::error::CascadeResult;
use crate::specification::StageSpecification;

/// Which chemicals take part in phase equilibrium.
///
/// Light chemicals always leave with the top phase and heavy chemicals with
/// the bottom phase; partition coefficients are only kept for `active` ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChemicalRouting {
    pub active: Vec<usize>,
    pub light: Vec<usize>,
    pub heavy: Vec<usize>,
    n_chemicals: usize,
}

impl ChemicalRouting {
    pub fn from_chemicals(chemicals: &Chemicals) -> Self {
        Self {
            active: chemicals.indices(Volatility::Volatile),
            light: chemicals.indices(Volatility::Light),
            heavy: chemicals.indices(Volatility::Heavy),
            n_chemicals: chemicals.len(),
        }
    }

    /// Every chemical partitions (externally supplied coefficients).
    pub fn all_active(n_chemicals: usize) -> Self {
        Self {
            active: (0..n_chemicals).collect(),
            light: Vec::new(),
            heavy: Vec::new(),
            n_chemicals,
        }
    }

    pub fn n_chemicals(&self) -> usize {
        self.n_chemicals
    }

    pub fn n_active(&self) -> usize {
        self.active.len()
    }

    /// Active entries of a full-length vector.
    pub fn select(&self, mol: &[f64]) -> Vec<f64> {
        self.active.iter().map(|j| mol[*j]).collect()
    }

    /// Full-length copy of `mol` with inactive entries zeroed.
    pub fn active_only(&self, mol: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; mol.len()];
        for j in &self.active {
            out[*j] = mol[*j];
        }
        out
    }

    /// Move light chemicals to the top and heavy chemicals to the bottom.
    pub fn route_inerts(&self, top: &mut [f64], bottom: &mut [f64]) {
        for j in &self.light {
            top[*j] += bottom[*j];
            bottom[*j] = 0.0;
        }
        for j in &self.heavy {
            bottom[*j] += top[*j];
            top[*j] = 0.0;
        }
    }
}

/// Scale to fractions; `None` when there is nothing to scale.
pub(crate) fn fractions(v: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = v.iter().sum();
    if total > 0.0 && total.is_finite() {
        Some(v.iter().map(|x| x / total).collect())
    } else {
        None
    }
}

/// Fraction of the feed leaving in the top phase for phase ratio `b`.
fn top_fraction(b: f64) -> f64 {
    if b.is_infinite() { 1.0 } else { b / (1.0 + b) }
}

/// Equilibrium data of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePartition {
    pub phases: PhasePair,
    /// Pressure [Pa].
    pub p: f64,
    /// Partition coefficients of the active chemicals; empty until evaluated.
    pub k: Vec<f64>,
    /// Top over bottom molar flow.
    pub b: f64,
    /// Temperature [K].
    pub t: f64,
    /// Heat added to the stage [kJ/hr].
    pub duty: f64,
    pub b_spec: Option<f64>,
    pub t_spec: Option<f64>,
    /// Coefficients that replace the property package.
    pub fixed_k: Option<Vec<f64>>,
}

impl PhasePartition {
    pub fn new(phases: PhasePair, p: f64, t: f64) -> Self {
        Self {
            phases,
            p,
            k: Vec::new(),
            b: 1.0,
            t,
            duty: 0.0,
            b_spec: None,
            t_spec: None,
            fixed_k: None,
        }
    }

    pub fn with_specification(mut self, spec: Option<StageSpecification>) -> Self {
        let Some(spec) = spec else {
            return self;
        };
        self.duty = spec.duty();
        self.b_spec = spec.phase_ratio();
        self.t_spec = spec.temperature();
        if let Some(b) = self.b_spec {
            self.b = b;
        }
        if let Some(t) = self.t_spec {
            self.t = t;
        }
        self
    }

    pub fn with_fixed_k(mut self, k: Vec<f64>) -> Self {
        self.k = k.clone();
        self.fixed_k = Some(k);
        self
    }

    /// Phase ratio or temperature is held by a specification.
    pub fn specified(&self) -> bool {
        self.b_spec.is_some() || self.t_spec.is_some()
    }

    pub fn phase_ratio(&self) -> f64 {
        self.b_spec.unwrap_or(self.b)
    }

    /// Refresh K and T from the stage's current outlet compositions.
    ///
    /// Uses the bubble point of the bottoms, or the dew point of the top
    /// phase when the bottoms are empty. A temperature-specified stage is
    /// evaluated at its temperature and its phase ratio follows from the
    /// split. Returns false (and clears K) for an empty stage.
    pub fn update_vle_kt(
        &mut self,
        thermo: &dyn PropertyPackage,
        routing: &ChemicalRouting,
        top: &[f64],
        bottom: &[f64],
    ) -> CascadeResult<bool> {
        let x = routing.active_only(bottom);
        let y = routing.active_only(top);
        if let Some(t) = self.t_spec {
            let z: Vec<f64> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
            let Some(zf) = fractions(&z) else {
                self.k.clear();
                return Ok(false);
            };
            let xf = fractions(&x).unwrap_or_else(|| zf.clone());
            let yf = fractions(&y).unwrap_or_else(|| zf.clone());
            let k = thermo.partition_coefficients(PhasePair::Vle, &xf, &yf, t, self.p)?;
            self.k = routing.select(&k);
            self.t = t;
            let phi = rachford_rice(&routing.select(&z), &self.k)?;
            self.b = phase_ratio_from_fraction(phi);
            return Ok(true);
        }
        if x.iter().sum::<f64>() > 0.0 {
            let bp = thermo.bubble_point(&x, self.p)?;
            self.t = bp.t;
            self.k = routing.select(&bp.k);
        } else if y.iter().sum::<f64>() > 0.0 {
            let dp = thermo.dew_point(&y, self.p)?;
            self.t = dp.t;
            self.k = routing.select(&dp.k);
        } else {
            self.k.clear();
            return Ok(false);
        }
        Ok(true)
    }

    /// Refresh liquid-liquid K at the current temperature.
    pub fn update_lle_k(
        &mut self,
        thermo: &dyn PropertyPackage,
        routing: &ChemicalRouting,
        top: &[f64],
        bottom: &[f64],
    ) -> CascadeResult<bool> {
        let x = routing.active_only(bottom);
        let y = routing.active_only(top);
        let z: Vec<f64> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
        let Some(zf) = fractions(&z) else {
            self.k.clear();
            return Ok(false);
        };
        let xf = fractions(&x).unwrap_or_else(|| zf.clone());
        let yf = fractions(&y).unwrap_or(zf);
        let k = thermo.partition_coefficients(PhasePair::Lle, &xf, &yf, self.t, self.p)?;
        self.k = routing.select(&k);
        Ok(true)
    }

    /// Phase ratio from a Rachford-Rice split of the stage's outlets at the
    /// current K. Specified and empty stages are left unchanged.
    pub fn update_b(
        &mut self,
        routing: &ChemicalRouting,
        top: &[f64],
        bottom: &[f64],
    ) -> CascadeResult<()> {
        if let Some(b) = self.b_spec {
            self.b = b;
            return Ok(());
        }
        let z: Vec<f64> = routing
            .active
            .iter()
            .map(|j| top[*j] + bottom[*j])
            .collect();
        if self.k.is_empty() || z.iter().sum::<f64>() <= 0.0 {
            return Ok(());
        }
        self.b = phase_ratio_from_fraction(rachford_rice(&z, &self.k)?);
        Ok(())
    }

    /// Molar enthalpies [kJ/kmol] of the bottom and top phases at the stage
    /// temperature; an empty phase takes the composition of the other one.
    pub fn molar_enthalpies(
        &self,
        thermo: &dyn PropertyPackage,
        top: &[f64],
        bottom: &[f64],
    ) -> CascadeResult<(Option<f64>, Option<f64>)> {
        let l: f64 = bottom.iter().sum();
        let v: f64 = top.iter().sum();
        let molar = |mol: &[f64], total: f64, phase| -> CascadeResult<f64> {
            Ok(thermo.enthalpy(mol, phase, self.t, self.p)? / total)
        };
        let (bottom_phase, top_phase) = (self.phases.bottom(), self.phases.top());
        let hl = if l > 0.0 {
            Some(molar(bottom, l, bottom_phase)?)
        } else if v > 0.0 {
            Some(molar(top, v, bottom_phase)?)
        } else {
            None
        };
        let hv = if v > 0.0 {
            Some(molar(top, v, top_phase)?)
        } else if l > 0.0 {
            Some(molar(bottom, l, top_phase)?)
        } else {
            None
        };
        Ok((hl, hv))
    }

    /// Split `feed` (all chemicals) into top and bottom flows at equilibrium.
    ///
    /// The closing condition is the stage's specification, or the total
    /// enthalpy `h_in + duty` when neither B nor T is fixed. Updates K, B
    /// and T of the stage.
    pub fn equilibrium(
        &mut self,
        thermo: &dyn PropertyPackage,
        routing: &ChemicalRouting,
        feed: &[f64],
        h_in: f64,
    ) -> CascadeResult<(Vec<f64>, Vec<f64>)> {
        let z = routing.select(feed);
        let (mut top, mut bottom) = if z.iter().sum::<f64>() <= 0.0 {
            (vec![0.0; feed.len()], feed.to_vec())
        } else if let Some(k) = self.fixed_k.clone() {
            self.k = k;
            if let Some(t) = self.t_spec {
                self.t = t;
            }
            let mut top = vec![0.0; feed.len()];
            let mut bottom = vec![0.0; feed.len()];
            let top_active = self.split_fixed_k(&z)?;
            for (n, j) in routing.active.iter().enumerate() {
                top[*j] = top_active[n];
                bottom[*j] = (z[n] - top_active[n]).max(0.0);
            }
            (top, bottom)
        } else {
            self.split_with_thermo(thermo, routing, feed, h_in)?
        };
        routing.route_inerts(&mut top, &mut bottom);
        if self.b_spec.is_none() {
            let l: f64 = bottom.iter().sum();
            let v: f64 = top.iter().sum();
            self.b = if l > 0.0 { v / l } else { f64::INFINITY };
        }
        Ok((top, bottom))
    }

    fn split_fixed_k(&self, z: &[f64]) -> CascadeResult<Vec<f64>> {
        match self.b_spec {
            Some(b) if b.is_infinite() => Ok(z.to_vec()),
            Some(b) => Ok(z
                .iter()
                .zip(&self.k)
                .map(|(zi, k)| zi * b * k / (1.0 + b * k))
                .collect()),
            None => {
                let phi = rachford_rice(z, &self.k)?;
                Ok(fs_thermo::split_flows(z, &self.k, phi).0)
            }
        }
    }

    fn split_with_thermo(
        &mut self,
        thermo: &dyn PropertyPackage,
        routing: &ChemicalRouting,
        feed: &[f64],
        h_in: f64,
    ) -> CascadeResult<(Vec<f64>, Vec<f64>)> {
        let spec = match (self.t_spec, self.b_spec, self.phases) {
            (Some(t), _, _) => FlashSpec::Temperature(t),
            (None, Some(b), PhasePair::Vle) => FlashSpec::TopFraction(top_fraction(b)),
            _ => FlashSpec::Enthalpy(h_in + self.duty),
        };
        let split = thermo.equilibrium(self.phases, feed, self.p, spec)?;
        self.t = split.t;
        let k = if split.k.is_empty() {
            let zf = fractions(feed).unwrap_or_else(|| feed.to_vec());
            let x = fractions(&split.bottom).unwrap_or_else(|| zf.clone());
            let y = fractions(&split.top).unwrap_or(zf);
            thermo.partition_coefficients(self.phases, &x, &y, split.t, self.p)?
        } else {
            split.k
        };
        self.k = routing.select(&k);
        Ok((split.top, split.bottom))
    }
}
