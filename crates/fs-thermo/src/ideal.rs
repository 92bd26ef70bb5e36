//! Ideal-solution property package (Raoult's law, constant heat capacity).

use fs_core::units::constants::{P_ATM_PA, R_KJ_KMOL_K, T_REF_K};

use crate::chemicals::Chemicals;
use crate::error::{ThermoError, ThermoResult};
use crate::package::PropertyPackage;
use crate::stream::{Phase, PhasePair};

/// Vapor pressure correlation `ln(Psat / Pa) = a - b / (T + c)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Antoine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Antoine {
    /// Clausius-Clapeyron fit through the normal boiling point `tb` [K]
    /// with heat of vaporization `hvap` [kJ/kmol].
    pub fn from_boiling_point(tb: f64, hvap: f64) -> Self {
        let b = hvap / R_KJ_KMOL_K;
        Self {
            a: P_ATM_PA.ln() + b / tb,
            b,
            c: 0.0,
        }
    }

    /// Vapor pressure [Pa].
    pub fn psat(&self, t: f64) -> f64 {
        (self.a - self.b / (t + self.c)).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealComponent {
    pub antoine: Antoine,
    /// Liquid heat capacity [kJ/kmol/K]; the vapor uses the same value.
    pub cp: f64,
    /// Heat of vaporization [kJ/kmol].
    pub hvap: f64,
}

/// Raoult's-law vapor-liquid equilibrium with linear enthalpies.
///
/// Liquid-liquid partitioning is only available when fixed coefficients
/// are supplied with [`IdealPackage::with_lle_coefficients`].
#[derive(Debug, Clone)]
pub struct IdealPackage {
    chemicals: Chemicals,
    components: Vec<IdealComponent>,
    lle_k: Option<Vec<f64>>,
}

/// Default liquid heat capacity [kJ/kmol/K].
const DEFAULT_CP: f64 = 200.0;

impl IdealPackage {
    pub fn new(chemicals: Chemicals, components: Vec<IdealComponent>) -> ThermoResult<Self> {
        if components.len() != chemicals.len() {
            return Err(ThermoError::ComponentCount {
                expected: chemicals.len(),
                got: components.len(),
            });
        }
        for c in &components {
            if !(c.cp > 0.0) || !c.hvap.is_finite() || c.hvap < 0.0 {
                return Err(ThermoError::NonPhysical {
                    what: "component heat capacity and heat of vaporization",
                });
            }
        }
        Ok(Self {
            chemicals,
            components,
            lle_k: None,
        })
    }

    /// Build from `(boiling point [K], heat of vaporization [kJ/kmol])` pairs.
    pub fn from_boiling_points(chemicals: Chemicals, data: &[(f64, f64)]) -> ThermoResult<Self> {
        let components = data
            .iter()
            .map(|&(tb, hvap)| IdealComponent {
                antoine: Antoine::from_boiling_point(tb, hvap),
                cp: DEFAULT_CP,
                hvap,
            })
            .collect();
        Self::new(chemicals, components)
    }

    pub fn with_heat_capacities(mut self, cp: &[f64]) -> ThermoResult<Self> {
        if cp.len() != self.components.len() {
            return Err(ThermoError::ComponentCount {
                expected: self.components.len(),
                got: cp.len(),
            });
        }
        for (c, v) in self.components.iter_mut().zip(cp) {
            c.cp = *v;
        }
        Ok(self)
    }

    /// Constant extract/raffinate partition coefficients.
    pub fn with_lle_coefficients(mut self, k: Vec<f64>) -> ThermoResult<Self> {
        if k.len() != self.components.len() {
            return Err(ThermoError::ComponentCount {
                expected: self.components.len(),
                got: k.len(),
            });
        }
        self.lle_k = Some(k);
        Ok(self)
    }

    fn check_len(&self, v: &[f64]) -> ThermoResult<()> {
        if v.len() != self.components.len() {
            return Err(ThermoError::ComponentCount {
                expected: self.components.len(),
                got: v.len(),
            });
        }
        Ok(())
    }
}

impl PropertyPackage for IdealPackage {
    fn name(&self) -> &str {
        "ideal"
    }

    fn chemicals(&self) -> &Chemicals {
        &self.chemicals
    }

    fn partition_coefficients(
        &self,
        pair: PhasePair,
        x: &[f64],
        _y: &[f64],
        t: f64,
        p: f64,
    ) -> ThermoResult<Vec<f64>> {
        self.check_len(x)?;
        match pair {
            PhasePair::Vle => Ok(self.components.iter().map(|c| c.antoine.psat(t) / p).collect()),
            PhasePair::Lle => self.lle_k.clone().ok_or_else(|| ThermoError::NotSupported {
                package: self.name().to_string(),
                what: "liquid-liquid partition coefficients",
            }),
        }
    }

    fn enthalpy(&self, mol: &[f64], phase: Phase, t: f64, _p: f64) -> ThermoResult<f64> {
        self.check_len(mol)?;
        Ok(mol
            .iter()
            .zip(&self.components)
            .map(|(n, c)| {
                let latent = if phase == Phase::Gas { c.hvap } else { 0.0 };
                n * (c.cp * (t - T_REF_K) + latent)
            })
            .sum())
    }

    fn heat_capacity(&self, mol: &[f64], _phase: Phase, _t: f64, _p: f64) -> ThermoResult<f64> {
        self.check_len(mol)?;
        Ok(mol.iter().zip(&self.components).map(|(n, c)| n * c.cp).sum())
    }
}
