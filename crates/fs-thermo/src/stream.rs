//! Material stream state.

use fs_core::units::{Pressure, Temperature, constants, k, pa};

/// Phase tag of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Phase {
    Gas,
    #[default]
    Liquid,
    /// Second liquid phase (extract).
    LiquidL,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Gas => "g",
            Phase::Liquid => "l",
            Phase::LiquidL => "L",
        }
    }
}

/// Top/bottom phase pair of an equilibrium stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PhasePair {
    /// Vapor over liquid.
    #[default]
    Vle,
    /// Extract over raffinate.
    Lle,
}

impl PhasePair {
    pub fn top(&self) -> Phase {
        match self {
            PhasePair::Vle => Phase::Gas,
            PhasePair::Lle => Phase::LiquidL,
        }
    }

    pub fn bottom(&self) -> Phase {
        Phase::Liquid
    }
}

/// Component molar flows [kmol/hr] with temperature [K], pressure [Pa] and phase.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamState {
    pub name: String,
    pub mol: Vec<f64>,
    pub t: f64,
    pub p: f64,
    pub phase: Phase,
}

impl StreamState {
    /// Empty liquid stream at 298.15 K and 1 atm.
    pub fn new(name: impl Into<String>, n_components: usize) -> Self {
        Self {
            name: name.into(),
            mol: vec![0.0; n_components],
            t: constants::T_REF_K,
            p: constants::P_ATM_PA,
            phase: Phase::Liquid,
        }
    }

    pub fn with_flows(mut self, mol: Vec<f64>) -> Self {
        self.mol = mol;
        self
    }

    pub fn with_conditions(mut self, t: f64, p: f64) -> Self {
        self.t = t;
        self.p = p;
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn total_flow(&self) -> f64 {
        self.mol.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.mol.iter().all(|m| *m == 0.0)
    }

    pub fn empty(&mut self) {
        self.mol.iter_mut().for_each(|m| *m = 0.0);
    }

    pub fn temperature(&self) -> Temperature {
        k(self.t)
    }

    pub fn pressure(&self) -> Pressure {
        pa(self.p)
    }

    /// Mole fractions; all zeros for an empty stream.
    pub fn composition(&self) -> Vec<f64> {
        let total = self.total_flow();
        if total <= 0.0 {
            return vec![0.0; self.mol.len()];
        }
        self.mol.iter().map(|m| m / total).collect()
    }

    /// Copy flows, conditions and phase, keeping this stream's name.
    pub fn copy_like(&mut self, other: &StreamState) {
        self.mol.clone_from(&other.mol);
        self.t = other.t;
        self.p = other.p;
        self.phase = other.phase;
    }
}
