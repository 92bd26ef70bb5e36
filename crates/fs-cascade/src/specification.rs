//! Stage specifications and cascade configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use fs_core::units::constants::P_ATM_PA;
use fs_thermo::PhasePair;

use crate::error::{CascadeError, CascadeResult};

/// A fixed quantity closing one stage's equations.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StageSpecification {
    /// Heat added to the stage [kJ/hr]; phase ratio and temperature are solved.
    Duty(f64),
    /// Bottom over top molar flow leaving the stage.
    Reflux(f64),
    /// Top over bottom molar flow leaving the stage.
    Boilup(f64),
    /// Stage temperature [K].
    Temperature(f64),
}

impl StageSpecification {
    /// Fixed phase ratio B implied by this specification.
    pub fn phase_ratio(&self) -> Option<f64> {
        match *self {
            StageSpecification::Reflux(r) if r == 0.0 => Some(f64::INFINITY),
            StageSpecification::Reflux(r) => Some(1.0 / r),
            StageSpecification::Boilup(b) => Some(b),
            _ => None,
        }
    }

    pub fn temperature(&self) -> Option<f64> {
        match *self {
            StageSpecification::Temperature(t) => Some(t),
            _ => None,
        }
    }

    pub fn duty(&self) -> f64 {
        match *self {
            StageSpecification::Duty(q) => q,
            _ => 0.0,
        }
    }

    /// Reject values that cannot apply to a stage with `phases`.
    pub fn validate(&self, stage: usize, phases: PhasePair) -> CascadeResult<()> {
        let err = |what| Err(CascadeError::Specification { stage, what });
        match *self {
            StageSpecification::Duty(q) if !q.is_finite() => err("duty must be finite"),
            StageSpecification::Reflux(_) | StageSpecification::Boilup(_)
                if phases == PhasePair::Lle =>
            {
                err("reflux and boilup need a vapor-liquid stage")
            }
            StageSpecification::Reflux(v) | StageSpecification::Boilup(v)
                if !(v >= 0.0 && v.is_finite()) =>
            {
                err("phase ratio specifications must be finite and non-negative")
            }
            StageSpecification::Temperature(t) if !(t > 0.0 && t.is_finite()) => {
                err("temperature must be positive")
            }
            _ => Ok(()),
        }
    }
}

/// Strategy used to converge the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CascadeAlgorithm {
    /// Fixed point on the top-flow field with a sequential fallback.
    #[default]
    Root,
    /// Bounded least squares on the fixed-point residual.
    Optimize,
}

impl FromStr for CascadeAlgorithm {
    type Err = CascadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "root" => Ok(CascadeAlgorithm::Root),
            "optimize" => Ok(CascadeAlgorithm::Optimize),
            _ => Err(CascadeError::InvalidConfig {
                what: "algorithm must be 'root' or 'optimize'",
            }),
        }
    }
}

impl fmt::Display for CascadeAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeAlgorithm::Root => f.write_str("root"),
            CascadeAlgorithm::Optimize => f.write_str("optimize"),
        }
    }
}

/// Externally supplied partition coefficients that replace the property
/// package. One row applies to every stage; otherwise one row per stage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionData {
    pub k: Vec<Vec<f64>>,
}

impl PartitionData {
    pub fn uniform(k: Vec<f64>) -> Self {
        Self { k: vec![k] }
    }

    pub fn per_stage(k: Vec<Vec<f64>>) -> Self {
        Self { k }
    }

    pub fn stage(&self, i: usize) -> &[f64] {
        if self.k.len() == 1 { &self.k[0] } else { &self.k[i] }
    }

    /// Rows for `stages` only.
    pub fn select(&self, stages: &[usize]) -> Self {
        if self.k.len() == 1 {
            self.clone()
        } else {
            Self {
                k: stages.iter().map(|i| self.k[*i].clone()).collect(),
            }
        }
    }

    pub fn validate(&self, n_stages: usize, n_chemicals: usize) -> CascadeResult<()> {
        if self.k.len() != 1 && self.k.len() != n_stages {
            return Err(CascadeError::InvalidConfig {
                what: "partition data needs one row or one row per stage",
            });
        }
        for row in &self.k {
            if row.len() != n_chemicals {
                return Err(CascadeError::InvalidConfig {
                    what: "partition data row length must match the chemical count",
                });
            }
            if let Some(k) = row.iter().find(|k| !(**k > 0.0 && k.is_finite())) {
                return Err(CascadeError::InfeasibleEquilibrium {
                    what: "partition coefficient",
                    value: *k,
                });
            }
        }
        Ok(())
    }
}

/// Configuration of a [`MultiStageEquilibrium`](crate::MultiStageEquilibrium).
///
/// Stage 0 is the top stage. Stage keys of `specifications` and side draws
/// are stage indices; `feed_stages` may be negative to count from the
/// bottom (`-1` is the last stage).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CascadeConfig {
    pub n_stages: usize,
    /// Stage receiving each inlet, in inlet order.
    pub feed_stages: Vec<isize>,
    pub phases: PhasePair,
    /// Operating pressure [Pa].
    pub pressure: f64,
    pub specifications: BTreeMap<usize, StageSpecification>,
    /// Fraction of the top phase drawn off at a stage.
    pub top_side_draws: BTreeMap<usize, f64>,
    /// Fraction of the bottom phase drawn off at a stage.
    pub bottom_side_draws: BTreeMap<usize, f64>,
    pub partition_data: Option<PartitionData>,
    pub algorithm: CascadeAlgorithm,
    pub inside_out: bool,
    /// Start from the previous solution when one exists.
    pub use_cache: bool,
    /// Initialize from a smaller cascade over feed, specification and
    /// side-draw stages.
    pub collapsed_init: bool,
    pub maxiter: usize,
    pub max_attempts: usize,
    pub fallback_maxiter: usize,
    /// Absolute flow tolerance [kmol/hr].
    pub molar_tolerance: f64,
    pub relative_molar_tolerance: f64,
    /// Fail instead of accepting a non-converged cascade.
    pub strict: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            n_stages: 1,
            feed_stages: Vec::new(),
            phases: PhasePair::Vle,
            pressure: P_ATM_PA,
            specifications: BTreeMap::new(),
            top_side_draws: BTreeMap::new(),
            bottom_side_draws: BTreeMap::new(),
            partition_data: None,
            algorithm: CascadeAlgorithm::Root,
            inside_out: false,
            use_cache: false,
            collapsed_init: true,
            maxiter: 10,
            max_attempts: 20,
            fallback_maxiter: 1,
            molar_tolerance: 0.01,
            relative_molar_tolerance: 0.001,
            strict: false,
        }
    }
}

impl CascadeConfig {
    pub fn new(n_stages: usize) -> Self {
        Self {
            n_stages,
            ..Self::default()
        }
    }

    pub fn with_phases(mut self, phases: PhasePair) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn with_feed_stages(mut self, stages: Vec<isize>) -> Self {
        self.feed_stages = stages;
        self
    }

    pub fn with_specification(mut self, stage: usize, spec: StageSpecification) -> Self {
        self.specifications.insert(stage, spec);
        self
    }

    pub fn with_top_side_draw(mut self, stage: usize, split: f64) -> Self {
        self.top_side_draws.insert(stage, split);
        self
    }

    pub fn with_bottom_side_draw(mut self, stage: usize, split: f64) -> Self {
        self.bottom_side_draws.insert(stage, split);
        self
    }

    pub fn with_partition_data(mut self, data: PartitionData) -> Self {
        self.partition_data = Some(data);
        self
    }

    pub fn with_algorithm(mut self, algorithm: CascadeAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_inside_out(mut self, enabled: bool) -> Self {
        self.inside_out = enabled;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Resolve a possibly negative stage index.
    pub fn stage_index(&self, stage: isize) -> CascadeResult<usize> {
        let n = self.n_stages as isize;
        let i = if stage < 0 { n + stage } else { stage };
        if (0..n).contains(&i) {
            Ok(i as usize)
        } else {
            Err(CascadeError::InvalidConfig {
                what: "stage index out of range",
            })
        }
    }

    /// Stage of inlet `k`; without explicit stages the first inlet feeds
    /// the top stage and the rest the bottom stage.
    pub fn feed_stage(&self, k: usize) -> CascadeResult<usize> {
        match self.feed_stages.get(k) {
            Some(stage) => self.stage_index(*stage),
            None if self.feed_stages.is_empty() => Ok(if k == 0 { 0 } else { self.n_stages - 1 }),
            None => Err(CascadeError::InvalidConfig {
                what: "more inlets than feed stages",
            }),
        }
    }

    /// Side-draw fractions as per-stage vectors.
    pub fn splits(&self) -> (Vec<f64>, Vec<f64>) {
        let mut top = vec![0.0; self.n_stages];
        let mut bottom = vec![0.0; self.n_stages];
        for (i, s) in &self.top_side_draws {
            top[*i] = *s;
        }
        for (i, s) in &self.bottom_side_draws {
            bottom[*i] = *s;
        }
        (top, bottom)
    }

    /// Check everything that can be checked before feeds are known.
    pub fn validate(&self, n_chemicals: usize) -> CascadeResult<()> {
        let n = self.n_stages;
        if n == 0 {
            return Err(CascadeError::InvalidConfig {
                what: "a cascade needs at least one stage",
            });
        }
        if !(self.pressure > 0.0 && self.pressure.is_finite()) {
            return Err(CascadeError::InvalidConfig {
                what: "pressure must be positive",
            });
        }
        if !(self.molar_tolerance >= 0.0 && self.relative_molar_tolerance >= 0.0) {
            return Err(CascadeError::InvalidConfig {
                what: "tolerances must be non-negative",
            });
        }
        if self.maxiter == 0 || self.max_attempts == 0 {
            return Err(CascadeError::InvalidConfig {
                what: "iteration budgets must be positive",
            });
        }
        for (stage, spec) in &self.specifications {
            if *stage >= n {
                return Err(CascadeError::Specification {
                    stage: *stage,
                    what: "stage index out of range",
                });
            }
            spec.validate(*stage, self.phases)?;
        }
        for (stage, split) in &self.top_side_draws {
            if *stage == 0 || *stage >= n {
                return Err(CascadeError::InvalidConfig {
                    what: "top side draws must be below the top stage",
                });
            }
            check_split(*split)?;
        }
        for (stage, split) in &self.bottom_side_draws {
            if *stage + 1 >= n {
                return Err(CascadeError::InvalidConfig {
                    what: "bottom side draws must be above the bottom stage",
                });
            }
            check_split(*split)?;
        }
        for stage in &self.feed_stages {
            self.stage_index(*stage)?;
        }
        if let Some(data) = &self.partition_data {
            data.validate(n, n_chemicals)?;
        }
        Ok(())
    }
}

fn check_split(split: f64) -> CascadeResult<()> {
    if (0.0..=1.0).contains(&split) {
        Ok(())
    } else {
        Err(CascadeError::InvalidConfig {
            what: "side-draw split must lie in [0, 1]",
        })
    }
}
