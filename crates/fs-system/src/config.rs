//! Convergence settings of a [`System`](crate::System).

use std::fmt;
use std::str::FromStr;

use fs_core::Real;
use fs_core::accelerate::{conditional_aitken, conditional_fixed_point, conditional_wegstein};

use crate::error::SystemError;

/// Accelerator used on the recycle vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ConvergenceMethod {
    FixedPoint,
    Wegstein,
    #[default]
    Aitken,
}

impl ConvergenceMethod {
    pub const ALL: [ConvergenceMethod; 3] = [
        ConvergenceMethod::FixedPoint,
        ConvergenceMethod::Wegstein,
        ConvergenceMethod::Aitken,
    ];

    /// Drive the conditional map `f` from `x0` with this accelerator.
    pub fn solve<E, F>(self, f: F, x0: Vec<Real>) -> Result<Vec<Real>, E>
    where
        F: FnMut(&[Real]) -> Result<(Vec<Real>, bool), E>,
    {
        match self {
            ConvergenceMethod::FixedPoint => conditional_fixed_point(f, x0),
            ConvergenceMethod::Wegstein => conditional_wegstein(f, x0),
            ConvergenceMethod::Aitken => conditional_aitken(f, x0),
        }
    }
}

impl FromStr for ConvergenceMethod {
    type Err = SystemError;

    /// Case, space, dash and underscore insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "fixedpoint" => Ok(ConvergenceMethod::FixedPoint),
            "wegstein" => Ok(ConvergenceMethod::Wegstein),
            "aitken" => Ok(ConvergenceMethod::Aitken),
            _ => Err(SystemError::InvalidConfig {
                what: "method must be one of fixed-point, wegstein or aitken",
            }),
        }
    }
}

impl fmt::Display for ConvergenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConvergenceMethod::FixedPoint => "fixed-point",
            ConvergenceMethod::Wegstein => "wegstein",
            ConvergenceMethod::Aitken => "aitken",
        })
    }
}

/// Tolerances and iteration budget of one recycle loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConvergenceConfig {
    pub method: ConvergenceMethod,
    pub maxiter: usize,
    /// [kmol/hr]
    pub molar_tolerance: f64,
    pub relative_molar_tolerance: f64,
    /// [K]
    pub temperature_tolerance: f64,
    pub relative_temperature_tolerance: f64,
    /// Fail when `maxiter` is exhausted instead of accepting the last iterate.
    pub strict: bool,
    /// Converge with units' steady mode inside each recycle iteration.
    pub stabilized: bool,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            method: ConvergenceMethod::Aitken,
            maxiter: 200,
            molar_tolerance: 1.0,
            relative_molar_tolerance: 0.01,
            temperature_tolerance: 0.10,
            relative_temperature_tolerance: 0.001,
            strict: true,
            stabilized: false,
        }
    }
}

impl ConvergenceConfig {
    pub fn with_method(mut self, method: ConvergenceMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = maxiter;
        self
    }

    pub fn with_molar_tolerance(mut self, abs: f64, rel: f64) -> Self {
        self.molar_tolerance = abs;
        self.relative_molar_tolerance = rel;
        self
    }

    pub fn with_temperature_tolerance(mut self, abs: f64, rel: f64) -> Self {
        self.temperature_tolerance = abs;
        self.relative_temperature_tolerance = rel;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_stabilized(mut self, stabilized: bool) -> Self {
        self.stabilized = stabilized;
        self
    }

    pub fn validate(&self) -> Result<(), SystemError> {
        if self.maxiter == 0 {
            return Err(SystemError::InvalidConfig {
                what: "maxiter must be positive",
            });
        }
        let tolerances = [
            self.molar_tolerance,
            self.relative_molar_tolerance,
            self.temperature_tolerance,
            self.relative_temperature_tolerance,
        ];
        if tolerances.iter().any(|t| !(*t >= 0.0)) {
            return Err(SystemError::InvalidConfig {
                what: "tolerances must be non-negative",
            });
        }
        Ok(())
    }
}
