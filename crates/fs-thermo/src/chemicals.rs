//! Chemical lists.

use crate::error::{ThermoError, ThermoResult};

/// How a chemical participates in phase equilibrium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Volatility {
    /// Distributes between phases according to its K-value.
    #[default]
    Volatile,
    /// Noncondensable: always leaves with the top phase.
    Light,
    /// Nonvolatile: always leaves with the bottom phase.
    Heavy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chemical {
    pub name: String,
    pub volatility: Volatility,
}

/// Ordered chemical list. Every flow vector in a flowsheet is indexed by it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chemicals {
    items: Vec<Chemical>,
}

impl Chemicals {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: names
                .into_iter()
                .map(|name| Chemical {
                    name: name.into(),
                    volatility: Volatility::Volatile,
                })
                .collect(),
        }
    }

    /// Reclassify a chemical by name.
    pub fn with_volatility(mut self, name: &str, volatility: Volatility) -> ThermoResult<Self> {
        let i = self.index_of(name).ok_or(ThermoError::InvalidArg {
            what: "unknown chemical",
        })?;
        self.items[i].volatility = volatility;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chemical> {
        self.items.iter()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(|c| c.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|c| c.name == name)
    }

    /// Indices of chemicals with the given volatility class, in list order.
    pub fn indices(&self, volatility: Volatility) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, c)| c.volatility == volatility)
            .map(|(i, _)| i)
            .collect()
    }
}
