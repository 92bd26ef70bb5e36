//! Helpers shared by unit implementations.

use fs_core::StreamId;
use fs_thermo::{Phase, PropertyPackage, StreamArena};

use crate::error::{UnitError, UnitResult};

/// Combined content of several inlet streams.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedFeed {
    pub mol: Vec<f64>,
    pub t: f64,
    pub p: f64,
    pub phase: Phase,
    /// Total enthalpy [kJ/hr], when a property package was available.
    pub enthalpy: Option<f64>,
}

impl MixedFeed {
    pub fn total_flow(&self) -> f64 {
        self.mol.iter().sum()
    }
}

/// Ensure every id in `ids` refers to a stream in the arena.
pub fn check_streams(unit: &str, streams: &StreamArena, ids: &[StreamId]) -> UnitResult<()> {
    for id in ids {
        if !streams.contains(*id) {
            return Err(UnitError::MissingStream {
                unit: unit.to_string(),
                stream: *id,
            });
        }
    }
    Ok(())
}

/// Mix `ids` adiabatically at the lowest inlet pressure.
///
/// Without a property package the temperature is the flow-weighted mean.
pub fn mix_streams(
    unit: &str,
    streams: &StreamArena,
    ids: &[StreamId],
    thermo: Option<&dyn PropertyPackage>,
) -> UnitResult<MixedFeed> {
    check_streams(unit, streams, ids)?;
    let first = ids.first().ok_or_else(|| UnitError::InvalidConfig {
        unit: unit.to_string(),
        what: "no inlet streams to mix",
    })?;
    let mut mol = vec![0.0; streams.n_components()];
    let mut flow_t = 0.0;
    let mut total = 0.0;
    let mut p = f64::INFINITY;
    let mut all_gas = true;
    for id in ids {
        let s = &streams[*id];
        let f = s.total_flow();
        if f <= 0.0 {
            continue;
        }
        for (m, x) in mol.iter_mut().zip(&s.mol) {
            *m += x;
        }
        flow_t += f * s.t;
        total += f;
        p = p.min(s.p);
        all_gas &= s.phase == Phase::Gas;
    }
    if total <= 0.0 {
        let s = &streams[*first];
        return Ok(MixedFeed {
            mol,
            t: s.t,
            p: s.p,
            phase: s.phase,
            enthalpy: thermo.map(|_| 0.0),
        });
    }
    let phase = if all_gas { Phase::Gas } else { Phase::Liquid };
    let t_mean = flow_t / total;
    let (t, enthalpy) = match thermo {
        Some(pkg) => {
            let mut h = 0.0;
            for id in ids {
                let s = &streams[*id];
                if s.total_flow() > 0.0 {
                    h += pkg.enthalpy(&s.mol, s.phase, s.t, s.p)?;
                }
            }
            let t = pkg.temperature_from_enthalpy(&mol, phase, p, h, t_mean)?;
            (t, Some(h))
        }
        None => (t_mean, None),
    };
    Ok(MixedFeed {
        mol,
        t,
        p,
        phase,
        enthalpy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_thermo::{Chemicals, IdealPackage, StreamState};

    #[test]
    fn flow_weighted_temperature_without_thermo() {
        let mut arena = StreamArena::new(1);
        let a = arena
            .insert(StreamState::new("a", 1).with_flows(vec![1.0]).with_conditions(300.0, 2e5))
            .unwrap();
        let b = arena
            .insert(StreamState::new("b", 1).with_flows(vec![3.0]).with_conditions(400.0, 1e5))
            .unwrap();
        let mixed = mix_streams("M", &arena, &[a, b], None).unwrap();
        assert_eq!(mixed.mol, vec![4.0]);
        assert!((mixed.t - 375.0).abs() < 1e-12);
        assert_eq!(mixed.p, 1e5);
        assert_eq!(mixed.enthalpy, None);
    }

    #[test]
    fn energy_balance_with_thermo() {
        let pkg = IdealPackage::from_boiling_points(Chemicals::new(["w"]), &[(373.15, 40_000.0)])
            .unwrap()
            .with_heat_capacities(&[75.0])
            .unwrap();
        let mut arena = StreamArena::new(1);
        let a = arena
            .insert(StreamState::new("a", 1).with_flows(vec![1.0]).with_conditions(300.0, 1e5))
            .unwrap();
        let b = arena
            .insert(StreamState::new("b", 1).with_flows(vec![1.0]).with_conditions(340.0, 1e5))
            .unwrap();
        let mixed = mix_streams("M", &arena, &[a, b], Some(&pkg)).unwrap();
        assert!((mixed.t - 320.0).abs() < 1e-9);
        assert!(mixed.enthalpy.is_some());
    }

    #[test]
    fn missing_stream_is_reported() {
        let arena = StreamArena::new(1);
        let err = mix_streams("M", &arena, &[StreamId::from_index(3)], None).unwrap_err();
        assert!(matches!(err, UnitError::MissingStream { .. }));
    }
}
