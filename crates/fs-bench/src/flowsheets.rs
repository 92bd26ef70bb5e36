//! Benchmark flowsheets, each returned ready to simulate.

use std::sync::Arc;

use fs_cascade::{CascadeConfig, CascadePorts, MultiStageEquilibrium, StageEquilibrium, StageSpecification};
use fs_flowsheet::{Flowsheet, FlowsheetBuilder};
use fs_system::System;
use fs_thermo::{Chemicals, IdealPackage, PhasePair, PropertyPackage, StreamState};
use fs_units::{Mixer, SplitSpec, Splitter};

use crate::error::BenchResult;

const P_FLASH: f64 = 101_325.0;

/// A flowsheet with the system that converges it.
pub struct BenchFlowsheet {
    pub flowsheet: Flowsheet,
    pub system: System,
}

/// Normal boiling point [K] and heat of vaporization [kJ/kmol].
type BoilingData = (f64, f64);

const HEPTANOL: BoilingData = (449.5, 48_100.0);
const OCTANOL: BoilingData = (468.3, 46_900.0);
const PROPANOL: BoilingData = (370.3, 41_440.0);
const HEPTANE: BoilingData = (371.6, 31_770.0);
const OCTANE: BoilingData = (398.8, 34_410.0);
const PROPANE: BoilingData = (231.1, 19_040.0);
const PENTANE: BoilingData = (309.2, 25_790.0);
const HEXANE: BoilingData = (341.9, 28_850.0);

fn binary(names: [&str; 2], data: [BoilingData; 2]) -> BenchResult<Arc<dyn PropertyPackage>> {
    Ok(Arc::new(IdealPackage::from_boiling_points(Chemicals::new(names), &data)?))
}

/// One equilibrium stage at a boilup of 1 whose liquid is partly
/// recycled: 40% of it leaves as product, the rest returns to the stage.
fn flash_with_liquid_recycle(names: [&str; 2], data: [BoilingData; 2]) -> BenchResult<BenchFlowsheet> {
    let thermo = binary(names, data)?;
    let feed_t = thermo.bubble_point(&[0.5, 0.5], P_FLASH)?.t;
    let mut builder = FlowsheetBuilder::new(2);
    let feed = builder.add_feed(
        StreamState::new("feed", 2)
            .with_flows(vec![100.0, 100.0])
            .with_conditions(feed_t, P_FLASH),
    )?;
    let recycle = builder.add_stream("liquid_recycle");
    let vapor = builder.add_stream("vapor_product");
    let liquid = builder.add_stream("liquid_product");
    let stage = builder.add_unit(
        StageEquilibrium::new("stage", vec![feed, recycle], vapor, recycle, PhasePair::Vle, thermo)
            .with_pressure(P_FLASH)
            .with_specification(StageSpecification::Boilup(1.0))?
            .with_bottom_side_draw(liquid, 0.4),
    );
    let flowsheet = builder.build()?;
    let system = System::new("sys", vec![stage.into()]).with_recycle(vec![recycle]);
    Ok(BenchFlowsheet { flowsheet, system })
}

pub fn alcohol_narrow_flash() -> BenchResult<BenchFlowsheet> {
    flash_with_liquid_recycle(["heptanol", "octanol"], [HEPTANOL, OCTANOL])
}

pub fn alcohol_wide_flash() -> BenchResult<BenchFlowsheet> {
    flash_with_liquid_recycle(["propanol", "octanol"], [PROPANOL, OCTANOL])
}

pub fn hydrocarbon_narrow_flash() -> BenchResult<BenchFlowsheet> {
    flash_with_liquid_recycle(["heptane", "octane"], [HEPTANE, OCTANE])
}

pub fn hydrocarbon_wide_flash() -> BenchResult<BenchFlowsheet> {
    flash_with_liquid_recycle(["propane", "octane"], [PROPANE, OCTANE])
}

/// Five-stage pentane/hexane column with half of its bottoms returned to
/// the feed.
pub fn pentane_hexane_column() -> BenchResult<BenchFlowsheet> {
    let thermo = binary(["pentane", "hexane"], [PENTANE, HEXANE])?;
    let feed_t = thermo.bubble_point(&[0.5, 0.5], P_FLASH)?.t;
    let mut builder = FlowsheetBuilder::new(2);
    let feed = builder.add_feed(
        StreamState::new("feed", 2)
            .with_flows(vec![50.0, 50.0])
            .with_conditions(feed_t, P_FLASH),
    )?;
    let recycle = builder.add_stream("bottoms_recycle");
    let mixed = builder.add_stream("column_feed");
    let distillate = builder.add_stream("distillate");
    let bottoms = builder.add_stream("bottoms");
    let bottoms_product = builder.add_stream("bottoms_product");

    let mixer = builder.add_unit(Mixer::new("M1", vec![feed, recycle], mixed).with_thermo(thermo.clone()));
    let config = CascadeConfig::new(5)
        .with_pressure(P_FLASH)
        .with_feed_stages(vec![2])
        .with_specification(0, StageSpecification::Reflux(2.0))
        .with_specification(4, StageSpecification::Boilup(2.0));
    let column = MultiStageEquilibrium::new("D1", config, thermo)?.with_ports(CascadePorts {
        feeds: vec![mixed],
        top: distillate,
        bottom: bottoms,
        top_side_draws: Vec::new(),
        bottom_side_draws: Vec::new(),
    })?;
    let column = builder.add_unit(column);
    let splitter = builder.add_unit(Splitter::new(
        "S1",
        bottoms,
        [bottoms_product, recycle],
        SplitSpec::Overall(0.5),
    )?);
    let flowsheet = builder.build()?;
    let system = System::new("column", vec![mixer.into(), column.into(), splitter.into()])
        .with_recycle(vec![recycle]);
    Ok(BenchFlowsheet { flowsheet, system })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_loops_close_the_balance() {
        for build in [alcohol_narrow_flash, hydrocarbon_wide_flash] {
            let mut bench = build().unwrap();
            bench.system.set_tolerance(Some(1e-6), Some(1e-9), None, None, true, None);
            let report = bench.system.simulate(&mut bench.flowsheet).unwrap();
            assert!(report.converged);
            let inlet = bench.system.get_inlet_flow(&bench.flowsheet);
            let outlet = bench.system.get_outlet_flow(&bench.flowsheet);
            for (i, o) in inlet.iter().zip(&outlet) {
                assert!((i - o).abs() < 1e-3, "in {i}, out {o}");
            }
        }
    }

    #[test]
    fn wide_flash_separates_better_than_narrow() {
        let purity = |build: fn() -> BenchResult<BenchFlowsheet>| {
            let mut bench = build().unwrap();
            bench.system.simulate(&mut bench.flowsheet).unwrap();
            let streams = bench.flowsheet.streams();
            let vapor = &streams[streams.find("vapor_product").unwrap()];
            vapor.mol[0] / vapor.total_flow()
        };
        assert!(purity(hydrocarbon_wide_flash) > purity(hydrocarbon_narrow_flash));
        assert!(purity(alcohol_wide_flash) > purity(alcohol_narrow_flash));
    }

    #[test]
    fn column_enriches_distillate() {
        let mut bench = pentane_hexane_column().unwrap();
        let report = bench.system.simulate(&mut bench.flowsheet).unwrap();
        assert!(report.converged);
        let streams = bench.flowsheet.streams();
        let distillate = &streams[streams.find("distillate").unwrap()];
        assert!(distillate.mol[0] > distillate.mol[1]);
    }
}
