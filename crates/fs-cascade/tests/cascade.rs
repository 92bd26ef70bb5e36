//! End-to-end cascade solves against closed forms and ideal mixtures.

use std::sync::Arc;

use fs_cascade::mass::{StageSplits, bottoms_stripping_factors, top_flow_rates};
use fs_cascade::{
    CascadeConfig, CascadeError, CascadeFeed, CascadePorts, MultiStageEquilibrium, PartitionData,
    StageSpecification,
};
use fs_thermo::{Chemicals, IdealPackage, Phase, PhasePair, PropertyPackage, StreamArena, StreamState};
use fs_units::Unit;
use nalgebra::DMatrix;
use proptest::prelude::*;

fn binary() -> Arc<dyn PropertyPackage> {
    Arc::new(
        IdealPackage::from_boiling_points(
            Chemicals::new(["pentane", "hexane"]),
            &[(309.2, 25_790.0), (341.9, 28_850.0)],
        )
        .unwrap()
        .with_heat_capacities(&[167.0, 195.0])
        .unwrap(),
    )
}

fn ternary() -> Arc<dyn PropertyPackage> {
    Arc::new(
        IdealPackage::from_boiling_points(
            Chemicals::new(["solute", "carrier", "solvent"]),
            &[(350.0, 30_000.0), (373.0, 40_000.0), (330.0, 29_000.0)],
        )
        .unwrap(),
    )
}

fn feed(stage: usize, mol: Vec<f64>, t: f64) -> CascadeFeed {
    let n = mol.len();
    CascadeFeed {
        stage,
        state: StreamState::new("feed", n)
            .with_flows(mol)
            .with_conditions(t, 101_325.0),
    }
}

fn assert_balanced(cascade: &MultiStageEquilibrium, fed: &[f64]) {
    let n = cascade.n_stages();
    let top = cascade.top_flows();
    let bottom = cascade.bottom_flows();
    let (top_split, bottom_split) = cascade.config().splits();
    for (j, f) in fed.iter().enumerate() {
        let mut out = top[(0, j)] + bottom[(n - 1, j)];
        for i in 0..n {
            out += top_split[i] * top[(i, j)] + bottom_split[i] * bottom[(i, j)];
        }
        assert!((out - f).abs() < 1e-6 * f.max(1.0), "chemical {j}: in {f}, out {out}");
    }
}

#[test]
fn two_stage_balances_match_closed_form() {
    let s = 0.7;
    let f = 12.0;
    let k = DMatrix::from_element(2, 1, 1.0 / s);
    let (stripping, safe) = bottoms_stripping_factors(&[1.0, 1.0], &k);
    let mut feed = DMatrix::zeros(2, 1);
    feed[(0, 0)] = f;
    let top = top_flow_rates(&stripping, &feed, &StageSplits::none(2), safe);
    let expected = f * (1.0 + s) / (1.0 + s + s * s);
    assert!((top[(0, 0)] - expected).abs() < 1e-10);
}

#[test]
fn symmetric_cascade_splits_middle_feed_evenly() {
    let k = DMatrix::from_element(3, 1, 1.0);
    let (stripping, safe) = bottoms_stripping_factors(&[1.0, 1.0, 1.0], &k);
    let mut feed = DMatrix::zeros(3, 1);
    feed[(1, 0)] = 8.0;
    let top = top_flow_rates(&stripping, &feed, &StageSplits::none(3), safe);
    // what leaves the bottom is the rest of the feed
    let bottom_product = 8.0 - top[(0, 0)];
    assert!((top[(0, 0)] - 4.0).abs() < 1e-10);
    assert!((bottom_product - 4.0).abs() < 1e-10);
}

#[test]
fn single_stage_fixed_k_is_a_flash() {
    let config = CascadeConfig::new(1)
        .with_phases(PhasePair::Lle)
        .with_partition_data(PartitionData::uniform(vec![2.0, 0.5, 1.0]));
    let mut cascade = MultiStageEquilibrium::new("X1", config, ternary()).unwrap();
    let report = cascade.solve(&[feed(0, vec![1.0, 1.0, 0.0], 300.0)]).unwrap();
    assert!(report.converged);
    let top = cascade.top_product();
    assert!((top[0] - 2.0 / 3.0).abs() < 1e-6);
    assert!((top[1] - 1.0 / 3.0).abs() < 1e-6);
    assert!((cascade.phase_ratios()[0] - 1.0).abs() < 1e-6);
}

#[test]
fn countercurrent_extraction_recovers_solute() {
    let config = CascadeConfig::new(3)
        .with_phases(PhasePair::Lle)
        .with_partition_data(PartitionData::uniform(vec![2.0, 1e-6, 1e6]));
    let mut cascade = MultiStageEquilibrium::new("X3", config, ternary()).unwrap();
    let feeds = [
        feed(0, vec![10.0, 100.0, 0.0], 300.0),
        feed(2, vec![0.0, 0.0, 100.0], 300.0),
    ];
    cascade.solve(&feeds).unwrap();
    assert_balanced(&cascade, &[10.0, 100.0, 100.0]);
    let extract = cascade.top_product();
    assert!(extract[0] > 8.5, "extracted {}", extract[0]);
    assert!(extract[1] < 1e-2);
    assert!(cascade.bottom_product()[2] < 1e-2);
}

fn pentane_hexane_config() -> CascadeConfig {
    CascadeConfig::new(5)
        .with_specification(0, StageSpecification::Reflux(2.0))
        .with_specification(4, StageSpecification::Boilup(2.0))
}

fn assert_stages_balanced(cascade: &MultiStageEquilibrium) {
    let worst = cascade.material_errors().amax();
    assert!(worst < 1e-6, "stage balance residual {worst}");
}

#[test]
fn distillation_enriches_light_key() {
    let thermo = binary();
    let bubble = thermo.bubble_point(&[0.5, 0.5], 101_325.0).unwrap();
    let mut cascade = MultiStageEquilibrium::new("D1", pentane_hexane_config(), thermo).unwrap();
    let report = cascade.solve(&[feed(2, vec![50.0, 50.0], bubble.t)]).unwrap();
    assert!(report.converged, "{report:?}");

    assert_balanced(&cascade, &[50.0, 50.0]);
    assert_stages_balanced(&cascade);
    let top = cascade.top_product();
    let bottom = cascade.bottom_product();
    let x_top = top[0] / top.iter().sum::<f64>();
    let x_bottom = bottom[0] / bottom.iter().sum::<f64>();
    assert!(x_top > 0.6, "distillate purity {x_top}");
    assert!(x_bottom < 0.4, "bottoms purity {x_bottom}");
    let t = cascade.stage_temperatures();
    assert!(t[0] < t[4]);
    assert!((cascade.phase_ratios()[4] - 2.0).abs() < 1e-12);
}

#[test]
fn inside_out_agrees_with_plain_iteration() {
    let thermo = binary();
    let bubble = thermo.bubble_point(&[0.5, 0.5], 101_325.0).unwrap();
    let mut config = pentane_hexane_config();
    config.molar_tolerance = 1e-5;
    config.relative_molar_tolerance = 1e-7;
    let feeds = [feed(2, vec![50.0, 50.0], bubble.t)];
    let mut plain = MultiStageEquilibrium::new("D1", config.clone(), thermo.clone()).unwrap();
    let mut fast = MultiStageEquilibrium::new("D2", config.with_inside_out(true), thermo).unwrap();
    let plain_report = plain.solve(&feeds).unwrap();
    let fast_report = fast.solve(&feeds).unwrap();
    assert!(plain_report.converged, "plain: {plain_report:?}");
    assert!(fast_report.converged, "inside-out: {fast_report:?}");

    assert_balanced(&fast, &[50.0, 50.0]);
    assert_stages_balanced(&plain);
    assert_stages_balanced(&fast);
    let tolerance = CascadeConfig::default().molar_tolerance;
    let products = [
        (plain.top_product(), fast.top_product()),
        (plain.bottom_product(), fast.bottom_product()),
    ];
    for (a, b) in products {
        for (j, (a, b)) in a.iter().zip(&b).enumerate() {
            assert!((a - b).abs() < tolerance, "chemical {j}: plain {a}, inside-out {b}");
        }
    }
    let (ta, tb) = (plain.stage_temperatures(), fast.stage_temperatures());
    for (a, b) in ta.iter().zip(&tb) {
        assert!((a - b).abs() < 0.1, "plain {a} K, inside-out {b} K");
    }
}

#[test]
fn light_chemicals_skip_partitioning() {
    let chemicals = Chemicals::new(["nitrogen", "pentane", "hexane"])
        .with_volatility("nitrogen", fs_thermo::Volatility::Light)
        .unwrap();
    let thermo: Arc<dyn PropertyPackage> = Arc::new(
        IdealPackage::from_boiling_points(
            chemicals,
            &[(77.0, 5_570.0), (309.2, 25_790.0), (341.9, 28_850.0)],
        )
        .unwrap(),
    );
    let config = CascadeConfig::new(3)
        .with_specification(0, StageSpecification::Reflux(1.0))
        .with_specification(2, StageSpecification::Boilup(1.0));
    let mut cascade = MultiStageEquilibrium::new("D3", config, thermo).unwrap();
    cascade
        .solve(&[feed(1, vec![2.0, 20.0, 20.0], 320.0)])
        .unwrap();
    assert!((cascade.top_product()[0] - 2.0).abs() < 1e-9);
    assert_eq!(cascade.bottom_product()[0], 0.0);
}

#[test]
fn invalid_specifications_are_rejected() {
    let lle_reflux = CascadeConfig::new(3)
        .with_phases(PhasePair::Lle)
        .with_specification(0, StageSpecification::Reflux(1.0));
    assert!(matches!(
        MultiStageEquilibrium::new("X", lle_reflux, ternary()),
        Err(CascadeError::Specification { stage: 0, .. })
    ));
    let draw_at_top = CascadeConfig::new(3).with_top_side_draw(0, 0.2);
    assert!(matches!(
        MultiStageEquilibrium::new("X", draw_at_top, ternary()),
        Err(CascadeError::InvalidConfig { .. })
    ));
    let short_k = CascadeConfig::new(2).with_partition_data(PartitionData::uniform(vec![1.0]));
    assert!(MultiStageEquilibrium::new("X", short_k, ternary()).is_err());
}

#[test]
fn strict_cascade_reports_nonconvergence() {
    let thermo = binary();
    let mut config = CascadeConfig::new(5)
        .with_specification(0, StageSpecification::Reflux(2.0))
        .with_specification(4, StageSpecification::Boilup(2.0))
        .with_strict(true);
    config.maxiter = 1;
    config.max_attempts = 1;
    config.molar_tolerance = 0.0;
    config.relative_molar_tolerance = 0.0;
    config.collapsed_init = false;
    let mut cascade = MultiStageEquilibrium::new("D4", config, thermo).unwrap();
    let err = cascade.solve(&[feed(2, vec![50.0, 50.0], 320.0)]).unwrap_err();
    assert!(matches!(err, CascadeError::ConvergenceFailed { attempts: 1, .. }));
}

#[test]
fn runs_as_flowsheet_unit() {
    let thermo = ternary();
    let mut streams = StreamArena::new(3);
    let raffinate_in = streams
        .insert(
            StreamState::new("raffinate_in", 3)
                .with_flows(vec![10.0, 100.0, 0.0])
                .with_conditions(300.0, 101_325.0),
        )
        .unwrap();
    let solvent_in = streams
        .insert(
            StreamState::new("solvent_in", 3)
                .with_flows(vec![0.0, 0.0, 100.0])
                .with_conditions(300.0, 101_325.0),
        )
        .unwrap();
    let extract = streams.add("extract");
    let raffinate = streams.add("raffinate");
    let draw = streams.add("draw");
    let config = CascadeConfig::new(4)
        .with_phases(PhasePair::Lle)
        .with_partition_data(PartitionData::uniform(vec![2.0, 1e-6, 1e6]))
        .with_bottom_side_draw(1, 0.1);
    let mut unit = MultiStageEquilibrium::new("X4", config, thermo)
        .unwrap()
        .with_ports(CascadePorts {
            feeds: vec![raffinate_in, solvent_in],
            top: extract,
            bottom: raffinate,
            top_side_draws: vec![],
            bottom_side_draws: vec![(1, draw)],
        })
        .unwrap();
    unit.run(&mut streams).unwrap();

    assert_eq!(streams[extract].phase, Phase::LiquidL);
    assert_eq!(streams[raffinate].phase, Phase::Liquid);
    for j in 0..3 {
        let fed = streams[raffinate_in].mol[j] + streams[solvent_in].mol[j];
        let out = streams[extract].mol[j] + streams[raffinate].mol[j] + streams[draw].mol[j];
        assert!((fed - out).abs() < 1e-6 * fed.max(1.0));
    }
    assert!(streams[draw].total_flow() > 0.0);
}

#[test]
fn single_stage_with_fixed_boilup_matches_textbook_flash() {
    let thermo: Arc<dyn PropertyPackage> = Arc::new(
        IdealPackage::from_boiling_points(Chemicals::new(["solute"]), &[(350.0, 30_000.0)]).unwrap(),
    );
    let config = CascadeConfig::new(1)
        .with_specification(0, StageSpecification::Boilup(1.0))
        .with_partition_data(PartitionData::uniform(vec![2.0]));
    let mut cascade = MultiStageEquilibrium::new("F1", config, thermo).unwrap();
    cascade.solve(&[feed(0, vec![10.0], 350.0)]).unwrap();
    assert!((cascade.top_product()[0] - 20.0 / 3.0).abs() < 1e-9);
    assert!((cascade.bottom_product()[0] - 10.0 / 3.0).abs() < 1e-9);
}

#[test]
fn optimize_strategy_reaches_the_same_extraction() {
    let partition = PartitionData::uniform(vec![2.0, 1e-6, 1e6]);
    let feeds = [
        feed(0, vec![10.0, 100.0, 0.0], 300.0),
        feed(2, vec![0.0, 0.0, 100.0], 300.0),
    ];
    let config = CascadeConfig::new(3)
        .with_phases(PhasePair::Lle)
        .with_partition_data(partition);
    let mut root = MultiStageEquilibrium::new("R", config.clone(), ternary()).unwrap();
    let mut optimize = MultiStageEquilibrium::new(
        "O",
        config.with_algorithm(fs_cascade::CascadeAlgorithm::Optimize),
        ternary(),
    )
    .unwrap();
    root.solve(&feeds).unwrap();
    optimize.solve(&feeds).unwrap();
    assert_balanced(&optimize, &[10.0, 100.0, 100.0]);
    assert!((root.top_product()[0] - optimize.top_product()[0]).abs() < 0.05);
}

#[test]
fn cached_solution_is_reused() {
    let mut config = CascadeConfig::new(3)
        .with_phases(PhasePair::Lle)
        .with_partition_data(PartitionData::uniform(vec![2.0, 1e-6, 1e6]));
    config.use_cache = true;
    let mut cascade = MultiStageEquilibrium::new("C", config, ternary()).unwrap();
    let feeds = [
        feed(0, vec![10.0, 100.0, 0.0], 300.0),
        feed(2, vec![0.0, 0.0, 100.0], 300.0),
    ];
    cascade.solve(&feeds).unwrap();
    let first = cascade.top_product();
    let report = cascade.solve(&feeds).unwrap();
    assert!(report.converged);
    assert!(report.iterations <= 2);
    assert!((cascade.top_product()[0] - first[0]).abs() < 1e-2);
}

proptest! {
    #[test]
    fn fixed_k_cascades_conserve_mass(
        n in 1usize..5,
        k in 0.1f64..10.0,
        solute in 0.1f64..50.0,
        stage_frac in 0.0f64..1.0,
    ) {
        let config = CascadeConfig::new(n)
            .with_phases(PhasePair::Lle)
            .with_partition_data(PartitionData::uniform(vec![k, 1e-6, 1e6]));
        let mut cascade = MultiStageEquilibrium::new("P", config, ternary()).unwrap();
        let stage = ((n - 1) as f64 * stage_frac).round() as usize;
        let feeds = [
            feed(stage, vec![solute, 50.0, 0.0], 300.0),
            feed(n - 1, vec![0.0, 0.0, 50.0], 300.0),
        ];
        cascade.solve(&feeds).unwrap();
        let top = cascade.top_product();
        let bottom = cascade.bottom_product();
        for (j, fed) in [solute, 50.0, 50.0].iter().enumerate() {
            prop_assert!((top[j] + bottom[j] - fed).abs() < 1e-6 * fed);
        }
        prop_assert!(top.iter().chain(&bottom).all(|v| *v >= 0.0));
    }
}
