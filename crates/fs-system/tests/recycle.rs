use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fs_cascade::{StageEquilibrium, StageSpecification};
use fs_core::StreamId;
use fs_flowsheet::{Flowsheet, FlowsheetBuilder};
use fs_system::{ConvergenceConfig, ConvergenceMethod, PathElement, System, SystemError};
use fs_thermo::{Chemicals, IdealPackage, PhasePair, PropertyPackage, StreamArena, StreamState};
use fs_units::{Mixer, SplitSpec, Splitter, Unit, UnitResult};
use proptest::prelude::*;

struct Loop {
    flowsheet: Flowsheet,
    mixer: fs_core::UnitId,
    splitter: fs_core::UnitId,
    recycle: StreamId,
    product: StreamId,
}

/// Feed -> mixer -> splitter, with `fraction` of the mixed flow leaving as
/// product and the rest returned to the mixer.
fn mixer_splitter_loop(feed: &[f64], fraction: f64) -> Loop {
    let mut builder = FlowsheetBuilder::new(feed.len());
    let feed = builder
        .add_feed(StreamState::new("feed", feed.len()).with_flows(feed.to_vec()))
        .unwrap();
    let recycle = builder.add_stream("recycle");
    let mixed = builder.add_stream("mixed");
    let product = builder.add_stream("product");
    let mixer = builder.add_unit(Mixer::new("M1", vec![feed, recycle], mixed));
    let splitter = builder.add_unit(
        Splitter::new("S1", mixed, [product, recycle], SplitSpec::Overall(fraction)).unwrap(),
    );
    Loop {
        flowsheet: builder.build().unwrap(),
        mixer,
        splitter,
        recycle,
        product,
    }
}

fn loop_system(l: &Loop, config: ConvergenceConfig) -> System {
    System::new("sys", vec![l.mixer.into(), l.splitter.into()])
        .with_recycle(vec![l.recycle])
        .with_config(config)
}

fn tight() -> ConvergenceConfig {
    ConvergenceConfig::default().with_molar_tolerance(1e-8, 1e-10)
}

fn counter() -> (Arc<AtomicUsize>, PathElement) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let hook = PathElement::hook(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (count, hook)
}

#[test]
fn every_method_reaches_the_analytic_recycle() {
    let f = 0.3;
    for method in ConvergenceMethod::ALL {
        let mut l = mixer_splitter_loop(&[10.0, 5.0], f);
        let mut sys = loop_system(&l, tight().with_method(method));
        let report = sys.simulate(&mut l.flowsheet).unwrap();
        assert!(report.converged, "{method}");
        let streams = l.flowsheet.streams();
        for (j, feed) in [10.0, 5.0].into_iter().enumerate() {
            let expected = feed * (1.0 - f) / f;
            assert!(
                (streams[l.recycle].mol[j] - expected).abs() < 1e-5,
                "{method}: recycle {} vs {expected}",
                streams[l.recycle].mol[j]
            );
            assert!((streams[l.product].mol[j] - feed).abs() < 1e-5, "{method}");
        }
        assert_eq!(sys.last_report(), Some(report));
    }
}

#[test]
fn accelerated_methods_beat_substitution() {
    let iterations = |method| {
        let mut l = mixer_splitter_loop(&[10.0], 0.3);
        let mut sys = loop_system(&l, tight().with_method(method));
        sys.simulate(&mut l.flowsheet).unwrap().iterations
    };
    let plain = iterations(ConvergenceMethod::FixedPoint);
    assert!(iterations(ConvergenceMethod::Aitken) < plain);
    assert!(iterations(ConvergenceMethod::Wegstein) < plain);
}

#[test]
fn tighter_tolerance_needs_more_iterations() {
    let run = |abs| {
        let mut l = mixer_splitter_loop(&[10.0], 0.5);
        let config = ConvergenceConfig::default()
            .with_method(ConvergenceMethod::FixedPoint)
            .with_molar_tolerance(abs, 0.0);
        loop_system(&l, config).simulate(&mut l.flowsheet).unwrap().iterations
    };
    assert!(run(1e-6) > run(1.0));
}

#[test]
fn strict_failure_names_the_recycle() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let config = ConvergenceConfig::default()
        .with_method(ConvergenceMethod::FixedPoint)
        .with_molar_tolerance(0.0, 0.0)
        .with_maxiter(2);
    let err = loop_system(&l, config).simulate(&mut l.flowsheet).unwrap_err();
    match &err {
        SystemError::ConvergenceFailure {
            system,
            recycle,
            iterations,
            ..
        } => {
            assert_eq!(system, "sys");
            assert_eq!(recycle, &vec!["recycle".to_string()]);
            assert_eq!(*iterations, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("could not converge"));
}

#[test]
fn lenient_failure_returns_the_last_iterate() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let config = ConvergenceConfig::default()
        .with_method(ConvergenceMethod::FixedPoint)
        .with_molar_tolerance(0.0, 0.0)
        .with_maxiter(3)
        .with_strict(false);
    let report = loop_system(&l, config).simulate(&mut l.flowsheet).unwrap();
    assert!(!report.converged);
    assert_eq!(report.iterations, 3);
    assert!(report.mol_error > 0.0);
}

#[test]
fn negative_recycle_is_rejected() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    l.flowsheet.streams_mut()[l.recycle].mol = vec![-1.0];
    let err = loop_system(&l, tight()).simulate(&mut l.flowsheet).unwrap_err();
    assert!(matches!(err, SystemError::InfeasibleRegion { value, .. } if value == -1.0));
}

#[test]
fn negative_noise_in_recycle_is_clipped() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    l.flowsheet.streams_mut()[l.recycle].mol = vec![-1e-9];
    let report = loop_system(&l, tight()).simulate(&mut l.flowsheet).unwrap();
    assert!(report.converged);
    assert!(l.flowsheet.streams()[l.recycle].mol[0] > 0.0);
}

#[test]
fn fixed_runs_replay_the_path() {
    let (count, hook) = counter();
    let mut sys = System::new("runs", vec![hook]).with_n_runs(3);
    let mut flowsheet = FlowsheetBuilder::new(1).build().unwrap();
    let report = sys.simulate(&mut flowsheet).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(report.iterations, 3);
    assert!(report.converged);

    let l = mixer_splitter_loop(&[1.0], 0.5);
    sys.set_recycle(vec![l.recycle]);
    assert_eq!(sys.n_runs(), None);
    sys.set_n_runs(Some(2));
    assert!(sys.recycle().is_empty());
}

#[test]
fn path_without_recycle_runs_once() {
    let mut l = mixer_splitter_loop(&[4.0], 0.25);
    let mut sys = System::new("open", vec![l.mixer.into(), l.splitter.into()]);
    let report = sys.simulate(&mut l.flowsheet).unwrap();
    assert_eq!(report.iterations, 1);
    assert!((l.flowsheet.streams()[l.product].mol[0] - 1.0).abs() < 1e-12);
    assert!((l.flowsheet.streams()[l.recycle].mol[0] - 3.0).abs() < 1e-12);
}

#[test]
fn nested_systems_share_units_and_settings() {
    let l = mixer_splitter_loop(&[10.0], 0.5);
    let (_, hook) = counter();
    let inner = loop_system(&l, ConvergenceConfig::default());
    let mut outer = System::new("outer", vec![inner.into(), hook, l.mixer.into()]);

    assert_eq!(outer.units(), vec![l.mixer, l.splitter]);
    assert_eq!(outer.get_all_recycles(), vec![l.recycle]);
    assert_eq!(outer.subsystems().len(), 1);

    outer.set_tolerance(Some(1e-3), None, None, None, true, Some(50));
    let inner = outer.subsystems()[0];
    assert_eq!(inner.config().molar_tolerance, 1e-3);
    assert_eq!(inner.config().maxiter, 50);

    outer.set_tolerance(Some(0.5), None, None, None, false, None);
    assert_eq!(outer.config().molar_tolerance, 0.5);
    assert_eq!(outer.subsystems()[0].config().molar_tolerance, 1e-3);
}

#[test]
fn stabilized_flag_goes_to_subsystems_of_recycle_free_parents() {
    let l = mixer_splitter_loop(&[10.0], 0.5);
    let inner = loop_system(&l, ConvergenceConfig::default());
    let mut outer = System::new("outer", vec![inner.into()]);
    outer.set_stabilized(true);
    assert!(outer.config().stabilized);
    assert!(outer.subsystems()[0].config().stabilized);

    let inner = loop_system(&l, ConvergenceConfig::default());
    let mut outer = System::new("outer", vec![inner.into()]).with_recycle(vec![l.recycle]);
    outer.set_stabilized(true);
    assert!(outer.config().stabilized);
    assert!(!outer.subsystems()[0].config().stabilized);
}

#[test]
fn feeds_and_products_of_a_loop() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let mut sys = loop_system(&l, tight());
    sys.simulate(&mut l.flowsheet).unwrap();
    let feeds = sys.feeds(&l.flowsheet);
    assert_eq!(feeds.len(), 1);
    assert_eq!(sys.products(&l.flowsheet), vec![l.product]);
    let inlet = sys.get_inlet_flow(&l.flowsheet);
    let outlet = sys.get_outlet_flow(&l.flowsheet);
    assert!((inlet[0] - outlet[0]).abs() < 1e-6);
}

#[test]
fn method_can_be_set_by_name() {
    let mut sys = System::new("s", Vec::new());
    sys.set_method("Wegstein").unwrap();
    assert_eq!(sys.config().method, ConvergenceMethod::Wegstein);
    sys.set_method("fixed point").unwrap();
    assert_eq!(sys.config().method, ConvergenceMethod::FixedPoint);
    assert!(matches!(sys.set_method("broyden"), Err(SystemError::InvalidConfig { .. })));
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let mut sys = loop_system(&l, ConvergenceConfig::default().with_maxiter(0));
    assert!(matches!(
        sys.simulate(&mut l.flowsheet),
        Err(SystemError::InvalidConfig { .. })
    ));
    assert!(l.flowsheet.streams()[l.product].is_empty());
}

#[test]
fn specification_hook_replaces_nested_convergence() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let inner = loop_system(&l, tight()).with_specification(move |system, flowsheet| {
        c.fetch_add(1, Ordering::SeqCst);
        system.converge(flowsheet).map(|_| ())
    });
    assert!(inner.has_specification());
    let mut outer = System::new("outer", vec![inner.into()]);
    outer.simulate(&mut l.flowsheet).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!((l.flowsheet.streams()[l.product].mol[0] - 10.0).abs() < 1e-5);
    assert!(outer.subsystems()[0].has_specification());
}

#[test]
fn facilities_run_once_after_convergence() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let (count, hook) = counter();
    let mut sys = loop_system(&l, tight()).with_facilities(vec![hook]);
    let report = sys.simulate(&mut l.flowsheet).unwrap();
    assert!(report.iterations > 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn facility_loop_converges_after_the_main_path() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let (count, hook) = counter();
    let facility_loop = System::new("facilities", vec![hook]).with_n_runs(2);
    let mut sys = loop_system(&l, tight()).with_facility_loop(facility_loop);
    sys.simulate(&mut l.flowsheet).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(sys.facility_loop().map(|s| s.id()), Some("facilities"));
}

#[test]
fn re_simulating_a_converged_loop_is_quick_and_stable() {
    let mut l = mixer_splitter_loop(&[10.0], 0.4);
    let mut sys = loop_system(&l, tight());
    let first = sys.simulate(&mut l.flowsheet).unwrap();
    let product = l.flowsheet.streams()[l.product].mol.clone();
    let second = sys.simulate(&mut l.flowsheet).unwrap();
    assert!(second.iterations <= first.iterations);
    assert!(second.iterations <= 2);
    assert!((l.flowsheet.streams()[l.product].mol[0] - product[0]).abs() < 1e-6);
}

#[test]
fn emptying_recycles_and_outlets() {
    let mut l = mixer_splitter_loop(&[10.0], 0.5);
    let mut sys = loop_system(&l, tight());
    sys.simulate(&mut l.flowsheet).unwrap();
    sys.empty_recycles(&mut l.flowsheet);
    assert!(l.flowsheet.streams()[l.recycle].is_empty());
    assert_eq!(sys.last_report(), None);
    sys.empty_outlet_streams(&mut l.flowsheet);
    assert!(l.flowsheet.streams()[l.product].is_empty());
    sys.reset_cache(&mut l.flowsheet);
}

/// Splitter whose steady evaluation is counted separately.
struct CountingSplitter {
    inner: Splitter,
    full: Arc<AtomicUsize>,
    steady: Arc<AtomicUsize>,
}

impl Unit for CountingSplitter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn inlets(&self) -> &[StreamId] {
        self.inner.inlets()
    }

    fn outlets(&self) -> &[StreamId] {
        self.inner.outlets()
    }

    fn run(&mut self, streams: &mut StreamArena) -> UnitResult<()> {
        self.full.fetch_add(1, Ordering::SeqCst);
        self.inner.run(streams)
    }

    fn has_steady_run(&self) -> bool {
        true
    }

    fn steady_run(&mut self, streams: &mut StreamArena) -> UnitResult<()> {
        self.steady.fetch_add(1, Ordering::SeqCst);
        self.inner.run(streams)
    }
}

#[test]
fn stabilized_convergence_uses_steady_runs() {
    let full = Arc::new(AtomicUsize::new(0));
    let steady = Arc::new(AtomicUsize::new(0));
    let mut builder = FlowsheetBuilder::new(1);
    let feed = builder
        .add_feed(StreamState::new("feed", 1).with_flows(vec![10.0]))
        .unwrap();
    let recycle = builder.add_stream("recycle");
    let mixed = builder.add_stream("mixed");
    let product = builder.add_stream("product");
    let m = builder.add_unit(Mixer::new("M1", vec![feed, recycle], mixed));
    let s = builder.add_unit(CountingSplitter {
        inner: Splitter::new("S1", mixed, [product, recycle], SplitSpec::Overall(0.25)).unwrap(),
        full: Arc::clone(&full),
        steady: Arc::clone(&steady),
    });
    let mut flowsheet = builder.build().unwrap();
    let mut sys = System::new("stable", vec![m.into(), s.into()])
        .with_recycle(vec![recycle])
        .with_config(tight().with_stabilized(true));
    let report = sys.simulate(&mut flowsheet).unwrap();
    assert!(report.converged);
    assert!(steady.load(Ordering::SeqCst) > 0);
    assert!(full.load(Ordering::SeqCst) > 0);
    assert!((flowsheet.streams()[product].mol[0] - 10.0).abs() < 1e-5);
}

fn volatile_pair() -> Arc<dyn PropertyPackage> {
    Arc::new(
        IdealPackage::from_boiling_points(
            Chemicals::new(["light", "heavy"]),
            &[(340.0, 30_000.0), (380.0, 32_000.0)],
        )
        .unwrap(),
    )
}

#[test]
fn flash_with_liquid_recycle_balances() {
    let mut builder = FlowsheetBuilder::new(2);
    let feed = builder
        .add_feed(
            StreamState::new("feed", 2)
                .with_flows(vec![100.0, 100.0])
                .with_conditions(350.0, 101_325.0),
        )
        .unwrap();
    let recycle = builder.add_stream("liquid recycle");
    let mixed = builder.add_stream("mixed");
    let vapor = builder.add_stream("vapor");
    let liquid = builder.add_stream("liquid");
    let bottoms = builder.add_stream("bottoms");
    let m = builder.add_unit(Mixer::new("M1", vec![feed, recycle], mixed));
    let flash = builder.add_unit(
        StageEquilibrium::new("F1", vec![mixed], vapor, liquid, PhasePair::Vle, volatile_pair())
            .with_partition_coefficients(vec![2.0, 0.5])
            .with_specification(StageSpecification::Boilup(1.0))
            .unwrap(),
    );
    let s = builder.add_unit(
        Splitter::new("S1", liquid, [bottoms, recycle], SplitSpec::Overall(0.6)).unwrap(),
    );
    let mut flowsheet = builder.build().unwrap();
    let mut sys = System::new("flash", vec![m.into(), flash.into(), s.into()])
        .with_recycle(vec![recycle])
        .with_config(tight());
    let report = sys.simulate(&mut flowsheet).unwrap();
    assert!(report.converged);
    let streams = flowsheet.streams();
    for j in 0..2 {
        let out = streams[vapor].mol[j] + streams[bottoms].mol[j];
        assert!((out - 100.0).abs() < 1e-4, "chemical {j}: {out}");
    }
    assert!(streams[vapor].mol[0] > streams[vapor].mol[1]);
}

proptest! {
    #[test]
    fn converged_loop_conserves_mass(fraction in 0.05f64..0.95, feed in 0.1f64..100.0) {
        let mut l = mixer_splitter_loop(&[feed], fraction);
        let mut sys = loop_system(&l, tight());
        let report = sys.simulate(&mut l.flowsheet).unwrap();
        prop_assert!(report.converged);
        let product = l.flowsheet.streams()[l.product].mol[0];
        prop_assert!((product - feed).abs() < 1e-6 * feed.max(1.0));
        let recycle = l.flowsheet.streams()[l.recycle].mol[0];
        prop_assert!((recycle - feed * (1.0 - fraction) / fraction).abs() < 1e-5 * feed.max(1.0));
    }
}
