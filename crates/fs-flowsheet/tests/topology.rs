//! Integration tests for flowsheet topology queries.

use fs_flowsheet::{FlowsheetBuilder, FlowsheetError};
use fs_thermo::StreamState;
use fs_units::{Mixer, SplitSpec, Splitter};

#[test]
fn recycle_loop_feeds_and_products() {
    // feed -> [M1] -> mixed -> [S1] -> product
    //           ^                  |
    //           +---- recycle -----+
    let mut builder = FlowsheetBuilder::new(1);
    let feed = builder
        .add_feed(StreamState::new("feed", 1).with_flows(vec![10.0]))
        .unwrap();
    let recycle = builder.add_stream("recycle");
    let mixed = builder.add_stream("mixed");
    let product = builder.add_stream("product");
    let m1 = builder.add_unit(Mixer::new("M1", vec![feed, recycle], mixed));
    let s1 = builder.add_unit(
        Splitter::new("S1", mixed, [product, recycle], SplitSpec::Overall(0.5)).unwrap(),
    );
    let fs = builder.build().unwrap();

    assert_eq!(fs.feeds(), vec![feed]);
    assert_eq!(fs.products(), vec![product]);
    assert_eq!(fs.source(recycle), Some(s1));
    assert_eq!(fs.sink(recycle), Some(m1));
    assert_eq!(fs.source(feed), None);

    // Restricted to the splitter alone, the mixed stream becomes a feed.
    assert_eq!(fs.feeds_of(&[s1]), vec![mixed]);
    assert_eq!(fs.products_of(&[s1]), vec![product, recycle]);
    assert_eq!(fs.find_unit("S1"), Some(s1));
    assert_eq!(fs.unit_name(m1), "M1");
}

#[test]
fn run_units_in_order() {
    let mut builder = FlowsheetBuilder::new(2);
    let a = builder
        .add_feed(StreamState::new("a", 2).with_flows(vec![1.0, 2.0]))
        .unwrap();
    let b = builder.add_stream("b");
    let c = builder.add_stream("c");
    let d = builder.add_stream("d");
    let m = builder.add_unit(Mixer::new("M", vec![a], b));
    let s = builder.add_unit(Splitter::new("S", b, [c, d], SplitSpec::Overall(0.25)).unwrap());
    let mut fs = builder.build().unwrap();

    fs.run_unit(m).unwrap();
    fs.run_unit(s).unwrap();
    assert_eq!(fs.streams()[c].mol, vec![0.25, 0.5]);
    assert_eq!(fs.streams()[d].mol, vec![0.75, 1.5]);
    assert_eq!(fs.unit(s).unwrap().inlets(), &[b]);
}

#[test]
fn unit_failure_is_wrapped_with_name() {
    let mut builder = FlowsheetBuilder::new(2);
    let a = builder
        .add_feed(StreamState::new("a", 2).with_flows(vec![1.0, 2.0]))
        .unwrap();
    let b = builder.add_stream("b");
    let c = builder.add_stream("c");
    let s = builder.add_unit(
        Splitter::new("bad", a, [b, c], SplitSpec::PerComponent(vec![0.5])).unwrap(),
    );
    let mut fs = builder.build().unwrap();
    let err = fs.run_unit(s).unwrap_err();
    assert!(matches!(err, FlowsheetError::Unit { ref unit, .. } if unit == "bad"));
}
