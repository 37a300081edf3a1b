#[path = "common/mod.rs"]
mod common;

use common::{aligned, mixture_params, mixture_reads};
use mixcall::compare::{ExpectedCalls, ExpectedRegion};
use mixcall::config::{SweepAxis, SweepSpec};
use mixcall::genomics::{AlignmentSource, ReadSource};
use mixcall::sweep::{LoadedRegion, ParameterSweep};

fn pol_region() -> LoadedRegion {
    LoadedRegion {
        region: ExpectedRegion {
            name: "pol".to_string(),
            file: "pol.tsv".into(),
            offset: 0,
            space: None,
        },
        calls: ExpectedCalls::from_positions([(4, [0.0, 75.0, 0.0, 25.0])]),
    }
}

#[test]
fn two_kmer_sizes_yield_two_tagged_entries() {
    let reads = mixture_reads();
    let alignments = aligned(&reads);
    let spec = SweepSpec {
        range_params: vec![SweepAxis::KmerSize, SweepAxis::DetectionThresh],
        kmer_size: vec![3, 5],
        detection_thresh: vec![0.1],
        ..SweepSpec::default()
    };
    let sweep = ParameterSweep::new(mixture_params(13, 0.01), spec)
        .expect("sweep is valid")
        .with_thresholds(vec![10.0]);

    let entries = sweep
        .run(
            ReadSource::Sequences(&reads),
            AlignmentSource::Reads(&alignments),
            &[pol_region()],
        )
        .expect("sweep runs");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].params.kmer_size, 3);
    assert_eq!(entries[1].params.kmer_size, 5);
    for entry in &entries {
        assert_eq!(entry.params.detection_thresh, 0.1);
        assert_eq!(entry.regions.len(), 1);
        assert_eq!(entry.regions[0].region, "pol");
    }
    // Columns 1..=7 at k=3, 2..=6 at k=5.
    assert_eq!(entries[0].rows, 7);
    assert_eq!(entries[1].rows, 5);
    assert_eq!(entries[0].regions[0].at(10.0).map(|c| c.correct), Some(1));
}

#[test]
fn threshold_sweep_separates_minor_variant() {
    let reads = mixture_reads();
    let alignments = aligned(&reads);
    let spec = SweepSpec {
        range_params: vec![SweepAxis::DetectionThresh],
        detection_thresh: vec![0.1, 0.3],
        ..SweepSpec::default()
    };
    let sweep = ParameterSweep::new(mixture_params(3, 0.01), spec)
        .expect("sweep is valid")
        .with_thresholds(vec![10.0]);

    let entries = sweep
        .run(
            ReadSource::Sequences(&reads),
            AlignmentSource::Reads(&alignments),
            &[pol_region()],
        )
        .expect("sweep runs");

    let at_ten: Vec<_> = entries
        .iter()
        .map(|entry| entry.regions[0].at(10.0).expect("threshold scored"))
        .collect();
    assert_eq!((at_ten[0].correct, at_ten[0].partial), (1, 0));
    assert_eq!((at_ten[1].correct, at_ten[1].partial), (0, 1));
}
