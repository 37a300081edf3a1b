use std::sync::Arc;

use mixcall::config::CallerParams;
use mixcall::genomics::{
    vote, AlignedRead, AlignmentSource, BaseFraction, BaseFrequencyRow, ContextIndex, ContextSet,
    KmerVariantCaller, PositionContext, ReadSource,
};

fn context(kmer: &str, base: u8, sequence: &str) -> PositionContext {
    PositionContext {
        kmer: kmer.as_bytes().to_vec(),
        base,
        sequence: sequence.as_bytes().to_vec(),
    }
}

fn mixture_index() -> ContextIndex {
    ContextIndex::build(["AAACCCGGG", "AAACCCGGG", "AAACCCGGG", "AAACTCGGG"], 3)
        .expect("index builds")
}

fn column_four() -> ContextSet {
    [
        context("CCC", b'C', "AAACCCGGG"),
        context("CTC", b'T', "AAACTCGGG"),
    ]
    .into_iter()
    .collect()
}

fn row(calls: Vec<BaseFraction>) -> BaseFrequencyRow {
    BaseFrequencyRow {
        chrom: Arc::from("HXB2"),
        position: 4,
        calls,
    }
}

#[test]
fn minor_variant_survives_low_threshold() {
    let index = mixture_index();
    assert_eq!(index.abundance(b"CCC"), 3);
    assert_eq!(index.abundance(b"CTC"), 1);

    let calls = vote(&column_four(), &index, 0.1);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].base, b'C');
    assert_eq!(row(calls).to_line(), "HXB2\t4\t\t75.0\t\t25.0");
}

#[test]
fn raising_threshold_drops_minor_context() {
    let calls = vote(&column_four(), &mixture_index(), 0.3);
    assert_eq!(row(calls).to_line(), "HXB2\t4\t\t100.0\t\t");
}

#[test]
fn zero_abundance_column_has_no_calls() {
    let index = mixture_index();
    let contexts: ContextSet = [context("TTT", b'T', "AAACCCGGG")].into_iter().collect();
    assert!(vote(&contexts, &index, 0.1).is_empty());
}

#[test]
fn low_quality_reads_leave_no_rows() {
    let reads: Vec<Vec<u8>> = vec![b"AAACCCGGG".to_vec()];
    let params = CallerParams {
        kmer_size: 3,
        detection_thresh: 0.1,
        min_qual: 20,
        ..CallerParams::default()
    };
    let caller = KmerVariantCaller::from_reads(params, ReadSource::Sequences(&reads))
        .expect("index builds");
    let aligned = vec![AlignedRead::ungapped("HXB2", 0, b"AAACCCGGG", 10, false)];

    let rows = caller.call(AlignmentSource::Reads(&aligned)).expect("calling succeeds");
    assert!(rows.is_empty());
}

#[test]
fn reads_with_undetermined_bases_do_not_vote() {
    let reads: Vec<Vec<u8>> = vec![b"AAACCCGGG".to_vec(), b"AAACNCGGG".to_vec()];
    let params = CallerParams {
        kmer_size: 3,
        detection_thresh: 0.1,
        min_qual: 0,
        ..CallerParams::default()
    };
    let caller = KmerVariantCaller::from_reads(params, ReadSource::Sequences(&reads))
        .expect("index builds");
    assert!(!caller.index().contains_read(b"AAACNCGGG"));

    let aligned: Vec<AlignedRead> = reads
        .iter()
        .map(|seq| AlignedRead::ungapped("HXB2", 0, seq, 30, false))
        .collect();
    let rows = caller.call(AlignmentSource::Reads(&aligned)).expect("calling succeeds");
    let at_four = rows.iter().find(|r| r.position == 4).expect("position 4 called");
    assert_eq!(at_four.to_line(), "HXB2\t4\t\t100.0\t\t");
}
