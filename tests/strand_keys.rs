use mixcall::config::{CallerParams, StrandMode};
use mixcall::genomics::{AlignedRead, MemoryPileup, PileupWalker, PositionContext};
use test_case::test_case;

fn context_at(read: AlignedRead, position: u32, strand_mode: StrandMode) -> Option<PositionContext> {
    let params = CallerParams {
        kmer_size: 3,
        min_qual: 0,
        strand_mode,
        ..CallerParams::default()
    };
    PileupWalker::new(MemoryPileup::new(vec![read]), &params)
        .expect("valid parameters")
        .map(|column| column.expect("in-memory pileup never fails"))
        .find(|column| column.position == position)
        .and_then(|column| column.contexts.into_iter().next())
}

#[test_case(false, StrandMode::Legacy, "ACG", "AACGT" ; "forward legacy")]
#[test_case(false, StrandMode::Strict, "ACG", "AACGT" ; "forward strict")]
#[test_case(true, StrandMode::Legacy, "ACG", "ACGTT" ; "reverse legacy")]
#[test_case(true, StrandMode::Strict, "CGT", "ACGTT" ; "reverse strict")]
fn strand_keys(is_reverse: bool, mode: StrandMode, kmer: &str, sequence: &str) {
    let read = AlignedRead::ungapped("HXB2", 10, b"AACGT", 30, is_reverse);
    let context = context_at(read, 12, mode).expect("column 12 has a context");

    assert_eq!(context.kmer, kmer.as_bytes());
    assert_eq!(context.sequence, sequence.as_bytes());
    assert_eq!(context.base, b'C');
}

#[test_case(10 ; "first base")]
#[test_case(14 ; "last base")]
fn read_ends_lack_a_full_window(position: u32) {
    let read = AlignedRead::ungapped("HXB2", 10, b"AACGT", 30, false);
    assert!(context_at(read, position, StrandMode::Legacy).is_none());
}
