#[path = "common/mod.rs"]
mod common;

use std::collections::HashSet;
use std::sync::Arc;

use blake3::hash;
use common::{aligned, mixture_params, mixture_reads};
use mixcall::genomics::{AlignmentSource, ContextIndex, KmerVariantCaller};

#[test]
fn repeated_runs_write_identical_tables() {
    let reads = mixture_reads();
    let alignments = aligned(&reads);
    let dir = tempfile::tempdir().expect("tempdir");

    let mut fingerprints = HashSet::new();
    for run in 0..5 {
        // Alternate sequential and sharded index builds.
        let index = if run % 2 == 0 {
            ContextIndex::build(&reads, 3)
        } else {
            ContextIndex::build_parallel(&reads, 3)
        }
        .expect("index builds");
        let caller = KmerVariantCaller::new(mixture_params(3, 0.1), Arc::new(index))
            .expect("caller initialises");

        let out = dir.path().join(format!("run{run}-variations.tsv"));
        caller
            .write_table(AlignmentSource::Reads(&alignments), &out)
            .expect("table written");
        let bytes = std::fs::read(&out).expect("table readable");
        fingerprints.insert(hash(&bytes));
    }

    assert_eq!(fingerprints.len(), 1, "outputs diverged across runs");
}
