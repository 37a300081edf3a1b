#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mixcall::config::CallerParams;
use mixcall::genomics::AlignedRead;

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("MIXCALL_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set MIXCALL_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Three copies of a majority haplotype and one minor haplotype differing at
/// position 4.
pub fn mixture_reads() -> Vec<Vec<u8>> {
    ["AAACCCGGG", "AAACCCGGG", "AAACCCGGG", "AAACTCGGG"]
        .iter()
        .map(|read| read.as_bytes().to_vec())
        .collect()
}

/// Forward, ungapped alignments of `reads` at position 0 of `HXB2`.
pub fn aligned(reads: &[Vec<u8>]) -> Vec<AlignedRead> {
    reads
        .iter()
        .map(|seq| AlignedRead::ungapped("HXB2", 0, seq, 30, false))
        .collect()
}

pub fn mixture_params(kmer_size: usize, detection_thresh: f64) -> CallerParams {
    CallerParams {
        kmer_size,
        detection_thresh,
        min_qual: 20,
        ..CallerParams::default()
    }
}

pub fn write_fasta(path: &Path, reads: &[Vec<u8>]) {
    let mut text = String::new();
    for (idx, read) in reads.iter().enumerate() {
        text.push_str(&format!(">read{}\n{}\n", idx + 1, String::from_utf8_lossy(read)));
    }
    fs::write(path, text).expect("write fasta");
}
