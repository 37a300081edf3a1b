//! Abundance table of read k-mers and duplicate counts of whole reads.
//!
//! The index is built once per corrected read set and never mutated
//! afterwards; callers share it behind an `Arc` with no locking.

use std::collections::HashMap;
use std::path::Path;

use needletail::parse_fastx_file;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{validate_kmer_size, ConfigError};
use crate::genomics::dna::is_determinate;

/// Reads counted per parallel shard when building from a file.
pub const SHARD_READS: usize = 100_000;

/// Errors raised while building the context index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// k-mer size precondition failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Read file could not be opened or parsed.
    #[error("unreadable read set {path}: {message}")]
    Unreadable {
        /// Path of the read file.
        path: String,
        /// Parser message.
        message: String,
    },
}

/// Counters describing a finished build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Reads enumerated from the input.
    pub reads_seen: u64,
    /// Reads skipped because of an undetermined base.
    pub reads_skipped: u64,
}

/// K-mer abundance table plus read duplicate counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextIndex {
    kmer_size: usize,
    abundance: HashMap<Vec<u8>, u64>,
    duplicates: HashMap<Vec<u8>, u64>,
    stats: IndexStats,
}

impl ContextIndex {
    /// Empty index for `kmer_size`, validated to be odd.
    pub fn new(kmer_size: usize) -> Result<Self, IndexError> {
        validate_kmer_size(kmer_size)?;
        Ok(Self {
            kmer_size,
            abundance: HashMap::new(),
            duplicates: HashMap::new(),
            stats: IndexStats::default(),
        })
    }

    /// Build sequentially from an in-memory read collection.
    pub fn build<I>(reads: I, kmer_size: usize) -> Result<Self, IndexError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut index = Self::new(kmer_size)?;
        for read in reads {
            index.consume(read.as_ref());
        }
        Ok(index)
    }

    /// Build from a slice of reads, counting shards in parallel.
    pub fn build_parallel<S>(reads: &[S], kmer_size: usize) -> Result<Self, IndexError>
    where
        S: AsRef<[u8]> + Sync,
    {
        let empty = Self::new(kmer_size)?;
        Ok(empty.absorb_parallel(reads))
    }

    /// Build from a FASTA/FASTQ file (optionally gzipped).
    pub fn from_fastx(path: &Path, kmer_size: usize) -> Result<Self, IndexError> {
        let mut index = Self::new(kmer_size)?;
        let unreadable = |message: String| IndexError::Unreadable {
            path: path.display().to_string(),
            message,
        };
        let mut reader = parse_fastx_file(path).map_err(|err| unreadable(err.to_string()))?;

        let mut shard: Vec<Vec<u8>> = Vec::with_capacity(SHARD_READS);
        while let Some(record) = reader.next() {
            let record = record.map_err(|err| unreadable(err.to_string()))?;
            shard.push(record.seq().into_owned());
            if shard.len() == SHARD_READS {
                index = index.absorb_parallel(&shard);
                shard.clear();
                debug!(reads = index.stats.reads_seen, "context index shard merged");
            }
        }
        if !shard.is_empty() {
            index = index.absorb_parallel(&shard);
        }

        info!(
            path = %path.display(),
            kmer_size,
            reads = index.stats.reads_seen,
            skipped = index.stats.reads_skipped,
            distinct_kmers = index.distinct_kmers(),
            distinct_reads = index.distinct_reads(),
            "context index built"
        );
        Ok(index)
    }

    /// Count one read. Reads with an undetermined base are skipped entirely.
    pub fn consume(&mut self, read: &[u8]) {
        self.stats.reads_seen += 1;
        if !is_determinate(read) {
            self.stats.reads_skipped += 1;
            return;
        }
        *self.duplicates.entry(read.to_vec()).or_insert(0) += 1;
        if read.len() >= self.kmer_size {
            for window in read.windows(self.kmer_size) {
                *self.abundance.entry(window.to_vec()).or_insert(0) += 1;
            }
        }
    }

    /// Fold `other` into `self` by summation.
    pub fn merge(&mut self, other: Self) {
        debug_assert_eq!(self.kmer_size, other.kmer_size);
        for (kmer, count) in other.abundance {
            *self.abundance.entry(kmer).or_insert(0) += count;
        }
        for (read, count) in other.duplicates {
            *self.duplicates.entry(read).or_insert(0) += count;
        }
        self.stats.reads_seen += other.stats.reads_seen;
        self.stats.reads_skipped += other.stats.reads_skipped;
    }

    fn absorb_parallel<S>(mut self, reads: &[S]) -> Self
    where
        S: AsRef<[u8]> + Sync,
    {
        let kmer_size = self.kmer_size;
        let empty = || Self {
            kmer_size,
            abundance: HashMap::new(),
            duplicates: HashMap::new(),
            stats: IndexStats::default(),
        };
        let partial = reads
            .par_iter()
            .fold(empty, |mut acc, read| {
                acc.consume(read.as_ref());
                acc
            })
            .reduce(empty, |mut left, right| {
                left.merge(right);
                left
            });
        self.merge(partial);
        self
    }

    /// Configured k-mer length.
    pub fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    /// Occurrences of `kmer` across the read set (0 when unseen).
    pub fn abundance(&self, kmer: &[u8]) -> u64 {
        self.abundance.get(kmer).copied().unwrap_or(0)
    }

    /// Number of reads with exactly this sequence (0 when unseen).
    pub fn duplicates(&self, read: &[u8]) -> u64 {
        self.duplicates.get(read).copied().unwrap_or(0)
    }

    /// Whether `read` is a key of the duplicate table.
    pub fn contains_read(&self, read: &[u8]) -> bool {
        self.duplicates.contains_key(read)
    }

    /// Number of distinct k-mers.
    pub fn distinct_kmers(&self) -> usize {
        self.abundance.len()
    }

    /// Number of distinct read sequences.
    pub fn distinct_reads(&self) -> usize {
        self.duplicates.len()
    }

    /// Build counters.
    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}
