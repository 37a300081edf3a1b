//! # K-mer context variant calling for mixed viral samples
//!
//! Low-frequency variants in deeply sequenced, multiplexed HIV samples are
//! easily masked by sequencing error. This crate calls per-position base
//! frequencies using only reads whose local sequence context is well
//! represented in the corrected read pool.
//!
//! ## Pipeline
//!
//! 1. **Context index**: count every k-mer of the corrected reads and every
//!    distinct read sequence.
//! 2. **Pileup walk**: for each aligned column, take the k-mer centered on
//!    each read's call (quality, flank and indel filtered).
//! 3. **Base vote**: drop contexts below an abundance fraction of the column,
//!    weight the remaining calls by read duplicate count, normalize.
//! 4. **Sweep & score**: repeat for a grid of parameters and score each table
//!    against expected mixtures.
//!
//! ## Usage Example
//!
//! ```ignore
//! use mixcall::config::CallerParams;
//! use mixcall::genomics::{AlignmentSource, KmerVariantCaller, ReadSource};
//!
//! let params = CallerParams { kmer_size: 13, ..CallerParams::default() };
//! let caller = KmerVariantCaller::from_reads(params, ReadSource::File(reads.as_ref()))?;
//! caller.write_table(AlignmentSource::Bam(bam.as_ref()), out.as_ref())?;
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod compare;   // Scoring against expected mixtures
pub mod config;    // Parameters and pipeline configuration
pub mod genomics;  // Index, pileup walker, voter, tables
pub mod pipeline;  // Parallel per-sample tasks
pub mod sweep;     // Parameter sweeps

// Re-exports for convenience
pub use compare::{CallComparer, ClassCounts, ExpectedRegion, RegionScore, ThresholdComparer};
pub use config::{CallerParams, ConfigError, PipelineConfig, StrandMode, SweepAxis, SweepSpec};
pub use genomics::{BaseFrequencyRow, ContextIndex, KmerVariantCaller};
pub use sweep::{ParameterSweep, SweepEntry};
