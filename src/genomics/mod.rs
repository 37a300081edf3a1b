//! Genomics components of the caller: the k-mer context index, the pileup
//! walker, the base voter and the frequency table they produce.
//!
//! Data flows leaves first: [`ContextIndex`] is built from corrected reads,
//! [`PileupWalker`] yields per-column [`PositionContext`] sets, [`vote`] turns
//! each set into ranked [`BaseFraction`]s and [`KmerVariantCaller`] writes the
//! resulting [`BaseFrequencyRow`]s.

mod caller;
mod context_index;
pub mod dna;
mod io;
mod pileup;
mod table;
mod types;
mod voter;

pub use caller::{
    variation_table_path, AlignmentSource, CallSummary, CallerError, KmerVariantCaller, ReadSource,
};
pub use context_index::{ContextIndex, IndexError, IndexStats, SHARD_READS};
pub use io::{create_bam_writer, write_aligned_reads, AlignmentFile, BamColumns};
pub use pileup::{
    ColumnSource, ContextExtractor, ContextSet, MemoryPileup, PileupColumn, PileupError,
    PileupRead, PileupWalker, PositionContext, MISSING_QUALITY,
};
pub use table::{
    format_percent, read_table, render_table, write_table, BaseFraction, BaseFrequencyRow,
    TableError, TableWriter, HEADER,
};
pub use types::{AlignedRead, CigarOp, CigarOpKind};
pub use voter::vote;
