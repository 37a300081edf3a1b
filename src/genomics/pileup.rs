use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{CallerParams, ConfigError, StrandMode};
use crate::genomics::dna::reverse_complement;
use crate::genomics::{AlignedRead, CigarOpKind};

/// Quality byte htslib stores when a record carries no qualities.
pub const MISSING_QUALITY: u8 = 0xff;

/// Errors surfaced while walking an alignment.
#[derive(Debug, Error)]
pub enum PileupError {
    /// The alignment file could not be opened.
    #[error("failed to open alignment {path}: {source}")]
    Open {
        /// Path of the alignment.
        path: String,
        /// htslib error.
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// htslib failed while producing a pileup column.
    #[error("pileup read error: {0}")]
    Read(#[from] rust_htslib::errors::Error),

    /// A column referenced a target missing from the header.
    #[error("pileup column references unknown target id {0}")]
    UnknownTarget(u32),
}

/// One observation of a read at a column: the centered context k-mer, the
/// called base and the full read sequence used as the duplicate-count key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionContext {
    /// Context window centered on the call.
    pub kmer: Vec<u8>,
    /// Base called at the column, in alignment orientation.
    pub base: u8,
    /// Whole read sequence, strand-normalized.
    pub sequence: Vec<u8>,
}

/// Distinct observations at one column.
pub type ContextSet = BTreeSet<PositionContext>;

/// Contexts gathered at one covered reference position.
#[derive(Debug, Clone, PartialEq)]
pub struct PileupColumn {
    /// Reference name.
    pub chrom: Arc<str>,
    /// 0-based reference position.
    pub position: u32,
    /// Reads covering the column, before any filtering.
    pub depth: u32,
    /// Deduplicated contexts of the reads that passed filtering.
    pub contexts: ContextSet,
}

/// A read as seen from one pileup column.
pub trait PileupRead {
    /// Offset of the aligned base in the read; `None` on a deletion or skip.
    fn query_position(&self) -> Option<usize>;
    /// Whether an insertion or deletion starts right after this base.
    fn has_indel(&self) -> bool;
    /// Number of bases in the read.
    fn read_len(&self) -> usize;
    /// Numeric Phred quality at `offset`.
    fn quality_at(&self, offset: usize) -> Option<u8>;
    /// Read sequence in alignment orientation.
    fn sequence(&self) -> Cow<'_, [u8]>;
    /// Whether the read aligned to the reverse strand.
    fn is_reverse(&self) -> bool;
}

/// Ordered producer of pileup columns.
pub trait ColumnSource {
    /// Advance one column, handing every covering read to `visit`, and return
    /// its reference name and position. `None` once the alignment is exhausted.
    fn next_column(
        &mut self,
        visit: &mut dyn FnMut(&dyn PileupRead),
    ) -> Option<Result<(Arc<str>, u32), PileupError>>;
}

/// Turns a covering read into a [`PositionContext`].
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    kmer_size: usize,
    extend: usize,
    min_qual: u8,
    strand_mode: StrandMode,
}

impl ContextExtractor {
    /// Extractor for `params`, rejected when they fail validation.
    pub fn new(params: &CallerParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            kmer_size: params.kmer_size,
            extend: params.extend(),
            min_qual: params.min_qual,
            strand_mode: params.strand_mode,
        })
    }

    /// Context of `read` at the current column, or `None` when the read is
    /// excluded (indel, short flank, low quality).
    pub fn extract(&self, read: &dyn PileupRead) -> Option<PositionContext> {
        let qpos = read.query_position()?;
        if read.has_indel() {
            return None;
        }
        if qpos < self.extend || qpos + self.extend >= read.read_len() {
            return None;
        }
        let quality = read.quality_at(qpos)?;
        let passes = if quality == MISSING_QUALITY {
            self.min_qual == 0
        } else {
            quality >= self.min_qual
        };
        if !passes {
            return None;
        }

        let sequence = read.sequence();
        let window = sequence.get(qpos - self.extend..qpos + self.extend + 1)?;
        debug_assert_eq!(window.len(), self.kmer_size);
        let base = sequence[qpos];

        let (kmer, sequence) = if read.is_reverse() {
            let kmer = match self.strand_mode {
                StrandMode::Legacy => window.to_vec(),
                StrandMode::Strict => reverse_complement(window),
            };
            (kmer, reverse_complement(&sequence))
        } else {
            (window.to_vec(), sequence.into_owned())
        };

        Some(PositionContext {
            kmer,
            base,
            sequence,
        })
    }
}

/// Single forward pass over the columns of a source.
#[derive(Debug)]
pub struct PileupWalker<S> {
    source: S,
    extractor: ContextExtractor,
}

impl<S: ColumnSource> PileupWalker<S> {
    /// Walk `source` with the given parameters.
    pub fn new(source: S, params: &CallerParams) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            extractor: ContextExtractor::new(params)?,
        })
    }
}

impl<S: ColumnSource> Iterator for PileupWalker<S> {
    type Item = Result<PileupColumn, PileupError>;

    fn next(&mut self) -> Option<Self::Item> {
        let extractor = &self.extractor;
        let mut contexts = ContextSet::new();
        let mut depth = 0u32;
        let step = self.source.next_column(&mut |read| {
            depth += 1;
            if let Some(context) = extractor.extract(read) {
                contexts.insert(context);
            }
        })?;

        Some(step.map(|(chrom, position)| PileupColumn {
            chrom,
            position,
            depth,
            contexts,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnEntry {
    read: usize,
    qpos: Option<usize>,
    has_indel: bool,
}

struct MemoryRead<'a> {
    read: &'a AlignedRead,
    entry: ColumnEntry,
}

impl PileupRead for MemoryRead<'_> {
    fn query_position(&self) -> Option<usize> {
        self.entry.qpos
    }

    fn has_indel(&self) -> bool {
        self.entry.has_indel
    }

    fn read_len(&self) -> usize {
        self.read.len()
    }

    fn quality_at(&self, offset: usize) -> Option<u8> {
        self.read.quality_at(offset)
    }

    fn sequence(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.read.sequence)
    }

    fn is_reverse(&self) -> bool {
        self.read.is_reverse
    }
}

/// Column source over in-memory reads, following each read's CIGAR the way
/// htslib's pileup engine does.
///
/// References are ordered by first appearance in the input.
#[derive(Debug)]
pub struct MemoryPileup {
    reads: Vec<AlignedRead>,
    chroms: Vec<Arc<str>>,
    columns: BTreeMap<(usize, u32), Vec<ColumnEntry>>,
}

impl MemoryPileup {
    /// Lay out the pileup columns of `reads`.
    pub fn new(reads: Vec<AlignedRead>) -> Self {
        let mut chroms: Vec<Arc<str>> = Vec::new();
        let mut columns: BTreeMap<(usize, u32), Vec<ColumnEntry>> = BTreeMap::new();

        for (read_idx, read) in reads.iter().enumerate() {
            let rank = match chroms.iter().position(|c| *c == read.chrom) {
                Some(rank) => rank,
                None => {
                    chroms.push(Arc::clone(&read.chrom));
                    chroms.len() - 1
                }
            };

            let mut ref_pos = read.pos;
            let mut qpos = 0usize;
            for (op_idx, op) in read.cigar.iter().enumerate() {
                match op.kind {
                    CigarOpKind::Match => {
                        let next_is_indel = matches!(
                            read.cigar.get(op_idx + 1).map(|next| next.kind),
                            Some(CigarOpKind::Insertion | CigarOpKind::Deletion)
                        );
                        for step in 0..op.len {
                            columns.entry((rank, ref_pos)).or_default().push(ColumnEntry {
                                read: read_idx,
                                qpos: Some(qpos),
                                has_indel: next_is_indel && step + 1 == op.len,
                            });
                            ref_pos += 1;
                            qpos += 1;
                        }
                    }
                    CigarOpKind::Deletion | CigarOpKind::RefSkip => {
                        for _ in 0..op.len {
                            columns.entry((rank, ref_pos)).or_default().push(ColumnEntry {
                                read: read_idx,
                                qpos: None,
                                has_indel: false,
                            });
                            ref_pos += 1;
                        }
                    }
                    CigarOpKind::Insertion | CigarOpKind::SoftClip => qpos += op.len as usize,
                    CigarOpKind::HardClip => {}
                }
            }
        }

        Self {
            reads,
            chroms,
            columns,
        }
    }

}

impl ColumnSource for MemoryPileup {
    fn next_column(
        &mut self,
        visit: &mut dyn FnMut(&dyn PileupRead),
    ) -> Option<Result<(Arc<str>, u32), PileupError>> {
        let ((rank, position), entries) = self.columns.pop_first()?;
        for entry in entries {
            let view = MemoryRead {
                read: &self.reads[entry.read],
                entry,
            };
            visit(&view);
        }
        Some(Ok((Arc::clone(&self.chroms[rank]), position)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::CigarOp;

    fn params(kmer_size: usize, min_qual: u8, strand_mode: StrandMode) -> CallerParams {
        CallerParams {
            kmer_size,
            min_qual,
            strand_mode,
            ..CallerParams::default()
        }
    }

    fn contexts_at(reads: Vec<AlignedRead>, params: &CallerParams, position: u32) -> ContextSet {
        PileupWalker::new(MemoryPileup::new(reads), params)
            .unwrap()
            .map(|column| column.unwrap())
            .find(|column| column.position == position)
            .map(|column| column.contexts)
            .unwrap_or_default()
    }

    #[test]
    fn columns_follow_reference_order() {
        let reads = vec![
            AlignedRead::ungapped("chrB", 5, b"ACG", 30, false),
            AlignedRead::ungapped("chrA", 0, b"ACG", 30, false),
            AlignedRead::ungapped("chrB", 0, b"ACG", 30, false),
        ];
        let walked: Vec<(String, u32)> =
            PileupWalker::new(MemoryPileup::new(reads), &params(3, 0, StrandMode::Legacy))
                .unwrap()
                .map(|column| column.unwrap())
                .map(|column| (column.chrom.to_string(), column.position))
                .collect();
        let expected: Vec<(String, u32)> = [0, 1, 2, 5, 6, 7]
            .iter()
            .map(|&p| ("chrB".to_string(), p))
            .chain([0, 1, 2].iter().map(|&p| ("chrA".to_string(), p)))
            .collect();
        assert_eq!(walked, expected);
    }

    #[test]
    fn read_ends_are_excluded() {
        let reads = vec![AlignedRead::ungapped("chr1", 0, b"ACGTA", 30, false)];
        let p = params(3, 0, StrandMode::Legacy);
        assert!(contexts_at(reads.clone(), &p, 0).is_empty());
        assert!(contexts_at(reads.clone(), &p, 4).is_empty());
        let middle = contexts_at(reads, &p, 2);
        let context = middle.iter().next().unwrap();
        assert_eq!(context.kmer, b"CGT".to_vec());
        assert_eq!(context.base, b'G');
        assert_eq!(context.sequence, b"ACGTA".to_vec());
    }

    #[test]
    fn low_quality_calls_are_skipped() {
        let mut qualities = vec![30u8; 5];
        qualities[2] = 10;
        let read = AlignedRead::new(
            "chr1",
            0,
            vec![CigarOp::new(CigarOpKind::Match, 5)],
            b"ACGTA".to_vec(),
            qualities,
            false,
        );
        let p = params(3, 20, StrandMode::Legacy);
        assert!(contexts_at(vec![read.clone()], &p, 2).is_empty());
        assert_eq!(contexts_at(vec![read], &p, 1).len(), 1);
    }

    #[test]
    fn indel_columns_are_skipped() {
        let read = AlignedRead::new(
            "chr1",
            0,
            vec![
                CigarOp::new(CigarOpKind::Match, 3),
                CigarOp::new(CigarOpKind::Deletion, 1),
                CigarOp::new(CigarOpKind::Match, 3),
            ],
            b"ACGTAC".to_vec(),
            vec![30; 6],
            false,
        );
        let p = params(3, 0, StrandMode::Legacy);
        // Base before the deletion carries the indel event.
        assert!(contexts_at(vec![read.clone()], &p, 2).is_empty());
        // Deleted reference base has no call.
        assert!(contexts_at(vec![read.clone()], &p, 3).is_empty());
        let after = contexts_at(vec![read], &p, 5);
        assert_eq!(after.iter().next().unwrap().kmer, b"TAC".to_vec());
    }

    #[test]
    fn reverse_reads_key_on_reverse_complement() {
        let read = AlignedRead::ungapped("chr1", 0, b"AACGT", 30, true);
        let legacy = contexts_at(vec![read.clone()], &params(3, 0, StrandMode::Legacy), 2);
        let context = legacy.iter().next().unwrap();
        assert_eq!(context.kmer, b"ACG".to_vec());
        assert_eq!(context.base, b'C');
        assert_eq!(context.sequence, b"ACGTT".to_vec());

        let strict = contexts_at(vec![read], &params(3, 0, StrandMode::Strict), 2);
        let context = strict.iter().next().unwrap();
        assert_eq!(context.kmer, b"CGT".to_vec());
        assert_eq!(context.base, b'C');
        assert_eq!(context.sequence, b"ACGTT".to_vec());
    }

    #[test]
    fn duplicate_observations_collapse() {
        let reads = vec![
            AlignedRead::ungapped("chr1", 0, b"ACGTA", 30, false),
            AlignedRead::ungapped("chr1", 0, b"ACGTA", 30, false),
            AlignedRead::ungapped("chr1", 0, b"ACCTA", 30, false),
        ];
        let column = PileupWalker::new(MemoryPileup::new(reads), &params(3, 0, StrandMode::Legacy))
            .unwrap()
            .map(|column| column.unwrap())
            .find(|column| column.position == 2)
            .unwrap();
        assert_eq!(column.depth, 3);
        assert_eq!(column.contexts.len(), 2);
    }

    #[test]
    fn invalid_parameters_are_rejected_up_front() {
        let reads = vec![AlignedRead::ungapped("chr1", 0, b"ACGTA", 30, false)];
        let zero = params(0, 0, StrandMode::Legacy);
        assert_eq!(zero.extend(), 0);
        assert!(matches!(
            PileupWalker::new(MemoryPileup::new(reads), &zero),
            Err(ConfigError::InvalidKmerSize(0))
        ));
        assert!(matches!(
            ContextExtractor::new(&params(4, 0, StrandMode::Strict)),
            Err(ConfigError::InvalidKmerSize(4))
        ));
    }
}
