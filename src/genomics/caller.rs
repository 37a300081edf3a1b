use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CallerParams, ConfigError, StrandMode};
use crate::genomics::io::AlignmentFile;
use crate::genomics::pileup::{ColumnSource, MemoryPileup, PileupColumn, PileupError, PileupWalker};
use crate::genomics::table::{BaseFrequencyRow, TableError, TableWriter};
use crate::genomics::voter::vote;
use crate::genomics::{AlignedRead, ContextIndex, IndexError};

/// Errors originating from a calling run.
#[derive(Debug, Error)]
pub enum CallerError {
    /// Parameters failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Read set could not be indexed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Alignment could not be walked.
    #[error(transparent)]
    Pileup(#[from] PileupError),

    /// Output table could not be written.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The supplied index was built for another k.
    #[error("context index built with k={index} but caller expects k={params}")]
    KmerMismatch {
        /// k of the index.
        index: usize,
        /// k of the parameters.
        params: usize,
    },
}

/// Corrected read collection feeding the context index.
#[derive(Debug, Clone, Copy)]
pub enum ReadSource<'a> {
    /// FASTA/FASTQ file, optionally gzipped.
    File(&'a Path),
    /// Sequences already in memory.
    Sequences(&'a [Vec<u8>]),
}

impl ReadSource<'_> {
    /// Build the context index for `kmer_size`.
    pub fn index(&self, kmer_size: usize) -> Result<ContextIndex, IndexError> {
        match self {
            Self::File(path) => ContextIndex::from_fastx(path, kmer_size),
            Self::Sequences(reads) => ContextIndex::build_parallel(*reads, kmer_size),
        }
    }
}

/// Aligned read collection walked column by column.
#[derive(Debug, Clone, Copy)]
pub enum AlignmentSource<'a> {
    /// Coordinate-sorted BAM.
    Bam(&'a Path),
    /// Aligned reads already in memory.
    Reads(&'a [AlignedRead]),
}

/// Outcome of writing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    /// Destination of the table.
    pub table: PathBuf,
    /// Columns visited.
    pub columns: usize,
    /// Rows written.
    pub rows: usize,
}

/// K-mer context variant caller for one sample.
///
/// Owns validated parameters and shares the read-only context index.
#[derive(Debug, Clone)]
pub struct KmerVariantCaller {
    params: CallerParams,
    index: Arc<ContextIndex>,
}

impl KmerVariantCaller {
    /// Caller over an existing index; `index` must match `params.kmer_size`.
    pub fn new(params: CallerParams, index: Arc<ContextIndex>) -> Result<Self, CallerError> {
        params.validate()?;
        if index.kmer_size() != params.kmer_size {
            return Err(CallerError::KmerMismatch {
                index: index.kmer_size(),
                params: params.kmer_size,
            });
        }
        if params.strand_mode == StrandMode::Legacy {
            debug!("legacy strand mode: reverse-strand contexts stay in alignment orientation");
        }
        Ok(Self { params, index })
    }

    /// Validate parameters, then index `reads`.
    pub fn from_reads(params: CallerParams, reads: ReadSource<'_>) -> Result<Self, CallerError> {
        params.validate()?;
        let index = reads.index(params.kmer_size)?;
        Self::new(params, Arc::new(index))
    }

    /// Parameters of this caller.
    pub fn params(&self) -> &CallerParams {
        &self.params
    }

    /// Shared context index.
    pub fn index(&self) -> &Arc<ContextIndex> {
        &self.index
    }

    /// Row for one column, or `None` when no call passes.
    pub fn call_column(&self, column: &PileupColumn) -> Option<BaseFrequencyRow> {
        let calls = vote(&column.contexts, &self.index, self.params.detection_thresh);
        if calls.is_empty() {
            return None;
        }
        Some(BaseFrequencyRow {
            chrom: Arc::clone(&column.chrom),
            position: column.position,
            calls,
        })
    }

    /// Call every column of `alignment` into memory.
    pub fn call(&self, alignment: AlignmentSource<'_>) -> Result<Vec<BaseFrequencyRow>, CallerError> {
        let mut rows = Vec::new();
        self.for_each_row(alignment, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Stream every row of `alignment` into a table at `out`. Nothing is left
    /// at `out` if the run fails.
    pub fn write_table(
        &self,
        alignment: AlignmentSource<'_>,
        out: &Path,
    ) -> Result<CallSummary, CallerError> {
        let mut writer = TableWriter::create(out)?;
        let columns = self.for_each_row(alignment, |row| {
            writer.write_row(&row)?;
            Ok(())
        })?;
        let rows = writer.rows();
        let table = writer.finish()?;
        info!(table = %table.display(), columns, rows, params = %self.params, "variation table written");
        Ok(CallSummary {
            table,
            columns,
            rows,
        })
    }

    fn for_each_row<F>(&self, alignment: AlignmentSource<'_>, mut sink: F) -> Result<usize, CallerError>
    where
        F: FnMut(BaseFrequencyRow) -> Result<(), CallerError>,
    {
        match alignment {
            AlignmentSource::Bam(path) => {
                let mut file = AlignmentFile::open(path)?;
                let columns = file.columns(self.params.max_depth);
                let walker = PileupWalker::new(columns, &self.params)?;
                let drained = self.drain(walker, &mut sink);
                drained
            }
            AlignmentSource::Reads(reads) => {
                let source = MemoryPileup::new(reads.to_vec());
                self.drain(PileupWalker::new(source, &self.params)?, &mut sink)
            }
        }
    }

    fn drain<S, F>(&self, walker: PileupWalker<S>, sink: &mut F) -> Result<usize, CallerError>
    where
        S: ColumnSource,
        F: FnMut(BaseFrequencyRow) -> Result<(), CallerError>,
    {
        let mut columns = 0usize;
        let mut empty = 0usize;
        for column in walker {
            let column = column?;
            columns += 1;
            match self.call_column(&column) {
                Some(row) => sink(row)?,
                None => empty += 1,
            }
        }
        if columns > 0 && empty == columns {
            warn!(columns, "no column produced a passing call");
        }
        debug!(columns, empty, "pileup walk finished");
        Ok(columns)
    }
}

/// `<alignment stem>-variations.tsv` inside `out_dir`.
pub fn variation_table_path(out_dir: &Path, alignment: &Path) -> PathBuf {
    let stem = alignment
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "alignment".to_string());
    out_dir.join(format!("{stem}-variations.tsv"))
}
