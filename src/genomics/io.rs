use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rust_htslib::bam::{
    self,
    header::{Header, HeaderRecord},
    pileup::{Indel, Pileups},
    record::{Cigar, CigarString},
    Read, Writer,
};
use tracing::debug;

use crate::genomics::pileup::{ColumnSource, PileupError, PileupRead};
use crate::genomics::{AlignedRead, CigarOpKind};

/// Coordinate-sorted BAM opened for a single forward pileup pass.
pub struct AlignmentFile {
    reader: bam::Reader,
    target_names: Vec<Arc<str>>,
    path: PathBuf,
}

impl fmt::Debug for AlignmentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignmentFile")
            .field("path", &self.path)
            .field("target_names", &self.target_names)
            .finish()
    }
}

impl AlignmentFile {
    /// Open a BAM read-only.
    pub fn open(path: &Path) -> Result<Self, PileupError> {
        let reader = bam::Reader::from_path(path).map_err(|source| PileupError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let target_names = reader
            .header()
            .target_names()
            .into_iter()
            .map(|name| Arc::from(String::from_utf8_lossy(name).as_ref()))
            .collect::<Vec<Arc<str>>>();
        debug!(path = %path.display(), targets = target_names.len(), "opened alignment");
        Ok(Self {
            reader,
            target_names,
            path: path.to_path_buf(),
        })
    }

    /// Pileup columns of the whole file, capped at `max_depth` reads per column.
    pub fn columns(&mut self, max_depth: u32) -> BamColumns<'_> {
        let mut pileups = self.reader.pileup();
        pileups.set_max_depth(max_depth);
        BamColumns {
            pileups,
            names: &self.target_names,
        }
    }
}

/// Column source backed by htslib's pileup engine.
pub struct BamColumns<'a> {
    pileups: Pileups<'a, bam::Reader>,
    names: &'a [Arc<str>],
}

impl fmt::Debug for BamColumns<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BamColumns")
            .field("targets", &self.names.len())
            .finish()
    }
}

struct HtsRead {
    record: bam::Record,
    qpos: Option<usize>,
    has_indel: bool,
}

impl PileupRead for HtsRead {
    fn query_position(&self) -> Option<usize> {
        self.qpos
    }

    fn has_indel(&self) -> bool {
        self.has_indel
    }

    fn read_len(&self) -> usize {
        self.record.seq_len()
    }

    fn quality_at(&self, offset: usize) -> Option<u8> {
        self.record.qual().get(offset).copied()
    }

    fn sequence(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.record.seq().as_bytes())
    }

    fn is_reverse(&self) -> bool {
        self.record.is_reverse()
    }
}

impl ColumnSource for BamColumns<'_> {
    fn next_column(
        &mut self,
        visit: &mut dyn FnMut(&dyn PileupRead),
    ) -> Option<Result<(Arc<str>, u32), PileupError>> {
        let pileup = match self.pileups.next()? {
            Ok(pileup) => pileup,
            Err(err) => return Some(Err(err.into())),
        };
        let chrom = match self.names.get(pileup.tid() as usize) {
            Some(name) => Arc::clone(name),
            None => return Some(Err(PileupError::UnknownTarget(pileup.tid()))),
        };

        for alignment in pileup.alignments() {
            let qpos = if alignment.is_del() || alignment.is_refskip() {
                None
            } else {
                alignment.qpos()
            };
            let read = HtsRead {
                record: alignment.record(),
                qpos,
                has_indel: !matches!(alignment.indel(), Indel::None),
            };
            visit(&read);
        }

        Some(Ok((chrom, pileup.pos())))
    }
}

/// Create a coordinate-sorted BAM writer with one `@SQ` line per reference.
///
/// The caller is responsible for writing alignment records using the returned writer.
pub fn create_bam_writer<P: AsRef<Path>>(
    output_path: P,
    references: &[(&str, usize)],
) -> Result<Writer> {
    let mut header = Header::new();

    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", &"1.6");
    hd.push_tag(b"SO", &"coordinate");
    header.push_record(&hd);

    for (name, length) in references {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", name);
        sq.push_tag(b"LN", &(*length as i64));
        header.push_record(&sq);
    }

    let writer = bam::Writer::from_path(output_path, &header, bam::Format::Bam)?;
    Ok(writer)
}

/// Write in-memory reads as BAM records against target `tid`, sorted by position.
pub fn write_aligned_reads(writer: &mut Writer, tid: i32, reads: &[AlignedRead]) -> Result<()> {
    let mut ordered: Vec<&AlignedRead> = reads.iter().collect();
    ordered.sort_by_key(|read| read.pos);

    for (idx, read) in ordered.into_iter().enumerate() {
        let cigar = CigarString(
            read.cigar
                .iter()
                .map(|op| match op.kind {
                    CigarOpKind::Match => Cigar::Match(op.len),
                    CigarOpKind::Insertion => Cigar::Ins(op.len),
                    CigarOpKind::Deletion => Cigar::Del(op.len),
                    CigarOpKind::RefSkip => Cigar::RefSkip(op.len),
                    CigarOpKind::SoftClip => Cigar::SoftClip(op.len),
                    CigarOpKind::HardClip => Cigar::HardClip(op.len),
                })
                .collect(),
        );
        let qname = format!("read{}", idx + 1);

        let mut record = bam::Record::new();
        record.set(qname.as_bytes(), Some(&cigar), &read.sequence, &read.qualities);
        record.unset_unmapped();
        record.set_tid(tid);
        record.set_pos(read.pos as i64);
        record.set_mapq(60);
        record.set_mtid(-1);
        record.set_mpos(-1);
        if read.is_reverse {
            record.set_reverse();
        }
        writer.write(&record)?;
    }

    Ok(())
}
