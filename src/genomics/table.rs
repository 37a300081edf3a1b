//! Per-position base frequency table, the core output artifact.
//!
//! Tables are tab-delimited with a `space pos A C G T` header. Percentages
//! carry one decimal place and are not renormalized after rounding.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::genomics::dna::{base_index, BASES, NUM_BASES};

/// Header columns of the table.
pub const HEADER: [&str; 6] = ["space", "pos", "A", "C", "G", "T"];

/// Errors raised while writing or reading tables.
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O failure.
    #[error("table I/O error on {path}: {source}")]
    Io {
        /// Table path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Table could not be parsed; the source carries the record position.
    #[error("malformed table {path}: {source}")]
    Parse {
        /// Table path.
        path: PathBuf,
        /// csv error.
        #[source]
        source: csv::Error,
    },

    /// Header differs from `space pos A C G T`.
    #[error("unexpected table header in {path}: '{found}'")]
    Header {
        /// Table path.
        path: PathBuf,
        /// Header as found.
        found: String,
    },
}

/// Fraction of passing votes for one base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseFraction {
    /// Called base.
    pub base: u8,
    /// Share of duplicate-weighted votes, in `[0, 1]`.
    pub fraction: f64,
}

/// Ranked base calls at one reference position.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseFrequencyRow {
    /// Reference name.
    pub chrom: Arc<str>,
    /// 0-based reference position.
    pub position: u32,
    /// Calls sorted by descending fraction.
    pub calls: Vec<BaseFraction>,
}

impl BaseFrequencyRow {
    /// Percentage for `base`, if it received any passing vote.
    pub fn percent(&self, base: u8) -> Option<f64> {
        self.calls
            .iter()
            .find(|call| call.base == base)
            .map(|call| call.fraction * 100.0)
    }

    /// Percentages in `A C G T` order.
    pub fn percentages(&self) -> [Option<f64>; NUM_BASES] {
        let mut out = [None; NUM_BASES];
        for call in &self.calls {
            if let Some(idx) = base_index(call.base) {
                out[idx] = Some(call.fraction * 100.0);
            }
        }
        out
    }

    /// Tab-separated line without the trailing newline.
    pub fn to_line(&self) -> String {
        let mut fields = vec![self.chrom.to_string(), self.position.to_string()];
        fields.extend(
            self.percentages()
                .iter()
                .map(|pct| pct.map(format_percent).unwrap_or_default()),
        );
        fields.join("\t")
    }
}

/// One decimal place, matching the table format.
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}", percent)
}

/// Write the header and `rows` to `writer`.
pub fn write_table<W: Write>(writer: &mut W, rows: &[BaseFrequencyRow]) -> std::io::Result<()> {
    writeln!(writer, "{}", HEADER.join("\t"))?;
    for row in rows {
        writeln!(writer, "{}", row.to_line())?;
    }
    writer.flush()
}

/// Render rows into a table string (useful for tests and snapshots).
pub fn render_table(rows: &[BaseFrequencyRow]) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_table(&mut buffer, rows);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Streaming table writer that only materializes the destination on
/// [`TableWriter::finish`]. Dropping it unfinished removes the partial file.
#[derive(Debug)]
pub struct TableWriter {
    inner: BufWriter<NamedTempFile>,
    path: PathBuf,
    rows: usize,
}

impl TableWriter {
    /// Start a table destined for `path`; the temporary file lives next to it.
    pub fn create(path: &Path) -> Result<Self, TableError> {
        let io_err = |source| TableError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        let mut inner = BufWriter::new(tmp);
        writeln!(inner, "{}", HEADER.join("\t")).map_err(io_err)?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Append one row.
    pub fn write_row(&mut self, row: &BaseFrequencyRow) -> Result<(), TableError> {
        writeln!(self.inner, "{}", row.to_line()).map_err(|source| TableError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and move the table into place.
    pub fn finish(self) -> Result<PathBuf, TableError> {
        let path = self.path;
        let tmp = self.inner.into_inner().map_err(|err| TableError::Io {
            path: path.clone(),
            source: err.into_error(),
        })?;
        tmp.persist(&path).map_err(|err| TableError::Io {
            path: path.clone(),
            source: err.error,
        })?;
        Ok(path)
    }
}

#[derive(Debug, Deserialize)]
struct TableRecord {
    space: String,
    pos: u32,
    #[serde(rename = "A")]
    a: Option<f64>,
    #[serde(rename = "C")]
    c: Option<f64>,
    #[serde(rename = "G")]
    g: Option<f64>,
    #[serde(rename = "T")]
    t: Option<f64>,
}

/// Parse a table written by [`TableWriter`] back into rows.
///
/// Calls are re-ranked by descending percentage; fractions carry the
/// one-decimal rounding of the file.
pub fn read_table(path: &Path) -> Result<Vec<BaseFrequencyRow>, TableError> {
    let parse_err = |source: csv::Error| TableError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(parse_err)?;

    let headers = reader.headers().map_err(parse_err)?;
    if headers.iter().ne(HEADER) {
        return Err(TableError::Header {
            path: path.to_path_buf(),
            found: headers.iter().collect::<Vec<_>>().join("\t"),
        });
    }

    let mut rows = Vec::new();
    for record in reader.deserialize::<TableRecord>() {
        let record = record.map_err(parse_err)?;
        let mut calls: Vec<BaseFraction> = BASES
            .iter()
            .zip([record.a, record.c, record.g, record.t])
            .filter_map(|(&base, percent)| {
                percent.map(|percent| BaseFraction {
                    base,
                    fraction: percent / 100.0,
                })
            })
            .collect();
        calls.sort_by(|a, b| b.fraction.total_cmp(&a.fraction));

        rows.push(BaseFrequencyRow {
            chrom: Arc::from(record.space),
            position: record.pos,
            calls,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(position: u32, calls: &[(u8, f64)]) -> BaseFrequencyRow {
        BaseFrequencyRow {
            chrom: Arc::from("HXB2"),
            position,
            calls: calls
                .iter()
                .map(|&(base, fraction)| BaseFraction { base, fraction })
                .collect(),
        }
    }

    #[test]
    fn line_leaves_missing_bases_empty() {
        let line = row(7, &[(b'C', 0.75), (b'T', 0.25)]).to_line();
        assert_eq!(line, "HXB2\t7\t\t75.0\t\t25.0");
    }

    #[test]
    fn percentages_are_not_renormalized() {
        let third = 1.0 / 3.0;
        let line = row(0, &[(b'A', third), (b'C', third), (b'G', third)]).to_line();
        assert_eq!(line, "HXB2\t0\t33.3\t33.3\t33.3\t");
    }

    #[test]
    fn writer_round_trips_through_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample-variations.tsv");
        let rows = vec![row(3, &[(b'G', 0.9), (b'A', 0.1)]), row(4, &[(b'T', 1.0)])];

        let mut writer = TableWriter::create(&path).unwrap();
        for r in &rows {
            writer.write_row(r).unwrap();
        }
        assert!(!path.exists(), "table must not appear before finish");
        writer.finish().unwrap();

        let parsed = read_table(&path).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].calls[0].base, b'G');
        assert_eq!(parsed[0].to_line(), "HXB2\t3\t10.0\t\t90.0\t");
        assert_eq!(parsed[1].percent(b'T').map(format_percent), Some("100.0".to_string()));
    }

    #[test]
    fn abandoned_writer_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.tsv");
        {
            let mut writer = TableWriter::create(&path).unwrap();
            writer.write_row(&row(1, &[(b'A', 1.0)])).unwrap();
        }
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn malformed_rows_report_their_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        std::fs::write(&path, "space\tpos\tA\tC\tG\tT\nHXB2\t1\t100.0\t\t\t\nHXB2\tx\t\t\t\t\n")
            .unwrap();
        match read_table(&path) {
            Err(TableError::Parse { source, .. }) => {
                assert_eq!(source.position().map(|pos| pos.line()), Some(3));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn foreign_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.tsv");
        std::fs::write(&path, "chrom\tpos\tA\tC\tG\tT\n").unwrap();
        assert!(matches!(read_table(&path), Err(TableError::Header { .. })));
    }
}
