//! Scoring observed base frequencies against expected mixtures.
//!
//! An expected region is a TSV with a `pos` column and `A C G T` percentage
//! columns (other columns are ignored, empty cells mean 0). Observed rows are
//! matched at `pos + offset`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::genomics::dna::{BASES, NUM_BASES};
use crate::genomics::BaseFrequencyRow;

/// Percentage thresholds scored by default, most stringent first.
pub const DEFAULT_PERCENT_THRESHOLDS: [f64; 7] = [50.0, 25.0, 10.0, 5.0, 2.0, 1.0, 0.5];

/// Errors raised while reading ground truth.
#[derive(Debug, Error)]
pub enum CompareError {
    /// Expected file could not be read or parsed.
    #[error("failed to read expected calls {path}: {source}")]
    Read {
        /// Expected file path.
        path: PathBuf,
        /// csv error, positioned when a record is at fault.
        #[source]
        source: csv::Error,
    },

    /// Header lacks a required column.
    #[error("expected calls {path} have no '{column}' column")]
    MissingColumn {
        /// Expected file path.
        path: PathBuf,
        /// Missing column name.
        column: &'static str,
    },
}

/// Named ground-truth region.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpectedRegion {
    /// Region label used in reports.
    pub name: String,
    /// Expected-call TSV.
    pub file: PathBuf,
    /// Added to expected positions to reach observed coordinates.
    #[serde(default)]
    pub offset: i64,
    /// Restrict matching to this reference name.
    #[serde(default)]
    pub space: Option<String>,
}

/// One row of an expected-call TSV; unknown columns are ignored and empty
/// or absent base columns mean 0.
#[derive(Debug, Deserialize)]
struct ExpectedRecord {
    pos: i64,
    #[serde(rename = "A", default)]
    a: Option<f64>,
    #[serde(rename = "C", default)]
    c: Option<f64>,
    #[serde(rename = "G", default)]
    g: Option<f64>,
    #[serde(rename = "T", default)]
    t: Option<f64>,
}

/// Expected percentages per position, `A C G T` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedCalls {
    positions: BTreeMap<i64, [f64; NUM_BASES]>,
}

impl ExpectedCalls {
    /// Build from `(position, [A, C, G, T])` pairs.
    pub fn from_positions<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = (i64, [f64; NUM_BASES])>,
    {
        Self {
            positions: positions.into_iter().collect(),
        }
    }

    /// Parse an expected-call TSV.
    pub fn from_path(path: &Path) -> Result<Self, CompareError> {
        let read_err = |source: csv::Error| CompareError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(read_err)?;
        if !reader.headers().map_err(read_err)?.iter().any(|name| name == "pos") {
            return Err(CompareError::MissingColumn {
                path: path.to_path_buf(),
                column: "pos",
            });
        }

        let mut positions = BTreeMap::new();
        for record in reader.deserialize::<ExpectedRecord>() {
            let record = record.map_err(read_err)?;
            let percents = [record.a, record.c, record.g, record.t].map(|pct| pct.unwrap_or(0.0));
            positions.insert(record.pos, percents);
        }
        debug!(path = %path.display(), positions = positions.len(), "expected calls loaded");
        Ok(Self { positions })
    }

    /// Number of expected positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no position is expected.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate `(position, percentages)` in position order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[f64; NUM_BASES])> {
        self.positions.iter().map(|(pos, pct)| (*pos, pct))
    }
}

/// Outcome of one expected-vs-observed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Same bases above threshold.
    Correct,
    /// Some but not all bases agree.
    Partial,
    /// No base agrees.
    Wrong,
}

/// Tallies of classifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    /// Exact agreement.
    pub correct: usize,
    /// Partial agreement.
    pub partial: usize,
    /// Disagreement.
    pub wrong: usize,
}

impl ClassCounts {
    /// Record one classification.
    pub fn add(&mut self, class: Classification) {
        match class {
            Classification::Correct => self.correct += 1,
            Classification::Partial => self.partial += 1,
            Classification::Wrong => self.wrong += 1,
        }
    }

    /// Total positions scored.
    pub fn total(&self) -> usize {
        self.correct + self.partial + self.wrong
    }
}

/// Counts at one percentage threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdScore {
    /// Percentage threshold.
    pub percent: f64,
    /// Classification counts.
    pub counts: ClassCounts,
}

/// Scores of one region across thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionScore {
    /// Region label.
    pub region: String,
    /// One entry per threshold, in the order requested.
    pub scores: Vec<ThresholdScore>,
}

impl RegionScore {
    /// Counts at `percent`, if that threshold was scored.
    pub fn at(&self, percent: f64) -> Option<ClassCounts> {
        self.scores
            .iter()
            .find(|score| score.percent == percent)
            .map(|score| score.counts)
    }
}

/// Pluggable comparison of a frequency table with ground truth.
pub trait CallComparer {
    /// Score `rows` against `expected` for every threshold in `thresholds`.
    fn compare(
        &self,
        rows: &[BaseFrequencyRow],
        region: &ExpectedRegion,
        expected: &ExpectedCalls,
        thresholds: &[f64],
    ) -> RegionScore;
}

/// Set comparison of the bases at or above each percentage threshold.
///
/// Equal sets are correct, overlapping sets partial, anything else wrong. A
/// position without an observed row has an empty observed set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdComparer;

/// Bases at or above `percent`, as a bit set in `A C G T` order.
fn bases_at_or_above(percents: &[Option<f64>; NUM_BASES], percent: f64) -> u8 {
    percents
        .iter()
        .enumerate()
        .filter(|(_, pct)| pct.map_or(false, |p| p >= percent))
        .fold(0u8, |acc, (idx, _)| acc | (1 << idx))
}

/// Classify one expected/observed pair at `percent`.
pub fn classify(
    expected: &[Option<f64>; NUM_BASES],
    observed: &[Option<f64>; NUM_BASES],
    percent: f64,
) -> Classification {
    let want = bases_at_or_above(expected, percent);
    let have = bases_at_or_above(observed, percent);
    if want == have {
        Classification::Correct
    } else if want & have != 0 {
        Classification::Partial
    } else {
        Classification::Wrong
    }
}

impl CallComparer for ThresholdComparer {
    fn compare(
        &self,
        rows: &[BaseFrequencyRow],
        region: &ExpectedRegion,
        expected: &ExpectedCalls,
        thresholds: &[f64],
    ) -> RegionScore {
        let mut observed: BTreeMap<i64, [Option<f64>; NUM_BASES]> = BTreeMap::new();
        for row in rows {
            if let Some(space) = &region.space {
                if row.chrom.as_ref() != space.as_str() {
                    continue;
                }
            }
            observed.entry(row.position as i64).or_insert_with(|| row.percentages());
        }

        let mut scores: Vec<ThresholdScore> = thresholds
            .iter()
            .map(|&percent| ThresholdScore {
                percent,
                counts: ClassCounts::default(),
            })
            .collect();
        let mut unmatched = 0usize;
        for (position, percents) in expected.iter() {
            let want = percents.map(Some);
            let have = match observed.get(&(position + region.offset)) {
                Some(have) => *have,
                None => {
                    unmatched += 1;
                    [None; NUM_BASES]
                }
            };
            for score in &mut scores {
                score.counts.add(classify(&want, &have, score.percent));
            }
        }
        debug!(region = %region.name, expected = expected.len(), unmatched, "region scored");

        RegionScore {
            region: region.name.clone(),
            scores,
        }
    }
}

/// Markdown summary of a region score, most stringent threshold first.
pub fn render_summary(score: &RegionScore) -> String {
    let mut ordered = score.scores.clone();
    ordered.sort_by(|a, b| b.percent.total_cmp(&a.percent));

    let mut out = String::new();
    let _ = writeln!(out, "** {}", score.region);
    let _ = writeln!(out, "| Percent | Correct | Wrong (partial) | Wrong |");
    let _ = writeln!(out, "|---------+---------+-----------------+-------|");
    for entry in ordered {
        let _ = writeln!(
            out,
            "| {:>7} | {:>7} | {:>15} | {:>5} |",
            entry.percent, entry.counts.correct, entry.counts.partial, entry.counts.wrong
        );
    }
    out
}
