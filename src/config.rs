//! Caller parameters and the pipeline configuration file.
//!
//! Parameters are validated once, before any reads are touched: an even or
//! zero k-mer size or a threshold outside `(0, 1)` aborts the run up front.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::compare::{ExpectedRegion, DEFAULT_PERCENT_THRESHOLDS};

/// Default samtools/pysam pileup depth cap.
pub const DEFAULT_MAX_DEPTH: u32 = 8000;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// k-mer sizes must be odd so the context is centered on the call.
    #[error("k-mer size must be a positive odd number, got {0}")]
    InvalidKmerSize(usize),

    /// Abundance threshold is a fraction in the open interval (0, 1).
    #[error("detection threshold must lie in (0, 1), got {0}")]
    InvalidDetectionThreshold(f64),

    /// Pileup depth cap of zero would discard every read.
    #[error("max depth must be > 0")]
    InvalidMaxDepth,

    /// Sweep definition is inconsistent.
    #[error("invalid sweep: {0}")]
    InvalidSweep(String),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// How reverse-strand reads are keyed.
///
/// **Warning:** `Legacy` reproduces the historical behavior where the context
/// k-mer is taken in alignment orientation while the full-sequence key is
/// reverse complemented. Context abundances of reverse-strand reads are then
/// looked up on the opposite strand from their duplicate counts. `Strict`
/// reverse complements both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrandMode {
    /// Context as aligned, full sequence normalized.
    #[default]
    Legacy,
    /// Context and full sequence both normalized.
    Strict,
}

/// Parameters consumed by the caller for one run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CallerParams {
    /// Context k-mer length (odd).
    pub kmer_size: usize,
    /// Minimum fraction of a column's context abundance a k-mer must exceed.
    pub detection_thresh: f64,
    /// Minimum Phred base quality of the call.
    pub min_qual: u8,
    /// Reverse-strand keying.
    pub strand_mode: StrandMode,
    /// Pileup depth cap per column.
    pub max_depth: u32,
}

impl Default for CallerParams {
    fn default() -> Self {
        Self {
            kmer_size: 13,
            detection_thresh: 0.01,
            min_qual: 20,
            strand_mode: StrandMode::Legacy,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl CallerParams {
    /// Check every precondition of a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_kmer_size(self.kmer_size)?;
        if !(self.detection_thresh > 0.0 && self.detection_thresh < 1.0) {
            return Err(ConfigError::InvalidDetectionThreshold(self.detection_thresh));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }
        Ok(())
    }

    /// Flank length on each side of the call, `(k - 1) / 2`.
    pub fn extend(&self) -> usize {
        self.kmer_size.saturating_sub(1) / 2
    }
}

impl fmt::Display for CallerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kmer_size={} detection_thresh={} min_qual={}",
            self.kmer_size, self.detection_thresh, self.min_qual
        )
    }
}

/// Reject even or zero k-mer sizes.
pub fn validate_kmer_size(kmer_size: usize) -> Result<(), ConfigError> {
    if kmer_size == 0 || kmer_size % 2 == 0 {
        return Err(ConfigError::InvalidKmerSize(kmer_size));
    }
    Ok(())
}

/// Parameter that can be swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    /// [`CallerParams::kmer_size`].
    KmerSize,
    /// [`CallerParams::detection_thresh`].
    DetectionThresh,
    /// [`CallerParams::min_qual`].
    MinQual,
}

impl SweepAxis {
    /// Configuration key of the axis.
    pub fn name(self) -> &'static str {
        match self {
            Self::KmerSize => "kmer_size",
            Self::DetectionThresh => "detection_thresh",
            Self::MinQual => "min_qual",
        }
    }
}

/// Candidate values per axis plus the axis order of the product.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweepSpec {
    /// Axis order; the first axis varies slowest.
    pub range_params: Vec<SweepAxis>,
    /// Candidate k-mer sizes.
    pub kmer_size: Vec<usize>,
    /// Candidate detection thresholds.
    pub detection_thresh: Vec<f64>,
    /// Candidate minimum qualities.
    pub min_qual: Vec<u8>,
}

impl SweepSpec {
    /// Number of candidates listed for `axis`.
    pub fn candidates(&self, axis: SweepAxis) -> usize {
        match axis {
            SweepAxis::KmerSize => self.kmer_size.len(),
            SweepAxis::DetectionThresh => self.detection_thresh.len(),
            SweepAxis::MinQual => self.min_qual.len(),
        }
    }

    /// Check that axes are unique, each swept axis has candidates and no
    /// candidates are given for an axis outside `range_params`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, axis) in self.range_params.iter().enumerate() {
            if self.range_params[..idx].contains(axis) {
                return Err(ConfigError::InvalidSweep(format!(
                    "axis '{}' listed twice",
                    axis.name()
                )));
            }
            if self.candidates(*axis) == 0 {
                return Err(ConfigError::InvalidSweep(format!(
                    "axis '{}' has no candidate values",
                    axis.name()
                )));
            }
        }
        for axis in [SweepAxis::KmerSize, SweepAxis::DetectionThresh, SweepAxis::MinQual] {
            if self.candidates(axis) > 0 && !self.range_params.contains(&axis) {
                return Err(ConfigError::InvalidSweep(format!(
                    "candidates given for '{}' but it is missing from range_params",
                    axis.name()
                )));
            }
        }
        Ok(())
    }
}

/// `[algorithm]` section of the pipeline file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    /// Base caller parameters.
    #[serde(flatten)]
    pub params: CallerParams,
    /// Worker threads for per-sample tasks.
    pub cores: usize,
    /// Reuse an existing output table instead of recomputing it.
    pub reuse_existing: bool,
    /// Percentage thresholds used when scoring against expected regions.
    pub percent_thresholds: Vec<f64>,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            params: CallerParams::default(),
            cores: 1,
            reuse_existing: true,
            percent_thresholds: DEFAULT_PERCENT_THRESHOLDS.to_vec(),
        }
    }
}

/// `[dir]` section of the pipeline file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DirConfig {
    /// Directory receiving the variation tables.
    pub vrn: PathBuf,
}

impl Default for DirConfig {
    fn default() -> Self {
        Self {
            vrn: PathBuf::from("variation"),
        }
    }
}

/// One demultiplexed sample handed over by the preprocessing stages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleConfig {
    /// Sorted, indexed BAM.
    pub alignment: PathBuf,
    /// Corrected reads (FASTA/FASTQ, optionally gzipped).
    pub reads: PathBuf,
}

/// Full pipeline configuration as read from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    /// Algorithm parameters.
    #[serde(default)]
    pub algorithm: AlgorithmConfig,
    /// Optional parameter sweep; when present every sample is swept.
    #[serde(default)]
    pub sweep: Option<SweepSpec>,
    /// Output directories.
    #[serde(default)]
    pub dir: DirConfig,
    /// Samples to process.
    #[serde(default, rename = "sample")]
    pub samples: Vec<SampleConfig>,
    /// Ground-truth regions used for scoring.
    #[serde(default)]
    pub expected: Vec<ExpectedRegion>,
}

impl PipelineConfig {
    /// Parse a configuration from TOML text; relative paths are kept as written.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, resolving relative paths against its directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    /// Validate the base parameters and the sweep definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.algorithm.params.validate()?;
        if let Some(sweep) = &self.sweep {
            sweep.validate()?;
            for &k in &sweep.kmer_size {
                validate_kmer_size(k)?;
            }
            for &t in &sweep.detection_thresh {
                if !(t > 0.0 && t < 1.0) {
                    return Err(ConfigError::InvalidDetectionThreshold(t));
                }
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.dir.vrn);
        for sample in &mut self.samples {
            resolve(&mut sample.alignment);
            resolve(&mut sample.reads);
        }
        for region in &mut self.expected {
            resolve(&mut region.file);
        }
    }
}
