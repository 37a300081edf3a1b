//! Batch execution of per-sample calling tasks.
//!
//! Samples are independent: each task owns its context index and output
//! table, and a failing task is reported without stopping the others.

use std::path::PathBuf;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use thiserror::Error;
use tracing::{error, info};

use crate::compare::{RegionScore, ThresholdComparer};
use crate::config::{PipelineConfig, SampleConfig};
use crate::genomics::{
    read_table, variation_table_path, AlignmentSource, CallerError, KmerVariantCaller, ReadSource,
};
use crate::sweep::{load_regions, score_regions, LoadedRegion, ParameterSweep, SweepEntry, SweepError};

/// Errors that prevent the batch from starting.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Ground truth or sweep definition is unusable.
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

/// Output of one successful sample task.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleReport {
    /// Single-configuration run.
    Called {
        /// Variation table.
        table: PathBuf,
        /// Rows in the table.
        rows: usize,
        /// Whether an existing table was reused.
        reused: bool,
        /// Scores per expected region.
        regions: Vec<RegionScore>,
    },
    /// Parameter sweep.
    Swept {
        /// One entry per parameter combination.
        entries: Vec<SweepEntry>,
    },
}

/// Result of one sample task.
#[derive(Debug)]
pub struct SampleOutcome {
    /// Alignment the task processed.
    pub alignment: PathBuf,
    /// Report, or the error that aborted the task.
    pub result: Result<SampleReport, SweepError>,
}

/// Run every configured sample on a pool of `algorithm.cores` workers.
pub fn run_pipeline(config: &PipelineConfig) -> Result<Vec<SampleOutcome>, PipelineError> {
    config.validate().map_err(SweepError::from)?;
    let regions = load_regions(&config.expected).map_err(SweepError::from)?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.algorithm.cores.max(1))
        .build()?;

    info!(
        samples = config.samples.len(),
        cores = config.algorithm.cores,
        regions = regions.len(),
        "starting pipeline"
    );
    let outcomes: Vec<SampleOutcome> = pool.install(|| {
        config
            .samples
            .par_iter()
            .map(|sample| {
                let result = run_sample(config, sample, &regions);
                if let Err(err) = &result {
                    error!(alignment = %sample.alignment.display(), "sample failed: {err}");
                }
                SampleOutcome {
                    alignment: sample.alignment.clone(),
                    result,
                }
            })
            .collect()
    });
    Ok(outcomes)
}

/// Process one sample: sweep when configured, otherwise call and score.
pub fn run_sample(
    config: &PipelineConfig,
    sample: &SampleConfig,
    regions: &[LoadedRegion],
) -> Result<SampleReport, SweepError> {
    let reads = ReadSource::File(&sample.reads);
    let alignment = AlignmentSource::Bam(&sample.alignment);

    if let Some(spec) = &config.sweep {
        let sweep = ParameterSweep::new(config.algorithm.params.clone(), spec.clone())?
            .with_thresholds(config.algorithm.percent_thresholds.clone());
        let entries = sweep.run(reads, alignment, regions)?;
        return Ok(SampleReport::Swept { entries });
    }

    let out = variation_table_path(&config.dir.vrn, &sample.alignment);
    let (rows, reused) = if config.algorithm.reuse_existing && out.exists() {
        info!(table = %out.display(), "reusing existing variation table");
        (read_table(&out).map_err(CallerError::from)?, true)
    } else {
        let caller = KmerVariantCaller::from_reads(config.algorithm.params.clone(), reads)?;
        caller.write_table(alignment, &out)?;
        (read_table(&out).map_err(CallerError::from)?, false)
    };

    let scores = score_regions(
        &ThresholdComparer,
        &rows,
        regions,
        &config.algorithm.percent_thresholds,
    );
    Ok(SampleReport::Called {
        table: out,
        rows: rows.len(),
        reused,
        regions: scores,
    })
}
