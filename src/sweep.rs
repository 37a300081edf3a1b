//! Parameter sweeps over k-mer size, abundance threshold and base quality.
//!
//! Each combination of the Cartesian product reruns the whole calling
//! pipeline and scores the resulting table against every expected region.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use thiserror::Error;
use tracing::info;

use crate::compare::{
    CallComparer, CompareError, ExpectedCalls, ExpectedRegion, RegionScore, ThresholdComparer,
    DEFAULT_PERCENT_THRESHOLDS,
};
use crate::config::{CallerParams, ConfigError, SweepAxis, SweepSpec};
use crate::genomics::{
    AlignmentSource, BaseFrequencyRow, CallerError, ContextIndex, KmerVariantCaller, ReadSource,
};

/// Errors raised by a sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Sweep definition or a combination failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pipeline run failed.
    #[error(transparent)]
    Caller(#[from] CallerError),

    /// Ground truth could not be loaded.
    #[error(transparent)]
    Compare(#[from] CompareError),
}

/// Result of one parameter combination.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    /// Parameters used for the run.
    pub params: CallerParams,
    /// Rows in the produced table.
    pub rows: usize,
    /// One score per expected region.
    pub regions: Vec<RegionScore>,
}

/// Expected region together with its parsed calls.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRegion {
    /// Region definition.
    pub region: ExpectedRegion,
    /// Parsed expected calls.
    pub calls: ExpectedCalls,
}

/// Parse every expected region once.
pub fn load_regions(regions: &[ExpectedRegion]) -> Result<Vec<LoadedRegion>, CompareError> {
    regions
        .iter()
        .map(|region| {
            Ok(LoadedRegion {
                calls: ExpectedCalls::from_path(&region.file)?,
                region: region.clone(),
            })
        })
        .collect()
}

/// Score `rows` against every loaded region.
pub fn score_regions<C: CallComparer>(
    comparer: &C,
    rows: &[BaseFrequencyRow],
    regions: &[LoadedRegion],
    thresholds: &[f64],
) -> Vec<RegionScore> {
    regions
        .iter()
        .map(|loaded| comparer.compare(rows, &loaded.region, &loaded.calls, thresholds))
        .collect()
}

/// Cartesian product of the sweep candidates applied over `base`.
///
/// Axes vary in `range_params` order with the first axis slowest. Parameters
/// outside the sweep keep their base value; no axes yields `base` alone.
pub fn combinations(base: &CallerParams, spec: &SweepSpec) -> Vec<CallerParams> {
    if spec.range_params.is_empty() {
        return vec![base.clone()];
    }
    spec.range_params
        .iter()
        .map(|axis| 0..spec.candidates(*axis))
        .multi_cartesian_product()
        .map(|choice| {
            let mut params = base.clone();
            for (axis, idx) in spec.range_params.iter().zip(choice) {
                match axis {
                    SweepAxis::KmerSize => params.kmer_size = spec.kmer_size[idx],
                    SweepAxis::DetectionThresh => params.detection_thresh = spec.detection_thresh[idx],
                    SweepAxis::MinQual => params.min_qual = spec.min_qual[idx],
                }
            }
            params
        })
        .collect()
}

/// Runs the pipeline once per parameter combination.
#[derive(Debug, Clone)]
pub struct ParameterSweep<C = ThresholdComparer> {
    base: CallerParams,
    spec: SweepSpec,
    comparer: C,
    thresholds: Vec<f64>,
}

impl ParameterSweep<ThresholdComparer> {
    /// Sweep scored with [`ThresholdComparer`] at the default thresholds.
    pub fn new(base: CallerParams, spec: SweepSpec) -> Result<Self, SweepError> {
        Self::with_comparer(base, spec, ThresholdComparer)
    }
}

impl<C: CallComparer> ParameterSweep<C> {
    /// Sweep scored with a custom comparer.
    pub fn with_comparer(base: CallerParams, spec: SweepSpec, comparer: C) -> Result<Self, SweepError> {
        spec.validate()?;
        let sweep = Self {
            base,
            spec,
            comparer,
            thresholds: DEFAULT_PERCENT_THRESHOLDS.to_vec(),
        };
        for params in sweep.combinations() {
            params.validate()?;
        }
        Ok(sweep)
    }

    /// Override the percentage thresholds.
    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Parameter combinations in run order.
    pub fn combinations(&self) -> Vec<CallerParams> {
        combinations(&self.base, &self.spec)
    }

    /// Run every combination over the same inputs.
    ///
    /// Context indexes depend only on the k-mer size and are reused across
    /// combinations sharing it.
    pub fn run(
        &self,
        reads: ReadSource<'_>,
        alignment: AlignmentSource<'_>,
        regions: &[LoadedRegion],
    ) -> Result<Vec<SweepEntry>, SweepError> {
        let combos = self.combinations();
        let mut indexes: HashMap<usize, Arc<ContextIndex>> = HashMap::new();
        let mut entries = Vec::with_capacity(combos.len());

        for (n, params) in combos.into_iter().enumerate() {
            let index = match indexes.get(&params.kmer_size) {
                Some(index) => Arc::clone(index),
                None => {
                    let index = Arc::new(reads.index(params.kmer_size).map_err(CallerError::from)?);
                    indexes.insert(params.kmer_size, Arc::clone(&index));
                    index
                }
            };
            let caller = KmerVariantCaller::new(params.clone(), index)?;
            let rows = caller.call(alignment)?;
            let scores = score_regions(&self.comparer, &rows, regions, &self.thresholds);
            info!(combination = n + 1, params = %params, rows = rows.len(), "sweep combination finished");

            entries.push(SweepEntry {
                params,
                rows: rows.len(),
                regions: scores,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_varies_last_axis_fastest() {
        let spec = SweepSpec {
            range_params: vec![SweepAxis::KmerSize, SweepAxis::MinQual],
            kmer_size: vec![9, 11],
            min_qual: vec![10, 20, 30],
            ..SweepSpec::default()
        };
        let combos = combinations(&CallerParams::default(), &spec);
        let keys: Vec<(usize, u8)> = combos.iter().map(|p| (p.kmer_size, p.min_qual)).collect();
        assert_eq!(
            keys,
            vec![(9, 10), (9, 20), (9, 30), (11, 10), (11, 20), (11, 30)]
        );
        assert!(combos
            .iter()
            .all(|p| p.detection_thresh == CallerParams::default().detection_thresh));
    }

    #[test]
    fn empty_sweep_is_the_base_configuration() {
        let base = CallerParams::default();
        assert_eq!(combinations(&base, &SweepSpec::default()), vec![base]);
    }

    #[test]
    fn invalid_candidate_fails_up_front() {
        let spec = SweepSpec {
            range_params: vec![SweepAxis::KmerSize],
            kmer_size: vec![9, 8],
            ..SweepSpec::default()
        };
        assert!(matches!(
            ParameterSweep::new(CallerParams::default(), spec),
            Err(SweepError::Config(ConfigError::InvalidKmerSize(8)))
        ));
    }
}
