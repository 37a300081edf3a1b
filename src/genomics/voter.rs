use std::collections::BTreeMap;

use crate::genomics::{BaseFraction, ContextIndex, ContextSet};

/// Abundance-filtered, duplicate-weighted base fractions for one column.
///
/// Every distinct context k-mer contributes its abundance once to the column
/// total. An observation votes for its base with the duplicate count of its
/// read when its k-mer holds more than `threshold` of that total. Fractions
/// are relative to the passing votes and sorted descending; equal fractions
/// keep base letter order (A, C, G, T).
///
/// Returns an empty vector when nothing passes, including when every context
/// is absent from the index.
pub fn vote(contexts: &ContextSet, index: &ContextIndex, threshold: f64) -> Vec<BaseFraction> {
    let mut abundances: BTreeMap<&[u8], u64> = BTreeMap::new();
    for context in contexts {
        abundances
            .entry(context.kmer.as_slice())
            .or_insert_with(|| index.abundance(&context.kmer));
    }
    let total: u64 = abundances.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut votes: BTreeMap<u8, u64> = BTreeMap::new();
    for context in contexts {
        let abundance = abundances[context.kmer.as_slice()];
        if abundance as f64 / total as f64 > threshold {
            *votes.entry(context.base).or_insert(0) += index.duplicates(&context.sequence);
        }
    }

    let pass_total: u64 = votes.values().sum();
    if pass_total == 0 {
        return Vec::new();
    }

    let mut calls: Vec<BaseFraction> = votes
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(base, count)| BaseFraction {
            base,
            fraction: count as f64 / pass_total as f64,
        })
        .collect();
    calls.sort_by(|a, b| b.fraction.total_cmp(&a.fraction));
    calls
}
