//! Per-generation fitness statistics.

use crate::UNFIT;
use serde::{Deserialize, Serialize};

/// Summary of one generation's fitness values. One is produced per
/// generation, generation 0 included, and the sequence is append-only.
///
/// Unfit (non-finite) values are counted in `unfit` and left out of the
/// other figures, so one unfit individual cannot turn the mean infinite or
/// the deviation NaN. A generation with no finite value reports
/// [`UNFIT`] for best, worst and mean and a deviation of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Generation number (0 = initial population)
    pub generation: usize,
    /// Lowest cost
    pub best: f64,
    /// Highest cost
    pub worst: f64,
    /// Mean cost
    pub mean: f64,
    /// Population standard deviation of the cost
    pub stddev: f64,
    /// Individuals with no finite cost
    #[serde(default)]
    pub unfit: usize,
}

impl GenerationRecord {
    /// Compile statistics for `fitnesses`. Returns `None` for an empty slice.
    pub fn from_fitnesses(generation: usize, fitnesses: &[f64]) -> Option<Self> {
        if fitnesses.is_empty() {
            return None;
        }

        let finite: Vec<f64> = fitnesses.iter().copied().filter(|f| f.is_finite()).collect();
        let unfit = fitnesses.len() - finite.len();
        if finite.is_empty() {
            return Some(Self {
                generation,
                best: UNFIT,
                worst: UNFIT,
                mean: UNFIT,
                stddev: 0.0,
                unfit,
            });
        }

        let count = finite.len() as f64;
        let best = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let worst = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / count;
        let variance = finite.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / count;

        Some(Self {
            generation,
            best,
            worst,
            mean,
            stddev: variance.sqrt(),
            unfit,
        })
    }
}
