//! Onset-aligned response averaging and peak latency estimation.
//!
//! The condition-independent sibling of the tuning engine: every stimulus
//! onset contributes one fixed post-onset window, pooled across all onsets
//! seen so far. Unlike the tuning engine this recomputes from scratch on
//! every pull rather than folding incrementally; keep it that way — the
//! asymmetry changes when statistics become visible and long sessions rely
//! on the current timing.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::accumulator::SpikeTrains;
use crate::stats;

/// Length of the post-onset accumulation window, seconds
pub const AVERAGE_WINDOW: f64 = 0.152;
/// Histogram bin width, seconds
pub const AVERAGE_BIN_SIZE: f64 = 0.001;
/// Number of bins covering the accumulation window
pub const AVERAGE_BIN_COUNT: usize = 152;
/// Gaussian smoothing width, in bins
pub const AVERAGE_SMOOTH_SIGMA: f64 = 10.0;

/// Read-only per-unit view of the averaged response
#[derive(Debug, Clone, Serialize)]
pub struct PeakSnapshot {
    /// Pooled rate curve, spikes/second per bin
    pub histogram: Vec<f64>,
    pub smoothed_histogram: Vec<f64>,
    /// Left edge of each bin, seconds after stimulus onset
    pub bins: Vec<f64>,
    /// Bin indices of the smoothed curve's local maxima
    pub maxima: Vec<usize>,
    /// Bin indices of the smoothed curve's local minima
    pub minima: Vec<usize>,
    /// Bin time of the greatest-valued local maximum, if any
    pub peak_time: Option<f64>,
}

/// Snapshot map: channel -> unit -> averaged response
pub type AverageData = BTreeMap<u16, BTreeMap<u16, PeakSnapshot>>;

/// Left bin edges of the accumulation window
pub fn average_bin_starts() -> Vec<f64> {
    (0..AVERAGE_BIN_COUNT)
        .map(|i| i as f64 * AVERAGE_BIN_SIZE)
        .collect()
}

/// The onset-aligned averaging engine
#[derive(Debug, Default)]
pub struct OnsetAverager {
    /// Every stimulus-onset timestamp seen so far
    onsets: Vec<f64>,
}

impl OnsetAverager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly observed onset timestamps
    pub fn extend_onsets(&mut self, onsets: impl IntoIterator<Item = f64>) {
        self.onsets.extend(onsets);
    }

    pub fn onset_count(&self) -> usize {
        self.onsets.len()
    }

    /// Recompute the averaged response of every unit from scratch over all
    /// onsets seen so far.
    pub fn compute(&self, spikes: &SpikeTrains) -> AverageData {
        let bins = average_bin_starts();
        let mut data: AverageData = BTreeMap::new();

        for (key, train) in spikes.iter() {
            let mut pooled = Vec::new();
            for &onset in &self.onsets {
                pooled.extend(
                    train
                        .iter()
                        .filter(|&&t| t >= onset && t < onset + AVERAGE_WINDOW)
                        .map(|&t| t - onset),
                );
            }

            let counts = stats::bin_counts(&pooled, AVERAGE_BIN_COUNT, AVERAGE_BIN_SIZE);
            let histogram = stats::rate_curve(&counts, AVERAGE_BIN_SIZE, self.onsets.len());
            let smoothed = stats::gaussian_smooth(&histogram, AVERAGE_SMOOTH_SIGMA);
            let (maxima, minima) = stats::local_extrema(&smoothed);

            let peak_time = maxima
                .iter()
                .copied()
                .fold(None::<usize>, |best, idx| match best {
                    Some(b) if smoothed[b] >= smoothed[idx] => Some(b),
                    _ => Some(idx),
                })
                .map(|idx| bins[idx]);

            data.entry(key.channel).or_default().insert(
                key.unit,
                PeakSnapshot {
                    histogram,
                    smoothed_histogram: smoothed,
                    bins: bins.clone(),
                    maxima,
                    minima,
                    peak_time,
                },
            );
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitKey;

    fn trains_with(key: UnitKey, timestamps: Vec<f64>) -> SpikeTrains {
        let mut trains = SpikeTrains::new();
        let mut batch = BTreeMap::new();
        batch.insert(key, timestamps);
        trains.append_batch(batch);
        trains
    }

    #[test]
    fn test_single_onset_normalization() {
        let key = UnitKey::new(3, 1);
        let trains = trains_with(key, vec![1.0405]); // 40.5 ms after onset

        let mut averager = OnsetAverager::new();
        averager.extend_onsets([1.0]);
        let data = averager.compute(&trains);
        let snapshot = &data[&3][&1];

        // one spike, one onset: 1 / (0.001 * 1) in its bin
        assert!((snapshot.histogram[40] - 1000.0).abs() < 1e-9);
        assert_eq!(snapshot.bins.len(), AVERAGE_BIN_COUNT);
    }

    #[test]
    fn test_peak_latency_of_concentrated_response() {
        let key = UnitKey::new(3, 1);
        let trains = trains_with(key, vec![1.0405]);

        let mut averager = OnsetAverager::new();
        averager.extend_onsets([1.0]);
        let snapshot = &averager.compute(&trains)[&3][&1];

        assert_eq!(snapshot.maxima, vec![40]);
        assert!((snapshot.peak_time.unwrap() - 0.040).abs() < 1e-12);
    }

    #[test]
    fn test_peak_is_greatest_valued_maximum() {
        let key = UnitKey::new(1, 1);
        // a small bump at ~30 ms and a bigger one at ~100 ms
        let mut spikes = vec![1.0305];
        spikes.extend([1.1005, 1.1005, 1.1005]);
        let trains = trains_with(key, spikes);

        let mut averager = OnsetAverager::new();
        averager.extend_onsets([1.0]);
        let snapshot = &averager.compute(&trains)[&1][&1];

        assert!(snapshot.maxima.len() >= 2);
        assert!((snapshot.peak_time.unwrap() - 0.100).abs() < 1e-12);
    }

    #[test]
    fn test_recompute_renormalizes_over_new_onsets() {
        let key = UnitKey::new(3, 1);
        let trains = trains_with(key, vec![1.0405]);

        let mut averager = OnsetAverager::new();
        averager.extend_onsets([1.0]);
        let first = averager.compute(&trains);
        assert!((first[&3][&1].histogram[40] - 1000.0).abs() < 1e-9);

        // a later, spike-free onset halves the pooled rate retroactively
        averager.extend_onsets([5.0]);
        let second = averager.compute(&trains);
        assert!((second[&3][&1].histogram[40] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_half_open() {
        let key = UnitKey::new(1, 1);
        let trains = trains_with(key, vec![0.152, 0.1515]); // at and just inside the bound

        let mut averager = OnsetAverager::new();
        averager.extend_onsets([0.0]);
        let snapshot = &averager.compute(&trains)[&1][&1];

        let total: f64 = snapshot.histogram.iter().sum::<f64>() * AVERAGE_BIN_SIZE;
        assert!((total - 1.0).abs() < 1e-9); // only the 151.5 ms spike counts
    }

    #[test]
    fn test_no_onsets_yields_flat_curve_and_no_peak() {
        let key = UnitKey::new(1, 1);
        let trains = trains_with(key, vec![1.0, 2.0]);

        let averager = OnsetAverager::new();
        let snapshot = &averager.compute(&trains)[&1][&1];
        assert!(snapshot.histogram.iter().all(|&v| v == 0.0));
        assert!(snapshot.maxima.is_empty());
        assert_eq!(snapshot.peak_time, None);
    }
}
