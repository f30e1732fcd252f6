//! Condition-segmented PSTH aggregation.
//!
//! A stateful segmentation engine over the decoded trigger stream: the
//! buffered `(condition, timestamp)` entries are sliced into complete
//! stimulus-on/off segments, and each segment is folded into the running
//! per-unit/per-condition histograms and trial statistics. A trailing run
//! with no closing off marker is deliberately left buffered for the next
//! pull.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::accumulator::{SpikeTrains, TriggerBuffer};
use crate::stats;
use crate::triggers::is_valid_condition;
use crate::types::UnitKey;

/// Length of the analysis window folded per trial, seconds
pub const ANALYSIS_WINDOW: f64 = 2.0;
/// Histogram bin width, seconds
pub const BIN_SIZE: f64 = 0.01;
/// Number of histogram bins covering the analysis window
pub const BIN_COUNT: usize = 200;
/// Gaussian smoothing width, in bins
pub const SMOOTH_SIGMA: f64 = 5.0;

/// Composite key of one running condition record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ConditionKey {
    unit: UnitKey,
    condition: i16,
}

/// Running state of one `(channel, unit, condition)` cell
#[derive(Debug, Default)]
struct ConditionRecord {
    trials: usize,
    /// Cumulative onset-shifted spike pool across all folded trials
    spikes: Vec<f64>,
    trial_means: Vec<f64>,
    histogram: Vec<f64>,
    smoothed: Vec<f64>,
    mean: f64,
    std: f64,
}

/// Read-only view of one condition cell, handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct ConditionSnapshot {
    pub trials: usize,
    /// Pooled rate curve, spikes/second per bin
    pub histogram: Vec<f64>,
    pub smoothed_histogram: Vec<f64>,
    /// Left edge of each bin, seconds after segment onset
    pub bins: Vec<f64>,
    /// Mean of the smoothed curve
    pub mean: f64,
    /// Population standard deviation of the per-trial means
    pub std: f64,
}

/// Snapshot map: channel -> unit -> condition -> cell
pub type TuningData = BTreeMap<u16, BTreeMap<u16, BTreeMap<i16, ConditionSnapshot>>>;

/// Left bin edges of the analysis window
pub fn bin_starts() -> Vec<f64> {
    (0..BIN_COUNT).map(|i| i as f64 * BIN_SIZE).collect()
}

/// The condition-segmented aggregation engine
#[derive(Debug, Default)]
pub struct ConditionAggregator {
    triggers: TriggerBuffer,
    records: BTreeMap<ConditionKey, ConditionRecord>,
}

impl ConditionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly decoded trigger pairs to the segmentation buffer
    pub fn extend_triggers(&mut self, pairs: impl IntoIterator<Item = (i16, f64)>) {
        self.triggers.extend(pairs);
    }

    /// Trigger entries still awaiting a closing off marker
    pub fn buffered_triggers(&self) -> usize {
        self.triggers.len()
    }

    /// Slice every complete segment out of the buffer and fold it.
    ///
    /// Repeats while any off marker is buffered; an incomplete trailing
    /// on-run stays buffered for the next call.
    pub fn process(&mut self, spikes: &SpikeTrains) {
        loop {
            let off_positions: Vec<usize> = self
                .triggers
                .iter()
                .enumerate()
                .filter(|&(_, (c, _))| c < 0)
                .map(|(i, _)| i)
                .collect();
            if off_positions.is_empty() {
                break;
            }

            let leading = self.triggers.condition(0).unwrap_or(0);
            if leading < 0 {
                self.fold_leading_off_span(*off_positions.last().unwrap(), spikes);
            } else {
                self.fold_leading_on_segment(off_positions[0], spikes);
            }
        }
    }

    /// Case A: the buffer starts with an off entry. The off span runs from
    /// the buffer's first timestamp to the last off-marked entry currently
    /// buffered — even across an intervening on-segment when off markers
    /// are non-contiguous (open question in DESIGN.md; do not change without
    /// revisiting it there).
    fn fold_leading_off_span(&mut self, last_off: usize, spikes: &SpikeTrains) {
        let start = self.triggers.timestamp(0).unwrap();
        let end = self.triggers.timestamp(last_off).unwrap();
        let index = self.triggers.condition(0).unwrap();
        if end > start {
            self.fold_segment(start, end, index, spikes);
        }

        let first_on = self.triggers.iter().position(|(c, _)| c >= 0);
        match first_on {
            Some(pos) => self.triggers.drop_front(pos),
            None => self.triggers.clear(),
        }
    }

    /// Case B: the buffer starts with an on entry; the segment ends just
    /// before the first off entry.
    fn fold_leading_on_segment(&mut self, first_off: usize, spikes: &SpikeTrains) {
        let index = self.triggers.condition(0).unwrap();
        let constant = (1..first_off).all(|i| self.triggers.condition(i) == Some(index));
        if !constant {
            log::warn!(
                "Bad stimulation trigger: condition index changes within one on-segment, \
                 folding with leading index {index}"
            );
        }
        if !is_valid_condition(index) {
            log::warn!("Bad stimulation trigger: condition index {index} outside [0, 17]");
        }

        let start = self.triggers.timestamp(0).unwrap();
        let end = self.triggers.timestamp(first_off - 1).unwrap();
        if end > start && is_valid_condition(index) {
            log::info!("Folding condition {index} segment [{start:.3}, {end:.3}]");
            self.fold_segment(start, end, index, spikes);
        }
        self.triggers.drop_front(first_off);
    }

    /// Fold one segment into every unit's record for `condition`.
    ///
    /// Selects spikes inside the fixed analysis window clipped to the
    /// segment end, pools them, and recomputes the cell's statistics.
    fn fold_segment(&mut self, begin: f64, end: f64, condition: i16, spikes: &SpikeTrains) {
        for (&unit, train) in spikes.iter() {
            let record = self
                .records
                .entry(ConditionKey { unit, condition })
                .or_default();

            let trial_spikes: Vec<f64> = train
                .iter()
                .filter(|&&t| t >= begin && t < begin + ANALYSIS_WINDOW && t < end)
                .map(|&t| t - begin)
                .collect();

            let trial_counts = stats::bin_counts(&trial_spikes, BIN_COUNT, BIN_SIZE);
            let trial_mean = stats::mean(&stats::rate_curve(&trial_counts, BIN_SIZE, 1));

            record.spikes.extend(trial_spikes);
            record.trials += 1;

            let pooled = stats::bin_counts(&record.spikes, BIN_COUNT, BIN_SIZE);
            record.histogram = stats::rate_curve(&pooled, BIN_SIZE, record.trials);
            record.smoothed = stats::gaussian_smooth(&record.histogram, SMOOTH_SIGMA);
            record.mean = stats::mean(&record.smoothed);
            record.trial_means.push(trial_mean);
            record.std = stats::std_dev(&record.trial_means);
        }
    }

    /// Read-only snapshot of every condition cell accumulated so far
    pub fn snapshot(&self) -> TuningData {
        let bins = bin_starts();
        let mut data: TuningData = BTreeMap::new();
        for (key, record) in &self.records {
            data.entry(key.unit.channel)
                .or_default()
                .entry(key.unit.unit)
                .or_default()
                .insert(
                    key.condition,
                    ConditionSnapshot {
                        trials: record.trials,
                        histogram: record.histogram.clone(),
                        smoothed_histogram: record.smoothed.clone(),
                        bins: bins.clone(),
                        mean: record.mean,
                        std: record.std,
                    },
                );
        }
        data
    }
}
