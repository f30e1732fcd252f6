//! Growing per-key buffers fed by each acquisition poll.
//!
//! Append-only by contract: the acquisition collaborator delivers batches in
//! device order, so nothing here reorders or deduplicates.

use std::collections::{BTreeMap, VecDeque};

use crate::types::UnitKey;

/// Monotonically growing spike timestamp sequences, one per sorted unit.
///
/// Owned by the accumulator, read (never mutated) by the aggregation
/// engines. Keys are created on first sight and never deleted within a
/// session.
#[derive(Debug, Default)]
pub struct SpikeTrains {
    trains: BTreeMap<UnitKey, Vec<f64>>,
}

impl SpikeTrains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a batch's spike trains onto the running ones
    pub fn append_batch(&mut self, new_trains: BTreeMap<UnitKey, Vec<f64>>) {
        for (key, timestamps) in new_trains {
            self.trains.entry(key).or_default().extend(timestamps);
        }
    }

    pub fn get(&self, key: &UnitKey) -> Option<&[f64]> {
        self.trains.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UnitKey, &[f64])> {
        self.trains.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &UnitKey> {
        self.trains.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }
}

/// The decoded digital trigger stream awaiting segmentation.
///
/// Two logically parallel sequences of condition index and timestamp; the
/// only mutation besides append is trimming a processed prefix.
#[derive(Debug, Default)]
pub struct TriggerBuffer {
    entries: VecDeque<(i16, f64)>,
}

impl TriggerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, pairs: impl IntoIterator<Item = (i16, f64)>) {
        self.entries.extend(pairs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn condition(&self, index: usize) -> Option<i16> {
        self.entries.get(index).map(|&(c, _)| c)
    }

    pub fn timestamp(&self, index: usize) -> Option<f64> {
        self.entries.get(index).map(|&(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i16, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Drop the processed prefix of `n` entries
    pub fn drop_front(&mut self, n: usize) {
        for _ in 0..n.min(self.entries.len()) {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
