//! The owned pipeline context driven by the host's polling loop.
//!
//! One `PsthSession` owns the word decoder, the growing spike/trigger
//! buffers and both aggregation engines. The host (typically a GUI refresh
//! timer) alternates `feed` calls with snapshot pulls; nothing here spawns
//! work or blocks.

use std::collections::VecDeque;

use serde::Serialize;

use crate::accumulator::SpikeTrains;
use crate::average::{AverageData, OnsetAverager};
use crate::decoder::{sorted_spike_trains, DecoderMode, WordDecoder};
use crate::error::Result;
use crate::triggers::{ConditionDecoder, SweptParameter, ONSET_MASK};
use crate::tuning::{ConditionAggregator, TuningData};
use crate::types::{DeviceMap, TimeStampBatch};

/// Anything that can hand the pipeline its next chronological batch.
///
/// Both live-device polling and offline file replay conform to this seam;
/// the vendor-specific acquisition clients live outside this crate.
pub trait EventSource {
    /// The next batch in device order, or `None` when the source has
    /// nothing more to give (an idle live source returns an empty batch
    /// instead)
    fn next_batch(&mut self) -> Option<TimeStampBatch>;

    /// Whether future batches may still complete a trailing word
    fn mode(&self) -> DecoderMode;
}

/// Offline replay over pre-recorded batches
pub struct ReplaySource {
    batches: VecDeque<TimeStampBatch>,
}

impl ReplaySource {
    pub fn new(batches: Vec<TimeStampBatch>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

impl EventSource for ReplaySource {
    fn next_batch(&mut self) -> Option<TimeStampBatch> {
        self.batches.pop_front()
    }

    fn mode(&self) -> DecoderMode {
        DecoderMode::Offline
    }
}

/// Snapshot of the condition-segmented engine handed to the presentation
/// layer
#[derive(Debug, Clone, Serialize)]
pub struct TuningSnapshot {
    pub id: String,
    pub created_at: String,
    /// Which stimulus parameter this run sweeps, once known
    pub parameter: Option<SweptParameter>,
    pub data: TuningData,
}

/// Snapshot of the onset-aligned engine
#[derive(Debug, Clone, Serialize)]
pub struct AverageSnapshot {
    pub id: String,
    pub created_at: String,
    pub onsets: usize,
    pub data: AverageData,
}

/// One acquisition-and-analysis session
pub struct PsthSession {
    decoder: WordDecoder,
    conditions: ConditionDecoder,
    spikes: SpikeTrains,
    tuning: ConditionAggregator,
    averager: OnsetAverager,
}

impl PsthSession {
    pub fn new(device: DeviceMap, mode: DecoderMode) -> Result<Self> {
        Ok(Self {
            decoder: WordDecoder::new(device, mode)?,
            conditions: ConditionDecoder::new(),
            spikes: SpikeTrains::new(),
            tuning: ConditionAggregator::new(),
            averager: OnsetAverager::new(),
        })
    }

    /// Ingest one acquisition batch: reconstruct trigger words, decode
    /// conditions, and append spikes. An empty batch is a no-op apart from
    /// possibly releasing a withheld word.
    pub fn feed(&mut self, batch: &TimeStampBatch) {
        let words = self.decoder.unstrobed_words(batch);

        self.averager.extend_onsets(
            words
                .iter()
                .filter(|w| w.value & ONSET_MASK != 0)
                .map(|w| w.timestamp),
        );
        let pairs = self.conditions.decode_batch(&words);
        self.tuning.extend_triggers(pairs);

        self.spikes.append_batch(sorted_spike_trains(batch));
    }

    /// Drain an event source to exhaustion through `feed`
    pub fn feed_all(&mut self, source: &mut dyn EventSource) {
        while let Some(batch) = source.next_batch() {
            self.feed(&batch);
        }
    }

    /// Fold every complete segment and return the per-condition statistics
    pub fn tuning_snapshot(&mut self) -> TuningSnapshot {
        self.tuning.process(&self.spikes);
        TuningSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            parameter: self.conditions.parameter(),
            data: self.tuning.snapshot(),
        }
    }

    /// Recompute the onset-aligned averages and peak latencies
    pub fn average_snapshot(&mut self) -> AverageSnapshot {
        AverageSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            onsets: self.averager.onset_count(),
            data: self.averager.compute(&self.spikes),
        }
    }

    pub fn decoder(&self) -> &WordDecoder {
        &self.decoder
    }

    pub fn spike_trains(&self) -> &SpikeTrains {
        &self.spikes
    }
}
