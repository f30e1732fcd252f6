//! Online PSTH engine for visual neurophysiology.
//!
//! Turns a continuously polled stream of per-channel digital timestamps and
//! sorted spikes into reconstructed multi-bit trigger codes and running
//! per-condition spike-rate histograms with trial statistics and peak
//! latency estimates. Acquisition clients, stimulus rendering and
//! presentation belong to the surrounding suite, not to this crate: the
//! sole input boundary is the [`types::TimeStampBatch`] parallel-array
//! batch, the outputs are the serializable snapshots of
//! [`session::PsthSession`].

pub mod accumulator;
pub mod average;
pub mod decoder;
pub mod error;
pub mod session;
pub mod stats;
pub mod triggers;
pub mod tuning;
pub mod types;

pub use accumulator::{SpikeTrains, TriggerBuffer};
pub use average::{AverageData, OnsetAverager, PeakSnapshot};
pub use decoder::{DecoderMode, DigitalWord, SessionEvent, StrobeHalf, WordDecoder};
pub use error::{PsthError, Result};
pub use session::{AverageSnapshot, EventSource, PsthSession, ReplaySource, TuningSnapshot};
pub use triggers::{ConditionDecoder, SweptParameter};
pub use tuning::{ConditionAggregator, ConditionSnapshot, TuningData};
pub use types::{DeviceMap, EventKind, RawEvent, TimeStampBatch, UnitKey};
