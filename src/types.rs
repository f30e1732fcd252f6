use serde::{Deserialize, Serialize};

use crate::error::{PsthError, Result};

/// Number of digital lines carrying one bit of an unstrobed word each
pub const WORD_BITS: usize = 32;

/// Vendor type code for a sorted/unsorted spike waveform record
pub const SPIKE_TYPE_CODE: u8 = 1;

/// Vendor type code for an external (digital) event record
pub const DIGITAL_TYPE_CODE: u8 = 4;

/// Kind of a raw acquisition record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Spike,
    Digital,
}

impl EventKind {
    /// Map a vendor type code to an event kind. Codes other than spike and
    /// external event (A/D samples, stereotrode records) carry no timestamp
    /// payload for this engine and map to `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            SPIKE_TYPE_CODE => Some(Self::Spike),
            DIGITAL_TYPE_CODE => Some(Self::Digital),
            _ => None,
        }
    }
}

/// One acquisition record, borrowed out of a `TimeStampBatch`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub channel: u16,
    pub unit: u16,
    pub timestamp: f64,
}

/// A chronological batch of acquisition records as four parallel arrays.
///
/// This is the sole input boundary of the engine: both live-device polling
/// and offline file replay hand over this structure. Timestamps are seconds,
/// non-decreasing within a batch, and batches are chronological across calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeStampBatch {
    pub kinds: Vec<EventKind>,
    pub channels: Vec<u16>,
    pub units: Vec<u16>,
    pub timestamps: Vec<f64>,
}

impl TimeStampBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn push(&mut self, kind: EventKind, channel: u16, unit: u16, timestamp: f64) {
        self.kinds.push(kind);
        self.channels.push(channel);
        self.units.push(unit);
        self.timestamps.push(timestamp);
    }

    /// Iterate the batch record by record
    pub fn records(&self) -> impl Iterator<Item = RawEvent> + '_ {
        (0..self.len()).map(move |i| RawEvent {
            kind: self.kinds[i],
            channel: self.channels[i],
            unit: self.units[i],
            timestamp: self.timestamps[i],
        })
    }
}

/// Composite key addressing one sorted unit on one electrode channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub channel: u16,
    pub unit: u16,
}

impl UnitKey {
    pub fn new(channel: u16, unit: u16) -> Self {
        Self { channel, unit }
    }
}

// =============================================================================
// RESERVED EVENT CHANNELS
// =============================================================================

/// Default reserved channel carrying strobed words
pub const STROBED_WORD_CHANNEL: u16 = 257;
/// Default reserved channel for recording-start events
pub const START_CHANNEL: u16 = 258;
/// Default reserved channel for recording-stop events
pub const STOP_CHANNEL: u16 = 259;
/// Default reserved channel for pause events
pub const PAUSE_CHANNEL: u16 = 260;
/// Default reserved channel for resume events
pub const RESUME_CHANNEL: u16 = 261;

/// Digital-channel assignment of one acquisition device.
///
/// Unstrobed bit `b` (0-31) pulses on channel `unstrobed_bit_base + b`;
/// the remaining fields are the reserved single-purpose channels. Defaults
/// match the vendor's stock mapping, offline replay against differently
/// wired devices can override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMap {
    pub strobed_word_channel: u16,
    pub start_channel: u16,
    pub stop_channel: u16,
    pub pause_channel: u16,
    pub resume_channel: u16,
    pub unstrobed_bit_base: u16,
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self {
            strobed_word_channel: STROBED_WORD_CHANNEL,
            start_channel: START_CHANNEL,
            stop_channel: STOP_CHANNEL,
            pause_channel: PAUSE_CHANNEL,
            resume_channel: RESUME_CHANNEL,
            unstrobed_bit_base: 1,
        }
    }
}

impl DeviceMap {
    /// Channel carrying unstrobed bit `line`
    pub fn unstrobed_bit_channel(&self, line: usize) -> Result<u16> {
        if line >= WORD_BITS {
            return Err(PsthError::LineOutOfRange(line));
        }
        Ok(self.unstrobed_bit_base + line as u16)
    }

    /// Reject maps whose reserved channels collide with each other or with
    /// the unstrobed bit range
    pub fn validate(&self) -> Result<()> {
        let reserved = [
            self.strobed_word_channel,
            self.start_channel,
            self.stop_channel,
            self.pause_channel,
            self.resume_channel,
        ];
        for (i, &ch) in reserved.iter().enumerate() {
            if reserved[i + 1..].contains(&ch) {
                return Err(PsthError::ReservedChannelClash(ch));
            }
            let bit_lo = self.unstrobed_bit_base;
            let bit_hi = self.unstrobed_bit_base + WORD_BITS as u16 - 1;
            if ch >= bit_lo && ch <= bit_hi {
                return Err(PsthError::ReservedChannelClash(ch));
            }
        }
        Ok(())
    }
}
