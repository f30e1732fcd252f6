//! Digital word reconstruction from raw acquisition batches.
//!
//! Two encodings arrive from the device: a single strobed channel carrying a
//! full word per record (half-indicator in bit 15), and 32 independent
//! one-shot lines that each carry one bit of an unstrobed word. The unstrobed
//! path is stateful: bits of one word can land in different polls, so the
//! most recently assembled word is withheld until a later, distinct-timestamp
//! word proves it complete.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DeviceMap, EventKind, TimeStampBatch, UnitKey, WORD_BITS};

/// One reconstructed digital code
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitalWord {
    pub value: u32,
    pub timestamp: f64,
}

/// Which half of a two-part strobed code to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrobeHalf {
    First,
    Second,
}

/// Session control events recorded on reserved channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Decoding mode fixed at construction.
///
/// Online mode withholds the trailing word of every batch until the next
/// call can prove it complete; offline (whole-file) mode has no future batch
/// and returns everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMode {
    Online,
    Offline,
}

/// Stateful decoder for one digital event stream
pub struct WordDecoder {
    device: DeviceMap,
    mode: DecoderMode,
    /// One ordered timestamp queue per unstrobed line; grows by append,
    /// shrinks only by consuming a prefix
    queues: Vec<VecDeque<f64>>,
    /// Most recently assembled word that might still be incomplete
    pending: Option<DigitalWord>,
}

impl WordDecoder {
    pub fn new(device: DeviceMap, mode: DecoderMode) -> Result<Self> {
        device.validate()?;
        Ok(Self {
            device,
            mode,
            queues: vec![VecDeque::new(); WORD_BITS],
            pending: None,
        })
    }

    pub fn mode(&self) -> DecoderMode {
        self.mode
    }

    /// Extract one half of the strobed word stream from a batch.
    ///
    /// The payload rides in the `unit` field of records on the strobed word
    /// channel; bit 15 set marks the first half (payload in the low 15
    /// bits), bit 15 clear marks the second half (payload is the whole
    /// field). Stateless: a two-part code split across polls is the
    /// collaborator's concern.
    pub fn strobed_words(&self, batch: &TimeStampBatch, half: StrobeHalf) -> Vec<DigitalWord> {
        let mut words = Vec::new();
        for rec in batch.records() {
            if rec.kind != EventKind::Digital || rec.channel != self.device.strobed_word_channel {
                continue;
            }
            let first = rec.unit & 0x8000 != 0;
            match half {
                StrobeHalf::First if first => words.push(DigitalWord {
                    value: u32::from(rec.unit & 0x7FFF),
                    timestamp: rec.timestamp,
                }),
                StrobeHalf::Second if !first => words.push(DigitalWord {
                    value: u32::from(rec.unit),
                    timestamp: rec.timestamp,
                }),
                _ => {}
            }
        }
        words
    }

    /// Timestamps of one session control event kind within a batch
    pub fn session_events(&self, batch: &TimeStampBatch, event: SessionEvent) -> Vec<f64> {
        let channel = match event {
            SessionEvent::Start => self.device.start_channel,
            SessionEvent::Stop => self.device.stop_channel,
            SessionEvent::Pause => self.device.pause_channel,
            SessionEvent::Resume => self.device.resume_channel,
        };
        batch
            .records()
            .filter(|r| r.kind == EventKind::Digital && r.channel == channel)
            .map(|r| r.timestamp)
            .collect()
    }

    /// Timestamps of pulses on a single unstrobed line within a batch
    pub fn unstrobed_bit(&self, batch: &TimeStampBatch, line: usize) -> Result<Vec<f64>> {
        let channel = self.device.unstrobed_bit_channel(line)?;
        Ok(batch
            .records()
            .filter(|r| r.kind == EventKind::Digital && r.channel == channel)
            .map(|r| r.timestamp)
            .collect())
    }

    /// Reconstruct unstrobed words from the bit lines of a batch.
    ///
    /// Safe to call repeatedly on successive batches: a word whose bits are
    /// split across the poll boundary is merged with the withheld word of
    /// the previous call when the timestamps match exactly.
    pub fn unstrobed_words(&mut self, batch: &TimeStampBatch) -> Vec<DigitalWord> {
        self.enqueue_bits(batch);
        let mut words = self.assemble();

        if let Some(pending) = self.pending.take() {
            if !words.is_empty() && words[0].timestamp == pending.timestamp {
                // same-timestamp merge across the poll boundary
                words[0].value |= pending.value;
            } else {
                // a later, distinct-timestamp word proves the withheld one
                // complete
                words.insert(0, pending);
                if words.len() == 1 {
                    return words;
                }
            }
        }

        match self.mode {
            DecoderMode::Online => {
                if let Some(last) = words.pop() {
                    self.pending = Some(last);
                }
                words
            }
            DecoderMode::Offline => words,
        }
    }

    /// Append a batch's bit-line pulses to the per-line queues
    fn enqueue_bits(&mut self, batch: &TimeStampBatch) {
        let base = self.device.unstrobed_bit_base;
        let top = base + WORD_BITS as u16 - 1;
        for rec in batch.records() {
            if rec.kind != EventKind::Digital || rec.channel < base || rec.channel > top {
                continue;
            }
            let line = (rec.channel - base) as usize;
            self.queues[line].push_back(rec.timestamp);
        }
    }

    /// Drain the bit queues into chronological words: repeatedly take the
    /// earliest queued timestamp and OR together every line pulsing at
    /// exactly that instant.
    fn assemble(&mut self) -> Vec<DigitalWord> {
        let mut words = Vec::new();
        loop {
            let mut earliest = f64::INFINITY;
            for queue in &self.queues {
                if let Some(&head) = queue.front() {
                    if head < earliest {
                        earliest = head;
                    }
                }
            }
            if earliest.is_infinite() {
                break;
            }

            let mut value = 0u32;
            for (line, queue) in self.queues.iter_mut().enumerate() {
                if queue.front() == Some(&earliest) {
                    value |= 1 << line;
                    queue.pop_front();
                }
            }
            words.push(DigitalWord {
                value,
                timestamp: earliest,
            });
        }
        words
    }
}

// =============================================================================
// SPIKE RECORD EXTRACTION
// =============================================================================

/// Per-unit spike timestamps of a batch, sorted units only (`unit > 0`)
pub fn sorted_spike_trains(batch: &TimeStampBatch) -> BTreeMap<UnitKey, Vec<f64>> {
    let mut trains: BTreeMap<UnitKey, Vec<f64>> = BTreeMap::new();
    for rec in batch.records() {
        if rec.kind == EventKind::Spike && rec.unit > 0 {
            trains
                .entry(UnitKey::new(rec.channel, rec.unit))
                .or_default()
                .push(rec.timestamp);
        }
    }
    trains
}

/// Which sorted units fired on which channels within a batch
pub fn sorted_units_info(batch: &TimeStampBatch) -> BTreeMap<u16, Vec<u16>> {
    let mut info: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
    for rec in batch.records() {
        if rec.kind == EventKind::Spike && rec.unit > 0 {
            let units = info.entry(rec.channel).or_default();
            if !units.contains(&rec.unit) {
                units.push(rec.unit);
            }
        }
    }
    for units in info.values_mut() {
        units.sort_unstable();
    }
    info
}

/// Conventional letter label of a sorted unit (1 -> 'a', 2 -> 'b', ...)
pub fn unit_letter(unit: u16) -> Option<char> {
    if (1..=26).contains(&unit) {
        Some((b'a' + (unit - 1) as u8) as char)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::STROBED_WORD_CHANNEL;

    fn digital(batch: &mut TimeStampBatch, channel: u16, timestamp: f64) {
        batch.push(EventKind::Digital, channel, 0, timestamp);
    }

    fn online_decoder() -> WordDecoder {
        WordDecoder::new(DeviceMap::default(), DecoderMode::Online).unwrap()
    }

    fn offline_decoder() -> WordDecoder {
        WordDecoder::new(DeviceMap::default(), DecoderMode::Offline).unwrap()
    }

    #[test]
    fn test_bit_or_of_simultaneous_lines() {
        // lines 2 and 5 pulse at the same instant, nothing else does
        let mut batch = TimeStampBatch::new();
        digital(&mut batch, 3, 1.0); // line 2
        digital(&mut batch, 6, 1.0); // line 5

        let words = offline_decoder().unstrobed_words(&batch);
        assert_eq!(
            words,
            vec![DigitalWord {
                value: (1 << 2) | (1 << 5),
                timestamp: 1.0
            }]
        );
        assert_eq!(words[0].value, 36);
    }

    #[test]
    fn test_words_come_out_chronological() {
        let mut batch = TimeStampBatch::new();
        digital(&mut batch, 1, 0.10); // line 0
        digital(&mut batch, 1, 0.30);
        digital(&mut batch, 2, 0.10); // line 1
        digital(&mut batch, 3, 0.20); // line 2

        let words = offline_decoder().unstrobed_words(&batch);
        let times: Vec<f64> = words.iter().map(|w| w.timestamp).collect();
        assert_eq!(times, vec![0.10, 0.20, 0.30]);
        assert_eq!(words[0].value, 0b11);
        assert_eq!(words[1].value, 0b100);
        assert_eq!(words[2].value, 0b1);
    }

    #[test]
    fn test_online_withholds_trailing_word() {
        let mut batch = TimeStampBatch::new();
        digital(&mut batch, 1, 0.10);
        digital(&mut batch, 1, 0.20);

        let mut decoder = online_decoder();
        let words = decoder.unstrobed_words(&batch);
        // the word at 0.20 might still gain bits from the next poll
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].timestamp, 0.10);
    }

    #[test]
    fn test_same_timestamp_merge_across_batches() {
        // batch 1: lines 0 and 1 pulse at t=0.10
        let mut first = TimeStampBatch::new();
        digital(&mut first, 1, 0.10);
        digital(&mut first, 2, 0.10);
        // batch 2: line 0 pulses again at t=0.10, then line 3 at t=0.20
        let mut second = TimeStampBatch::new();
        digital(&mut second, 1, 0.10);
        digital(&mut second, 4, 0.20);

        let mut decoder = online_decoder();
        assert!(decoder.unstrobed_words(&first).is_empty());
        let words = decoder.unstrobed_words(&second);
        assert_eq!(
            words,
            vec![DigitalWord {
                value: 0b0011,
                timestamp: 0.10
            }]
        );

        // the word at 0.20 surfaces once a later batch closes it
        let mut third = TimeStampBatch::new();
        digital(&mut third, 1, 0.30);
        let words = decoder.unstrobed_words(&third);
        assert_eq!(
            words,
            vec![DigitalWord {
                value: 0b1000,
                timestamp: 0.20
            }]
        );
    }

    #[test]
    fn test_distinct_timestamp_flushes_pending() {
        let mut first = TimeStampBatch::new();
        digital(&mut first, 1, 0.10);
        let mut second = TimeStampBatch::new();
        digital(&mut second, 2, 0.50);

        let mut decoder = online_decoder();
        assert!(decoder.unstrobed_words(&first).is_empty());
        // pending word at 0.10 is provably complete once 0.50 arrives;
        // 0.50 itself becomes the new pending word
        let words = decoder.unstrobed_words(&second);
        assert_eq!(
            words,
            vec![DigitalWord {
                value: 0b1,
                timestamp: 0.10
            }]
        );
    }

    #[test]
    fn test_lone_prepended_word_returns_immediately() {
        let mut first = TimeStampBatch::new();
        digital(&mut first, 1, 0.10);

        let mut decoder = online_decoder();
        assert!(decoder.unstrobed_words(&first).is_empty());
        // empty poll: the pending word was already known-complete, hand it
        // out instead of withholding it again
        let words = decoder.unstrobed_words(&TimeStampBatch::new());
        assert_eq!(
            words,
            vec![DigitalWord {
                value: 0b1,
                timestamp: 0.10
            }]
        );
        assert!(decoder.unstrobed_words(&TimeStampBatch::new()).is_empty());
    }

    #[test]
    fn test_offline_returns_everything() {
        let mut batch = TimeStampBatch::new();
        digital(&mut batch, 1, 0.10);
        digital(&mut batch, 2, 0.10);
        digital(&mut batch, 4, 0.20);

        let words = offline_decoder().unstrobed_words(&batch);
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].value, 0b1000);
    }

    #[test]
    fn test_strobe_half_separation() {
        let mut batch = TimeStampBatch::new();
        batch.push(EventKind::Digital, STROBED_WORD_CHANNEL, 0x8005, 1.0);
        batch.push(EventKind::Digital, STROBED_WORD_CHANNEL, 0x0007, 1.1);

        let decoder = offline_decoder();
        let first = decoder.strobed_words(&batch, StrobeHalf::First);
        let second = decoder.strobed_words(&batch, StrobeHalf::Second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].value, 5);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].value, 7);
    }

    #[test]
    fn test_session_events_on_reserved_channels() {
        let mut batch = TimeStampBatch::new();
        digital(&mut batch, 258, 1.0);
        digital(&mut batch, 259, 9.0);
        digital(&mut batch, 260, 3.0);
        digital(&mut batch, 261, 4.0);

        let decoder = offline_decoder();
        assert_eq!(decoder.session_events(&batch, SessionEvent::Start), vec![1.0]);
        assert_eq!(decoder.session_events(&batch, SessionEvent::Stop), vec![9.0]);
        assert_eq!(decoder.session_events(&batch, SessionEvent::Pause), vec![3.0]);
        assert_eq!(decoder.session_events(&batch, SessionEvent::Resume), vec![4.0]);
    }

    #[test]
    fn test_unstrobed_bit_query() {
        let mut batch = TimeStampBatch::new();
        digital(&mut batch, 3, 0.5);
        digital(&mut batch, 3, 0.7);
        digital(&mut batch, 4, 0.6);

        let decoder = offline_decoder();
        assert_eq!(decoder.unstrobed_bit(&batch, 2).unwrap(), vec![0.5, 0.7]);
        assert_eq!(decoder.unstrobed_bit(&batch, 3).unwrap(), vec![0.6]);
        assert!(decoder.unstrobed_bit(&batch, 32).is_err());
    }

    #[test]
    fn test_sorted_spike_extraction_skips_unsorted() {
        let mut batch = TimeStampBatch::new();
        batch.push(EventKind::Spike, 5, 1, 0.1);
        batch.push(EventKind::Spike, 5, 0, 0.2); // unsorted
        batch.push(EventKind::Spike, 5, 2, 0.3);
        batch.push(EventKind::Spike, 7, 1, 0.4);

        let trains = sorted_spike_trains(&batch);
        assert_eq!(trains.len(), 3);
        assert_eq!(trains[&UnitKey::new(5, 1)], vec![0.1]);
        assert_eq!(trains[&UnitKey::new(5, 2)], vec![0.3]);

        let info = sorted_units_info(&batch);
        assert_eq!(info[&5], vec![1, 2]);
        assert_eq!(info[&7], vec![1]);
    }

    #[test]
    fn test_unit_letters() {
        assert_eq!(unit_letter(1), Some('a'));
        assert_eq!(unit_letter(4), Some('d'));
        assert_eq!(unit_letter(0), None);
        assert_eq!(unit_letter(27), None);
    }
}
