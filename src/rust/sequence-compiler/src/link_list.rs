// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::Samples;
use crate::waveform_library::WaveformKey;

/// Marker behaviour of a trigger attached to a link-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    ShortPulse,
    RisingEdge,
    FallingEdge,
    NoChange,
}

impl TriggerMode {
    /// Two-bit encoding used by the link-list hardware.
    pub fn bits(&self) -> u16 {
        match self {
            TriggerMode::ShortPulse => 0b00,
            TriggerMode::RisingEdge => 0b01,
            TriggerMode::FallingEdge => 0b10,
            TriggerMode::NoChange => 0b11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigger {
    /// Offset from the start of the entry, in samples.
    pub delay: Samples,
    pub mode: TriggerMode,
}

/// One link-list entry: play `length` samples of a library waveform `repeat` times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LLEntry {
    pub key: WaveformKey,
    pub length: Samples,
    pub repeat: u32,
    /// The waveform is a single value held for `length` samples.
    pub is_hold: bool,
    pub trigger: Option<Trigger>,
    pub is_first: bool,
    pub is_last: bool,
}

impl LLEntry {
    pub fn new(key: WaveformKey, length: Samples, is_hold: bool) -> Self {
        LLEntry {
            key,
            length,
            repeat: 1,
            is_hold,
            trigger: None,
            is_first: false,
            is_last: false,
        }
    }

    /// Zero-valued hold used for padding.
    pub fn taz(length: Samples) -> Self {
        LLEntry::new(WaveformKey::taz(), length, true)
    }

    pub fn is_zero(&self) -> bool {
        self.key == WaveformKey::taz()
    }

    pub fn total_length(&self) -> Samples {
        self.length * Samples::from(self.repeat)
    }
}

/// Total played length of a list of entries.
pub fn total_length(entries: &[LLEntry]) -> Samples {
    entries.iter().map(LLEntry::total_length).sum()
}

/// Flag the first and last entry of a mini-list, clearing stale flags.
pub fn mark_minilist(entries: &mut [LLEntry]) {
    for entry in entries.iter_mut() {
        entry.is_first = false;
        entry.is_last = false;
    }
    if let Some(first) = entries.first_mut() {
        first.is_first = true;
    }
    if let Some(last) = entries.last_mut() {
        last.is_last = true;
    }
}
