// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::link_list::LLEntry;
use crate::timing::{delay_to_samples, round_to_grid};
use crate::{Result, Samples};

/// Common timing frame of one shot across all instruments.
///
/// Every channel is padded with `margin + max_back + shift` samples at the
/// head and `margin + max_fwd - shift` at the tail, so all channels end up
/// with the same total length regardless of their individual shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShotTiming {
    margin: i64,
    max_fwd: i64,
    max_back: i64,
    base: Samples,
}

impl ShotTiming {
    pub(crate) fn new(shifts: &[i64], margin: i64, base: Samples) -> Self {
        let max_fwd = shifts.iter().copied().max().unwrap_or(0).max(0);
        let max_back = shifts.iter().map(|s| -s).max().unwrap_or(0).max(0);
        ShotTiming {
            margin,
            max_fwd,
            max_back,
            base,
        }
    }

    pub(crate) fn head(&self, shift: i64) -> Samples {
        (self.margin + self.max_back + shift) as Samples
    }

    pub(crate) fn tail(&self, shift: i64) -> Samples {
        (self.margin + self.max_fwd - shift) as Samples
    }

    /// Length of every channel in the shot after padding.
    pub(crate) fn total(&self) -> Samples {
        self.base + (2 * self.margin + self.max_fwd + self.max_back) as Samples
    }

    pub(crate) fn max_fwd(&self) -> i64 {
        self.max_fwd
    }

    pub(crate) fn max_back(&self) -> i64 {
        self.max_back
    }
}

/// Channel shift in samples, rounded onto the timing grid.
pub(crate) fn shift_samples(delay: f64, sampling_rate: f64, grid: u64) -> Result<i64> {
    Ok(round_to_grid(
        delay_to_samples(delay, sampling_rate)?,
        grid as i64,
    ))
}

/// Surround `entries` with zero padding.
pub(crate) fn pad_entries(entries: &[LLEntry], head: Samples, tail: Samples) -> Vec<LLEntry> {
    let mut padded = Vec::with_capacity(entries.len() + 2);
    if head > 0 {
        padded.push(LLEntry::taz(head));
    }
    padded.extend_from_slice(entries);
    if tail > 0 {
        padded.push(LLEntry::taz(tail));
    }
    padded
}
