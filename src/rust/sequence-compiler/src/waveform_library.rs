// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed waveform storage.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use numeric_array::NumericArray;
use sha1::{Digest, Sha1};

use crate::sequence::ChannelId;
use crate::utils::normalize_f64;

/// SHA-1 digest of the sample content.
///
/// Samples are hashed as complex values, so a real array and a complex
/// array with zero imaginary parts share a key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveformKey([u8; 20]);

impl WaveformKey {
    pub fn of(samples: &NumericArray) -> Self {
        let mut hasher = Sha1::new();
        hasher.update((samples.len() as u64).to_le_bytes());
        for sample in samples.iter_complex() {
            hasher.update(normalize_f64(sample.re).to_le_bytes());
            hasher.update(normalize_f64(sample.im).to_le_bytes());
        }
        let mut digest = [0u8; 20];
        digest.copy_from_slice(&hasher.finalize());
        WaveformKey(digest)
    }

    /// Key of the time-amplitude-zero padding entry.
    pub fn taz() -> Self {
        WaveformKey::of(&taz_samples())
    }
}

impl fmt::Debug for WaveformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaveformKey({self})")
    }
}

impl fmt::Display for WaveformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn taz_samples() -> NumericArray {
    NumericArray::Float64(vec![0.0])
}

/// Append-only, deduplicating map from content key to samples.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformLibrary {
    waveforms: IndexMap<WaveformKey, Arc<NumericArray>>,
}

impl Default for WaveformLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformLibrary {
    /// An empty library seeded with the TAZ entry.
    pub fn new() -> Self {
        let mut waveforms = IndexMap::new();
        waveforms.insert(WaveformKey::taz(), Arc::new(taz_samples()));
        WaveformLibrary { waveforms }
    }

    /// Insert samples if their content is new; returns the content key either way.
    pub fn insert(&mut self, samples: Arc<NumericArray>) -> WaveformKey {
        let key = WaveformKey::of(&samples);
        self.waveforms.entry(key).or_insert(samples);
        key
    }

    /// Insert under a key computed elsewhere, e.g. a projection of another library.
    pub fn insert_with_key(&mut self, key: WaveformKey, samples: Arc<NumericArray>) {
        self.waveforms.entry(key).or_insert(samples);
    }

    pub fn get(&self, key: &WaveformKey) -> Option<&Arc<NumericArray>> {
        self.waveforms.get(key)
    }

    pub fn contains(&self, key: &WaveformKey) -> bool {
        self.waveforms.contains_key(key)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&WaveformKey, &Arc<NumericArray>)> {
        self.waveforms.iter()
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }

    /// Total number of stored samples.
    pub fn total_points(&self) -> usize {
        self.waveforms.values().map(|w| w.len()).sum()
    }
}

/// Waveform libraries of all logical channels.
pub type WaveformLibraries = IndexMap<ChannelId, WaveformLibrary>;
