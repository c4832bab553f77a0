// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Lowering of logical sequences into per-channel link lists.

use std::collections::HashMap;
use std::sync::Arc;

use compiler_log::diagnostic;
use indexmap::{IndexMap, IndexSet};
use num_complex::Complex;

use crate::link_list::{LLEntry, mark_minilist, total_length};
use crate::sequence::{Alignment, Block, ChannelId, Pulse};
use crate::timing::validate_sampling_rate;
use crate::waveform_library::{WaveformLibraries, WaveformLibrary};
use crate::{Error, Result, Samples};

/// Link-list entries of one shot, per logical channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSequence {
    pub entries: IndexMap<ChannelId, Vec<LLEntry>>,
}

impl CompiledSequence {
    /// Common length of all channels, or `None` if the channels disagree.
    pub fn length(&self) -> Option<Samples> {
        let mut lengths = self.entries.values().map(|e| total_length(e));
        let first = lengths.next().unwrap_or(0);
        lengths.all(|l| l == first).then_some(first)
    }
}

/// Channels referenced anywhere in the sequence, in order of first appearance.
fn discover_channels(sequence: &[Block]) -> IndexSet<ChannelId> {
    sequence
        .iter()
        .flat_map(|block| block.pulses.keys())
        .cloned()
        .collect()
}

/// Padding entries `(head, tail)` for a channel `shortfall` samples short of the block.
fn alignment_padding(alignment: Alignment, shortfall: Samples) -> (Samples, Samples) {
    match alignment {
        Alignment::Left => (0, shortfall),
        Alignment::Right => (shortfall, 0),
        Alignment::Centre => (shortfall / 2, shortfall - shortfall / 2),
    }
}

/// Library entry for one pulse, rotated into the channel's accumulated frame.
///
/// Real samples become complex once the frame is nonzero.
fn materialize(pulse: &Pulse, frame: f64) -> Arc<numeric_array::NumericArray> {
    let samples = if frame != 0.0 {
        Arc::new(pulse.samples.scaled(Complex::from_polar(1.0, frame)))
    } else {
        Arc::clone(&pulse.samples)
    };
    if samples.is_uniform() {
        Arc::new(samples.head(1))
    } else {
        samples
    }
}

fn compile_channel_block(
    pulses: &[Pulse],
    library: &mut WaveformLibrary,
    frame: &mut f64,
    block_index: usize,
    channel: &ChannelId,
) -> Result<Vec<LLEntry>> {
    let mut entries = Vec::with_capacity(pulses.len());
    for pulse in pulses {
        if pulse.repeat == 0 {
            return Err(Error::validation(format!(
                "Pulse '{}' on channel '{channel}' in block {block_index} has a repeat count of zero.",
                pulse.label
            )));
        }
        if !pulse.samples.is_empty() {
            let is_hold = pulse.is_hold();
            let key = library.insert(materialize(pulse, *frame));
            let mut entry = LLEntry::new(key, pulse.length(), is_hold);
            entry.repeat = pulse.repeat;
            entries.push(entry);
        }
        *frame += pulse.frame_change;
    }
    Ok(entries)
}

/// Compile one shot into link-list entries.
///
/// Every channel referenced by any block gets entries spanning every block,
/// so all channels stay length-synchronized. `libraries` may be seeded by a
/// previous shot to share waveforms across shots; the extended libraries are
/// returned.
pub fn compile_sequence(
    sequence: &[Block],
    libraries: Option<WaveformLibraries>,
    sampling_rate: f64,
) -> Result<(CompiledSequence, WaveformLibraries)> {
    validate_sampling_rate(sampling_rate)?;
    let mut libraries = libraries.unwrap_or_default();
    let channels = discover_channels(sequence);
    let mut entries: IndexMap<ChannelId, Vec<LLEntry>> = IndexMap::new();
    let mut frames: HashMap<ChannelId, f64> = HashMap::new();
    for channel in channels.iter() {
        entries.insert(channel.clone(), vec![]);
        libraries.entry(channel.clone()).or_default();
    }

    for (block_index, block) in sequence.iter().enumerate() {
        let max_pts = block.max_pts();
        for channel in channels.iter() {
            let channel_entries = &mut entries[channel];
            let Some(pulses) = block.pulses.get(channel) else {
                if max_pts > 0 {
                    channel_entries.push(LLEntry::taz(max_pts));
                }
                continue;
            };
            let library = &mut libraries[channel];
            let frame = frames.entry(channel.clone()).or_insert(0.0);
            let block_entries =
                compile_channel_block(pulses, library, frame, block_index, channel)?;
            let shortfall = max_pts - total_length(&block_entries);
            let (head, tail) = alignment_padding(block.alignment, shortfall);
            if head > 0 {
                channel_entries.push(LLEntry::taz(head));
            }
            channel_entries.extend(block_entries);
            if tail > 0 {
                channel_entries.push(LLEntry::taz(tail));
            }
        }
    }

    for channel_entries in entries.values_mut() {
        mark_minilist(channel_entries);
    }
    let compiled = CompiledSequence { entries };
    if let Some(length) = compiled.length() {
        diagnostic!(
            "Compiled {} blocks on {} channels, {} samples ({:.3} us)",
            sequence.len(),
            channels.len(),
            length,
            length as f64 / sampling_rate * 1e6
        );
    }
    Ok((compiled, libraries))
}

/// Compile several shots, sharing one waveform library per channel.
pub fn compile_shots(
    sequences: &[Vec<Block>],
    sampling_rate: f64,
) -> Result<(Vec<CompiledSequence>, WaveformLibraries)> {
    let mut libraries = WaveformLibraries::new();
    let mut shots = Vec::with_capacity(sequences.len());
    for sequence in sequences {
        let (compiled, extended) = compile_sequence(sequence, Some(libraries), sampling_rate)?;
        libraries = extended;
        shots.push(compiled);
    }
    Ok((shots, libraries))
}
