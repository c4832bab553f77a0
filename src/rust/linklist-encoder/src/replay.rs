// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Playback of link lists, both before encoding and from encoded containers.

use anyhow::anyhow;
use indexmap::IndexMap;
use sequence_compiler::link_list::LLEntry;
use sequence_compiler::waveform_library::WaveformLibrary;

use crate::aps::{
    ADDRESS_MASK, ADDRESS_UNIT, HOLD_FLAG, LAST_FLAG, LinkListWord, TRIGGER_DELAY_MASK,
    TRIGGER_FLAG, TRIGGER_MODE_SHIFT, ZERO_FLAG,
};
use crate::container::Group;
use crate::{Error, QUANTIZATION_SCALE, Result};

/// Samples played by `entries`, with holds expanded and waveforms tiled by repeat.
pub fn render_entries(entries: &[LLEntry], library: &WaveformLibrary) -> Result<Vec<f64>> {
    let mut samples = Vec::new();
    for entry in entries {
        let values = library
            .get(&entry.key)
            .ok_or_else(|| {
                Error::invariant(format!("Waveform {} missing from library.", entry.key))
            })?
            .real_part();
        if entry.is_hold {
            let value = values.first().copied().unwrap_or_default();
            samples.extend(std::iter::repeat_n(value, entry.total_length() as usize));
        } else {
            let mut period = values;
            period.resize(entry.length as usize, 0.0);
            for _ in 0..entry.repeat {
                samples.extend_from_slice(&period);
            }
        }
    }
    Ok(samples)
}

/// One analog output as reconstructed from a bank/link-list container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayedChannel {
    /// Samples of every shot, scaled back to [-1, 1].
    pub shots: Vec<Vec<f64>>,
    /// Marker level of every shot, reconstructed from the triggers.
    pub markers: Vec<Vec<bool>>,
}

fn u16_dataset<'a>(group: &'a Group, name: &str) -> Result<&'a [u16]> {
    group
        .dataset(name)?
        .as_u16()
        .ok_or_else(|| anyhow!("Dataset '{name}' is not a u16 array.").into())
}

fn i16_scalar(group: &Group, name: &str) -> Result<i16> {
    group
        .attribute(name)?
        .as_i16()
        .and_then(|v| v.first().copied())
        .ok_or_else(|| anyhow!("Attribute '{name}' is not an i16 scalar.").into())
}

/// Read the entries of all banks, trimmed to each bank's length.
pub fn read_banks(link_list: &Group) -> Result<Vec<LinkListWord>> {
    let num_banks = i16_scalar(link_list, "numBanks")?;
    let mut words = vec![];
    for index in 1..=num_banks {
        let bank = link_list.group(&format!("bank{index}"))?;
        let length = usize::try_from(i16_scalar(bank, "length")?)
            .map_err(|_| anyhow!("Negative length of bank {index}."))?;
        let fields = [
            u16_dataset(bank, "offset")?,
            u16_dataset(bank, "count")?,
            u16_dataset(bank, "trigger")?,
            u16_dataset(bank, "repeat")?,
        ];
        if fields.iter().any(|f| f.len() < length) {
            return Err(anyhow!("Bank {index} is shorter than its length {length}.").into());
        }
        words.extend((0..length).map(|i| LinkListWord {
            offset: fields[0][i],
            count: fields[1][i],
            trigger: fields[2][i],
            repeat: fields[3][i],
        }));
    }
    Ok(words)
}

fn replay_minilist(words: &[LinkListWord], memory: &[i16]) -> Result<(Vec<f64>, Vec<bool>)> {
    let unit = ADDRESS_UNIT as usize;
    let mut samples: Vec<f64> = vec![];
    let mut edges = vec![];
    for word in words {
        let start = samples.len();
        let address = usize::from(word.offset & ADDRESS_MASK) * unit;
        let length = usize::from(word.count) * unit;
        let repeat = usize::from(word.repeat);
        if word.offset & ZERO_FLAG != 0 {
            samples.resize(start + length * repeat, 0.0);
        } else {
            let end = if word.offset & HOLD_FLAG != 0 { address + 1 } else { address + length };
            let period = memory
                .get(address..end)
                .ok_or_else(|| anyhow!("Entry addresses samples {address}..{end} outside memory."))?;
            let period: Vec<f64> = period
                .iter()
                .map(|v| f64::from(*v) / QUANTIZATION_SCALE)
                .collect();
            if word.offset & HOLD_FLAG != 0 {
                samples.resize(start + length * repeat, period[0]);
            } else {
                for _ in 0..repeat {
                    samples.extend_from_slice(&period);
                }
            }
        }
        if word.offset & TRIGGER_FLAG != 0 {
            let at = start + usize::from(word.trigger & TRIGGER_DELAY_MASK) * unit;
            let rising = (word.trigger >> TRIGGER_MODE_SHIFT) == 0b01;
            edges.push((at, rising));
        }
    }
    let mut markers = vec![false; samples.len()];
    for (at, rising) in edges {
        markers.iter_mut().skip(at).for_each(|level| *level = rising);
    }
    Ok((samples, markers))
}

/// Reconstruct the analog outputs stored in a bank/link-list container.
///
/// Outputs without link-list data are skipped.
pub fn replay_aps(root: &Group) -> Result<IndexMap<String, ReplayedChannel>> {
    let mut channels = IndexMap::new();
    for (name, group) in root.groups.iter() {
        if !name.starts_with("chan_") || i16_scalar(group, "isLinkListData")? != 1 {
            continue;
        }
        let memory = group
            .dataset("waveformLib")?
            .as_i16()
            .ok_or_else(|| anyhow!("'waveformLib' of {name} is not an i16 array."))?;
        let words = read_banks(group.group("linkListData")?)?;
        let mut replayed = ReplayedChannel::default();
        for minilist in words.split_inclusive(|w| w.offset & LAST_FLAG != 0) {
            let (samples, markers) = replay_minilist(minilist, memory)?;
            replayed.shots.push(samples);
            replayed.markers.push(markers);
        }
        if !replayed.shots.is_empty() {
            channels.insert(name.clone(), replayed);
        }
    }
    Ok(channels)
}
