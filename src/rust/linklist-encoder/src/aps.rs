// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Bank/link-list encoder for the APS family.
//!
//! Each analog output gets one waveform memory image and a list of 512-entry
//! banks. Every shot becomes one mini-sequence, and a mini-sequence never
//! spans two banks. Marker outputs are not stored separately: transitions on
//! `Nm1` become triggers on the entries of analog output `N`.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use compiler_log::{diagnostic, warn};
use sequence_compiler::device_traits::APS_TRAITS;
use sequence_compiler::link_list::{LLEntry, Trigger, TriggerMode, mark_minilist};
use sequence_compiler::settings::CompilerSettings;
use sequence_compiler::waveform_library::{WaveformKey, WaveformLibrary};
use sequence_compiler::{ChannelProgram, HardwareWaveformSet};

use crate::container::{Data, Group};
use crate::{Error, Result, Samples, SequenceEncoder, quantize};

pub const BANK_SIZE: usize = 512;
/// Allowed number of entries of one mini-sequence.
pub const MINILIST_ENTRIES: RangeInclusive<usize> = 2..=511;
/// Samples per memory address unit.
pub const ADDRESS_UNIT: Samples = 4;
/// Trigger delays are limited to this many address units.
pub const MAX_TRIGGER_DELAY: Samples = 65536;

// Offset field
pub const HOLD_FLAG: u16 = 1 << 15;
pub const ZERO_FLAG: u16 = 1 << 14;
pub const TRIGGER_FLAG: u16 = 1 << 13;
pub const FIRST_FLAG: u16 = 1 << 12;
pub const LAST_FLAG: u16 = 1 << 11;
/// Address bits of the offset field. Bit 11 is the last-entry flag, the
/// 8192-point memory never needs it for addressing.
pub const ADDRESS_MASK: u16 = 0x07FF;

// Trigger field
pub const TRIGGER_MODE_SHIFT: u16 = 14;
pub const TRIGGER_DELAY_MASK: u16 = 0x3FFF;

const ANALOG_PORTS: [&str; 4] = ["1", "2", "3", "4"];

/// The four 16-bit fields of one link-list entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkListWord {
    pub offset: u16,
    pub count: u16,
    pub trigger: u16,
    pub repeat: u16,
}

/// Quantized sample memory of one analog output.
#[derive(Debug, Clone)]
pub struct WaveformMemory {
    pub samples: Vec<i16>,
    addresses: HashMap<WaveformKey, Samples>,
}

impl WaveformMemory {
    /// Lay out every waveform referenced by `shots` in order of first use.
    ///
    /// Address 0 holds one zero address unit. Holds take one address unit,
    /// other waveforms are zero-padded to the unit.
    pub fn build(
        library: &WaveformLibrary,
        shots: &[Vec<LLEntry>],
        channel: &str,
    ) -> Result<Self> {
        let unit = ADDRESS_UNIT as usize;
        let mut samples = vec![0i16; unit];
        let mut addresses = HashMap::from([(WaveformKey::taz(), 0)]);
        let mut clamped = 0usize;
        for entry in shots.iter().flatten() {
            if addresses.contains_key(&entry.key) {
                continue;
            }
            let waveform = library.get(&entry.key).ok_or_else(|| {
                Error::invariant(format!(
                    "Waveform {} of '{channel}' missing from library.",
                    entry.key
                ))
            })?;
            let mut values = waveform.real_part();
            if entry.is_hold {
                let value = values.first().copied().unwrap_or_default();
                values = vec![value; unit];
            } else {
                values.resize(values.len().div_ceil(unit) * unit, 0.0);
            }
            addresses.insert(entry.key, samples.len() as Samples);
            for value in values {
                let (quantized, was_clamped) = quantize(value);
                clamped += usize::from(was_clamped);
                samples.push(quantized);
            }
        }
        if clamped > 0 {
            warn!("Clamped {} samples of '{}' to [-1, 1]", clamped, channel);
        }
        let max_points = APS_TRAITS.max_waveform_points.unwrap_or(usize::MAX);
        if samples.len() > max_points {
            return Err(Error::format_constraint(
                channel,
                None,
                format!(
                    "Waveform memory of {} points exceeds the limit of {max_points}.",
                    samples.len()
                ),
            ));
        }
        diagnostic!(
            "Waveform memory of '{}': {} waveforms, {} points",
            channel,
            addresses.len(),
            samples.len()
        );
        Ok(WaveformMemory { samples, addresses })
    }

    pub fn address(&self, key: &WaveformKey) -> Option<Samples> {
        self.addresses.get(key).copied()
    }
}

/// Encode the bit fields of one entry.
pub fn encode_entry(
    entry: &LLEntry,
    memory: &WaveformMemory,
    channel: &str,
    shot: usize,
) -> Result<LinkListWord> {
    let constraint = |msg: String| Error::format_constraint(channel, Some(shot), msg);
    if entry.length % ADDRESS_UNIT != 0 {
        return Err(constraint(format!(
            "Entry length of {} samples is not a multiple of {ADDRESS_UNIT}.",
            entry.length
        )));
    }
    let address = memory.address(&entry.key).ok_or_else(|| {
        Error::invariant(format!("Waveform {} of '{channel}' has no address.", entry.key))
    })?;
    let count = u16::try_from(entry.length / ADDRESS_UNIT)
        .map_err(|_| constraint(format!("Entry of {} samples is too long.", entry.length)))?;
    let repeat = u16::try_from(entry.repeat)
        .map_err(|_| constraint(format!("Repeat count {} is too large.", entry.repeat)))?;

    let mut offset = (address / ADDRESS_UNIT) as u16 & ADDRESS_MASK;
    if entry.is_hold {
        offset |= HOLD_FLAG;
    }
    if entry.is_zero() {
        offset |= ZERO_FLAG;
    }
    if entry.is_first {
        offset |= FIRST_FLAG;
    }
    if entry.is_last {
        offset |= LAST_FLAG;
    }
    let trigger = match entry.trigger {
        None => 0,
        Some(Trigger { delay, mode }) => {
            let units = delay / ADDRESS_UNIT;
            if units >= MAX_TRIGGER_DELAY {
                return Err(constraint(format!(
                    "Trigger delay of {units} address units must be below {MAX_TRIGGER_DELAY}."
                )));
            }
            offset |= TRIGGER_FLAG;
            (mode.bits() << TRIGGER_MODE_SHIFT) | (units as u16 & TRIGGER_DELAY_MASK)
        }
    };
    Ok(LinkListWord {
        offset,
        count,
        trigger,
        repeat,
    })
}

/// Pack mini-sequences into banks without splitting any of them.
pub fn pack_banks(minilists: Vec<Vec<LinkListWord>>, channel: &str) -> Result<Vec<Vec<LinkListWord>>> {
    let mut banks = vec![];
    let mut current: Vec<LinkListWord> = Vec::with_capacity(BANK_SIZE);
    for (shot, minilist) in minilists.into_iter().enumerate() {
        if !MINILIST_ENTRIES.contains(&minilist.len()) {
            return Err(Error::format_constraint(
                channel,
                Some(shot),
                format!(
                    "Mini-sequence has {} entries, must have between {} and {}.",
                    minilist.len(),
                    MINILIST_ENTRIES.start(),
                    MINILIST_ENTRIES.end()
                ),
            ));
        }
        if current.len() + minilist.len() > BANK_SIZE {
            banks.push(std::mem::replace(&mut current, Vec::with_capacity(BANK_SIZE)));
        }
        current.extend(minilist);
    }
    if !current.is_empty() {
        banks.push(current);
    }
    Ok(banks)
}

/// Positions at which the marker level changes within one shot.
fn marker_edges(
    entries: &[LLEntry],
    library: &WaveformLibrary,
    channel: &str,
) -> Result<Vec<(Samples, TriggerMode)>> {
    let mut edges = vec![];
    let mut level = false;
    let mut toggle = |high: bool, at: Samples, edges: &mut Vec<(Samples, TriggerMode)>| {
        if high != level {
            level = high;
            let mode = if high {
                TriggerMode::RisingEdge
            } else {
                TriggerMode::FallingEdge
            };
            edges.push((at, mode));
        }
    };
    let mut position: Samples = 0;
    for entry in entries {
        let values = library
            .get(&entry.key)
            .ok_or_else(|| {
                Error::invariant(format!(
                    "Waveform {} of '{channel}' missing from library.",
                    entry.key
                ))
            })?
            .real_part();
        if entry.is_hold {
            let high = values.first().is_some_and(|v| *v != 0.0);
            toggle(high, position, &mut edges);
        } else {
            for repetition in 0..Samples::from(entry.repeat) {
                let start = position + repetition * entry.length;
                for (i, value) in values.iter().take(entry.length as usize).enumerate() {
                    toggle(*value != 0.0, start + i as Samples, &mut edges);
                }
            }
        }
        position += entry.total_length();
    }
    Ok(edges)
}

/// Attach marker edges as triggers to the entries of the paired analog output.
///
/// Edges must lie on the address grid. Holds are split at each edge so that
/// every edge gets its own entry. Waveform entries can carry a single trigger
/// only.
fn attach_triggers(
    entries: &[LLEntry],
    edges: &[(Samples, TriggerMode)],
    channel: &str,
    shot: usize,
) -> Result<Vec<LLEntry>> {
    let constraint = |msg: String| Error::format_constraint(channel, Some(shot), msg);
    let mut folded = Vec::with_capacity(entries.len() + edges.len());
    let mut edges = edges.iter().peekable();
    let mut position: Samples = 0;
    for entry in entries {
        let end = position + entry.total_length();
        let mut current = entry.clone();
        let mut start = position;
        while let Some(&&(at, mode)) = edges.peek()
            && at < end
        {
            edges.next();
            if at % ADDRESS_UNIT != 0 {
                return Err(constraint(format!(
                    "Marker transition at sample {at} is not on the {ADDRESS_UNIT}-sample grid."
                )));
            }
            if current.is_hold {
                if current.repeat != 1 {
                    current.length = current.total_length();
                    current.repeat = 1;
                }
                let split = at - start;
                if split > 0 {
                    let mut head = current.clone();
                    head.length = split;
                    folded.push(head);
                    current.length -= split;
                    current.trigger = None;
                    start = at;
                }
            } else if current.trigger.is_some() {
                return Err(constraint(format!(
                    "Second marker transition at sample {at} inside one waveform entry."
                )));
            }
            current.trigger = Some(Trigger {
                delay: at - start,
                mode,
            });
        }
        folded.push(current);
        position = end;
    }
    if let Some((at, _)) = edges.next() {
        return Err(Error::invariant(format!(
            "Marker transition at sample {at} of '{channel}' lies beyond the shot."
        )));
    }
    mark_minilist(&mut folded);
    Ok(folded)
}

fn check_address_grid(program: &ChannelProgram, channel: &str) -> Result<()> {
    for (shot, entries) in program.shots.iter().enumerate() {
        if let Some(entry) = entries.iter().find(|e| e.length % ADDRESS_UNIT != 0) {
            return Err(Error::format_constraint(
                channel,
                Some(shot),
                format!(
                    "Entry length of {} samples is not a multiple of {ADDRESS_UNIT}.",
                    entry.length
                ),
            ));
        }
    }
    Ok(())
}

fn program<'a>(set: &'a HardwareWaveformSet, port: &str) -> Result<&'a ChannelProgram> {
    set.channel(port).ok_or_else(|| {
        Error::invariant(format!("Instrument '{}' has no output {port}.", set.instrument))
    })
}

/// Count stored in an i16 attribute.
fn count_attribute(count: usize, name: &str, channel: &str) -> Result<i16> {
    i16::try_from(count).map_err(|_| {
        Error::format_constraint(
            channel,
            None,
            format!("'{name}' of {count} exceeds the i16 attribute range."),
        )
    })
}

/// Link-list group of one analog output.
fn encode_channel(set: &HardwareWaveformSet, port: &str) -> Result<Group> {
    let channel = format!("{}-{port}", set.instrument);
    let analog = program(set, port)?;
    let marker_port = format!("{port}m1");
    let marker = program(set, &marker_port)?;
    check_address_grid(analog, &channel)?;

    let mut group = Group::new();
    group.set_attribute("isLinkListData", Data::I16(vec![1]));
    if !analog.has_content && !marker.has_content {
        group.add_dataset("waveformLib", Data::I16(vec![0; ADDRESS_UNIT as usize]));
        group
            .group_mut("linkListData")
            .set_attribute("numBanks", Data::I16(vec![0]));
        return Ok(group);
    }

    let shots = if marker.has_content {
        let marker_channel = format!("{}-{marker_port}", set.instrument);
        analog
            .shots
            .iter()
            .zip(marker.shots.iter())
            .enumerate()
            .map(|(shot, (entries, marker_entries))| {
                let edges = marker_edges(marker_entries, &marker.library, &marker_channel)?;
                attach_triggers(entries, &edges, &channel, shot)
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        analog.shots.clone()
    };

    let memory = WaveformMemory::build(&analog.library, &shots, &channel)?;
    let minilists = shots
        .iter()
        .enumerate()
        .map(|(shot, entries)| {
            entries
                .iter()
                .map(|entry| encode_entry(entry, &memory, &channel, shot))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let banks = pack_banks(minilists, &channel)?;

    let num_banks = count_attribute(banks.len(), "numBanks", &channel)?;
    group.add_dataset("waveformLib", Data::I16(memory.samples));
    let link_list = group.group_mut("linkListData");
    link_list.set_attribute("numBanks", Data::I16(vec![num_banks]));
    for (index, bank) in banks.iter().enumerate() {
        let length = count_attribute(bank.len(), "length", &channel)?;
        let bank_group = link_list.group_mut(format!("bank{}", index + 1));
        bank_group.set_attribute("length", Data::I16(vec![length]));
        let field = |get: fn(&LinkListWord) -> u16| {
            let mut values: Vec<u16> = bank.iter().map(get).collect();
            values.resize(BANK_SIZE, 0);
            Data::U16(values)
        };
        bank_group.add_dataset("offset", field(|w| w.offset));
        bank_group.add_dataset("count", field(|w| w.count));
        bank_group.add_dataset("trigger", field(|w| w.trigger));
        bank_group.add_dataset("repeat", field(|w| w.repeat));
    }
    Ok(group)
}

/// Encoder for bank/link-list instruments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApsEncoder;

impl SequenceEncoder for ApsEncoder {
    fn encode(&self, set: &HardwareWaveformSet, settings: &CompilerSettings) -> Result<Group> {
        let mut root = Group::new();
        root.set_attribute("Version", Data::F64(vec![settings.file_version]));
        let mut active = vec![];
        let mut channels = vec![];
        for (index, port) in ANALOG_PORTS.iter().enumerate() {
            let group = encode_channel(set, port)?;
            let banks = group
                .group("linkListData")?
                .attribute("numBanks")?
                .as_i16()
                .and_then(|v| v.first().copied())
                .unwrap_or(0);
            if banks > 0 {
                active.push(index as i16 + 1);
            }
            channels.push((format!("chan_{}", index + 1), group));
        }
        root.set_attribute("channelDataFor", Data::I16(active));
        for (name, group) in channels {
            root.groups.insert(name, group);
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numeric_array::NumericArray;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn word(n: u16) -> LinkListWord {
        LinkListWord {
            offset: n,
            count: 1,
            trigger: 0,
            repeat: 1,
        }
    }

    fn minilist(len: usize) -> Vec<LinkListWord> {
        (0..len).map(|i| word(i as u16)).collect()
    }

    fn memory_with(library: &WaveformLibrary, entries: &[LLEntry]) -> WaveformMemory {
        WaveformMemory::build(library, &[entries.to_vec()], "APS1-1").unwrap()
    }

    #[test]
    fn test_ramp_and_hold_entry_fields() {
        let mut library = WaveformLibrary::new();
        let ramp = library.insert(Arc::new(NumericArray::Float64(
            (1..=40).map(|i| i as f64 / 40.0).collect(),
        )));
        let hold = library.insert(Arc::new(NumericArray::Float64(vec![0.5])));
        let mut entries = vec![LLEntry::new(ramp, 40, false), LLEntry::new(hold, 16, true)];
        entries[1].repeat = 3;
        mark_minilist(&mut entries);

        let memory = memory_with(&library, &entries);
        // TAZ unit + 40 samples + hold unit
        assert_eq!(memory.samples.len(), 4 + 40 + 4);
        assert_eq!(memory.samples[43], 8191);
        assert_eq!(&memory.samples[44..], &[4096; 4]);

        let first = encode_entry(&entries[0], &memory, "APS1-1", 0).unwrap();
        assert_eq!(first.offset, 1 | FIRST_FLAG);
        assert_eq!(first.count, 10);
        assert_eq!(first.repeat, 1);
        let second = encode_entry(&entries[1], &memory, "APS1-1", 0).unwrap();
        assert_eq!(second.offset, 11 | HOLD_FLAG | LAST_FLAG);
        assert_eq!(second.count, 4);
        assert_eq!(second.repeat, 3);

        let banks = pack_banks(vec![vec![first, second]], "APS1-1").unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].len(), 2);
    }

    #[test]
    fn test_zero_entry_flags() {
        let library = WaveformLibrary::new();
        let entries = vec![LLEntry::taz(8)];
        let memory = memory_with(&library, &entries);
        let encoded = encode_entry(&entries[0], &memory, "APS1-1", 0).unwrap();
        assert_eq!(encoded.offset, HOLD_FLAG | ZERO_FLAG);
        assert_eq!(encoded.count, 2);
    }

    #[test]
    fn test_length_off_grid() {
        let library = WaveformLibrary::new();
        let entries = vec![LLEntry::taz(6)];
        let memory = memory_with(&library, &entries);
        match encode_entry(&entries[0], &memory, "APS1-1", 3) {
            Err(Error::FormatConstraint { channel, shot, .. }) => {
                assert_eq!(channel, "APS1-1");
                assert_eq!(shot, Some(3));
            }
            other => panic!("expected format constraint, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_field() {
        let library = WaveformLibrary::new();
        let mut entry = LLEntry::taz(8);
        let memory = memory_with(&library, std::slice::from_ref(&entry));
        entry.trigger = Some(Trigger {
            delay: 4 * 100,
            mode: TriggerMode::FallingEdge,
        });
        let encoded = encode_entry(&entry, &memory, "APS1-1", 0).unwrap();
        assert_eq!(encoded.trigger, (0b10 << 14) | 100);
        assert_ne!(encoded.offset & TRIGGER_FLAG, 0);

        entry.trigger = Some(Trigger {
            delay: 4 * 65535,
            mode: TriggerMode::RisingEdge,
        });
        assert!(encode_entry(&entry, &memory, "APS1-1", 0).is_ok());
        entry.trigger = Some(Trigger {
            delay: 4 * 65536,
            mode: TriggerMode::RisingEdge,
        });
        assert!(matches!(
            encode_entry(&entry, &memory, "APS1-1", 0),
            Err(Error::FormatConstraint { .. })
        ));
    }

    #[test]
    fn test_count_attribute_range() {
        assert_eq!(count_attribute(512, "length", "APS1-1").unwrap(), 512);
        match count_attribute(40000, "numBanks", "APS1-1") {
            Err(Error::FormatConstraint { channel, shot, .. }) => {
                assert_eq!(channel, "APS1-1");
                assert_eq!(shot, None);
            }
            other => panic!("expected format constraint, got {other:?}"),
        }
    }

    #[test]
    fn test_bank_rollover() {
        // 300 shots of two entries: 600 entries in total
        let minilists = (0..300).map(|_| minilist(2)).collect();
        let banks = pack_banks(minilists, "APS1-1").unwrap();
        assert_eq!(banks.len(), 2);
        assert_eq!(banks[0].len(), 512);
        assert_eq!(banks[1].len(), 88);
    }

    #[test]
    fn test_minilist_bounds() {
        assert!(pack_banks(vec![minilist(2), minilist(511)], "APS1-1").is_ok());
        for len in [0, 1, 512] {
            match pack_banks(vec![minilist(4), minilist(len)], "APS1-1") {
                Err(Error::FormatConstraint { shot, .. }) => assert_eq!(shot, Some(1)),
                other => panic!("expected format constraint, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_memory_overflow() {
        let mut library = WaveformLibrary::new();
        let key = library.insert(Arc::new(NumericArray::Float64(vec![0.1; 8192])));
        let entries = vec![LLEntry::new(key, 8192, false), LLEntry::taz(4)];
        match WaveformMemory::build(&library, &[entries], "APS1-3") {
            Err(Error::FormatConstraint { channel, .. }) => assert_eq!(channel, "APS1-3"),
            other => panic!("expected format constraint, got {other:?}"),
        }
    }

    #[test]
    fn test_memory_shared_across_shots() {
        let mut library = WaveformLibrary::new();
        let key = library.insert(Arc::new(NumericArray::Float64(vec![0.25; 3])));
        let shot = vec![LLEntry::new(key, 4, false), LLEntry::taz(4)];
        let memory = WaveformMemory::build(&library, &[shot.clone(), shot], "APS1-1").unwrap();
        // padded to one address unit, stored once
        assert_eq!(memory.samples.len(), 8);
        assert_eq!(memory.samples[7], 0);
        assert_eq!(memory.address(&key), Some(4));
    }

    #[test]
    fn test_marker_edges_fold_into_holds() {
        let mut library = WaveformLibrary::new();
        let high = library.insert(Arc::new(NumericArray::Float64(vec![1.0])));
        let marker = vec![LLEntry::taz(12), LLEntry::new(high, 8, true), LLEntry::taz(12)];
        let edges = marker_edges(&marker, &library, "APS2-2m1").unwrap();
        assert_eq!(
            edges,
            vec![(12, TriggerMode::RisingEdge), (20, TriggerMode::FallingEdge)]
        );

        let mut analog = vec![LLEntry::taz(8), LLEntry::taz(8)];
        analog[0].repeat = 2;
        let folded = attach_triggers(&analog, &edges, "APS2-2", 0).unwrap();
        let layout: Vec<_> = folded
            .iter()
            .map(|e| (e.length, e.repeat, e.trigger.map(|t| (t.delay, t.mode))))
            .collect();
        assert_eq!(
            layout,
            vec![
                (12, 1, None),
                (4, 1, Some((0, TriggerMode::RisingEdge))),
                (4, 1, None),
                (4, 1, Some((0, TriggerMode::FallingEdge))),
            ]
        );
        assert!(folded[0].is_first && folded[3].is_last);
        assert!(!folded[1].is_first && !folded[1].is_last);
    }

    #[test]
    fn test_two_edges_in_waveform_entry() {
        let mut library = WaveformLibrary::new();
        let pulse = library.insert(Arc::new(NumericArray::Float64(vec![0.5; 12])));
        let analog = vec![LLEntry::new(pulse, 12, false)];
        let edges = [(4, TriggerMode::RisingEdge), (8, TriggerMode::FallingEdge)];
        assert!(matches!(
            attach_triggers(&analog, &edges, "APS1-1", 2),
            Err(Error::FormatConstraint { shot: Some(2), .. })
        ));
        let single = attach_triggers(&analog, &edges[..1], "APS1-1", 0).unwrap();
        assert_eq!(single[0].trigger.unwrap().delay, 4);
    }

    #[test]
    fn test_off_grid_edge_rejected() {
        let mut library = WaveformLibrary::new();
        let pulse = library.insert(Arc::new(NumericArray::Float64(vec![0.5; 8])));
        for analog in [vec![LLEntry::taz(16)], vec![LLEntry::new(pulse, 8, false)]] {
            match attach_triggers(&analog, &[(5, TriggerMode::FallingEdge)], "APS1-1", 1) {
                Err(Error::FormatConstraint { message, shot, .. }) => {
                    assert_eq!(shot, Some(1));
                    assert!(message.contains("grid"), "{message}");
                }
                other => panic!("expected format constraint, got {other:?}"),
            }
        }
    }

    proptest! {
        #[test]
        fn banks_reconstruct_entries(lengths in prop::collection::vec(2usize..=511, 0..20)) {
            let minilists: Vec<Vec<LinkListWord>> = lengths
                .iter()
                .enumerate()
                .map(|(shot, len)| {
                    (0..*len)
                        .map(|i| LinkListWord { offset: i as u16, count: shot as u16, trigger: 0, repeat: 1 })
                        .collect()
                })
                .collect();
            let banks = pack_banks(minilists.clone(), "APS1-1").unwrap();
            let flat: Vec<LinkListWord> = banks.iter().flatten().copied().collect();
            prop_assert_eq!(flat, minilists.iter().flatten().copied().collect::<Vec<_>>());
            for bank in banks.iter() {
                prop_assert!(bank.len() <= BANK_SIZE);
                // every mini-sequence is complete within its bank
                let first = bank[0].count;
                let last = bank[bank.len() - 1].count;
                prop_assert_eq!(bank[0].offset, 0);
                prop_assert_eq!(
                    bank.iter().filter(|w| w.count == last).count(),
                    lengths[last as usize]
                );
                prop_assert_eq!(
                    bank.iter().filter(|w| w.count == first).count(),
                    lengths[first as usize]
                );
            }
        }
    }
}
