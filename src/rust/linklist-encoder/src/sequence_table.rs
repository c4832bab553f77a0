// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Sequence-table encoder for the Tek5014 family.
//!
//! Every shot is flattened into one segment per analog output. The output's
//! two markers ride along in the top bits of each 16-bit word. Identical
//! segments are stored once, and the table steps through one segment per
//! shot, waiting for a trigger before each step.

use compiler_log::{diagnostic, warn};
use indexmap::IndexMap;
use sequence_compiler::settings::CompilerSettings;
use sequence_compiler::{ChannelProgram, HardwareWaveformSet};

use crate::container::{Data, Group};
use crate::replay::render_entries;
use crate::{Error, Result, SequenceEncoder, quantize};

const ANALOG_PORTS: [&str; 4] = ["1", "2", "3", "4"];
/// Offset-binary zero of the 14-bit analog code.
const ANALOG_ZERO: i32 = 8192;
const ANALOG_MASK: u16 = 0x3FFF;
const MARKER1_BIT: u16 = 1 << 14;
const MARKER2_BIT: u16 = 1 << 15;

/// Analog sample and marker levels combined into one output word.
pub fn pack_word(value: f64, marker1: bool, marker2: bool) -> (u16, bool) {
    let (quantized, clamped) = quantize(value);
    let mut word = (i32::from(quantized) + ANALOG_ZERO) as u16 & ANALOG_MASK;
    if marker1 {
        word |= MARKER1_BIT;
    }
    if marker2 {
        word |= MARKER2_BIT;
    }
    (word, clamped)
}

fn render_shot(program: &ChannelProgram, shot: usize) -> Result<Vec<f64>> {
    render_entries(&program.shots[shot], &program.library)
}

/// Words of one analog output and its markers for one shot.
fn shot_words(
    analog: &ChannelProgram,
    markers: [&ChannelProgram; 2],
    shot: usize,
    channel: &str,
    clamped: &mut usize,
) -> Result<Vec<u16>> {
    let values = render_shot(analog, shot)?;
    let marker1 = render_shot(markers[0], shot)?;
    let marker2 = render_shot(markers[1], shot)?;
    if marker1.len() != values.len() || marker2.len() != values.len() {
        return Err(Error::invariant(format!(
            "Outputs of '{channel}' differ in length in shot {shot}."
        )));
    }
    Ok(values
        .iter()
        .zip(marker1.iter().zip(marker2.iter()))
        .map(|(value, (m1, m2))| {
            let (word, was_clamped) = pack_word(*value, *m1 != 0.0, *m2 != 0.0);
            *clamped += usize::from(was_clamped);
            word
        })
        .collect())
}

/// 1-based segment number stored in the sequence table.
fn table_index(segment: usize, channel: &str, shot: usize) -> Result<u16> {
    u16::try_from(segment + 1).map_err(|_| {
        Error::format_constraint(
            channel,
            Some(shot),
            format!("Segment {} exceeds the sequence table index range.", segment + 1),
        )
    })
}

fn program<'a>(set: &'a HardwareWaveformSet, port: &str) -> Result<&'a ChannelProgram> {
    set.channel(port).ok_or_else(|| {
        Error::invariant(format!("Instrument '{}' has no output {port}.", set.instrument))
    })
}

/// Encoder for sequence-table instruments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceTableEncoder;

impl SequenceEncoder for SequenceTableEncoder {
    fn encode(&self, set: &HardwareWaveformSet, settings: &CompilerSettings) -> Result<Group> {
        let shot_count = set.shot_count();
        let mut root = Group::new();
        root.set_attribute("Version", Data::F64(vec![settings.file_version]));
        let mut active = vec![];
        let mut channels = vec![];
        for (index, port) in ANALOG_PORTS.iter().enumerate() {
            let channel = format!("{}-{port}", set.instrument);
            let analog = program(set, port)?;
            let markers = [
                program(set, &format!("{port}m1"))?,
                program(set, &format!("{port}m2"))?,
            ];
            if analog.has_content || markers.iter().any(|m| m.has_content) {
                active.push(index as i16 + 1);
            }

            let mut segments: IndexMap<Vec<u16>, usize> = IndexMap::new();
            let mut steps = Vec::with_capacity(shot_count);
            let mut clamped = 0;
            for shot in 0..shot_count {
                let words = shot_words(analog, markers, shot, &channel, &mut clamped)?;
                let next = segments.len();
                let segment = *segments.entry(words).or_insert(next);
                steps.push(table_index(segment, &channel, shot)?);
            }
            if clamped > 0 {
                warn!("Clamped {} samples of '{}' to [-1, 1]", clamped, channel);
            }
            diagnostic!(
                "'{}': {} distinct segments for {} shots",
                channel,
                segments.len(),
                shot_count
            );

            let mut group = Group::new();
            group.set_attribute("isLinkListData", Data::I16(vec![0]));
            group.add_dataset("segmentIndex", Data::U16(steps));
            let segment_group = group.group_mut("segments");
            for (words, segment) in segments {
                segment_group.add_dataset(format!("segment{}", segment + 1), Data::U16(words));
            }
            channels.push((format!("chan_{}", index + 1), group));
        }
        root.set_attribute("channelDataFor", Data::I16(active));
        for (name, group) in channels {
            root.groups.insert(name, group);
        }

        let table = root.group_mut("sequenceTable");
        table.add_dataset("waitTrigger", Data::U16(vec![1; shot_count]));
        table.add_dataset("repeat", Data::U16(vec![1; shot_count]));
        let mut goto = vec![0; shot_count];
        if let Some(last) = goto.last_mut() {
            *last = 1;
        }
        table.add_dataset("goto", Data::U16(goto));
        Ok(root)
    }
}
