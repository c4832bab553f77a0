// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Mapping of compiled logical channels onto instrument outputs.
//!
//! Quadrature channels are split into corrected I and Q outputs, all
//! channels are shifted by their delays inside a common timing frame, gate
//! markers are synthesized from pulse envelopes, and every output without
//! content is filled with zeros of the shot length.

mod awg_delays;
mod gates;
mod iq;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use compiler_log::{diagnostic, info, warn};
use indexmap::{IndexMap, IndexSet};
use numeric_array::NumericArray;

use crate::compile_sequence::CompiledSequence;
use crate::device_traits::{AwgFamily, PortKind};
use crate::link_list::{LLEntry, mark_minilist, total_length};
use crate::sequence::ChannelId;
use crate::settings::CompilerSettings;
use crate::timing::{length_to_samples, validate_sampling_rate};
use crate::topology::{InstrumentId, Topology};
use crate::waveform_library::{WaveformKey, WaveformLibraries, WaveformLibrary};
use crate::{Error, Result};

use awg_delays::{ShotTiming, pad_entries, shift_samples};
use gates::{GateShape, Interval};

/// Real-valued program of one instrument output.
#[derive(Debug, Clone)]
pub struct ChannelProgram {
    /// Link-list entries of every shot.
    pub shots: Vec<Vec<LLEntry>>,
    /// Waveforms addressed by the entries.
    pub library: WaveformLibrary,
    /// A logical channel or a gate drives this output.
    pub has_content: bool,
}

impl ChannelProgram {
    fn empty(shot_count: usize) -> Self {
        ChannelProgram {
            shots: vec![vec![]; shot_count],
            library: WaveformLibrary::new(),
            has_content: false,
        }
    }
}

/// Everything one instrument plays.
#[derive(Debug, Clone)]
pub struct HardwareWaveformSet {
    pub instrument: String,
    pub family: AwgFamily,
    /// Programs keyed by output port, in the family's port order.
    pub channels: IndexMap<&'static str, ChannelProgram>,
}

impl HardwareWaveformSet {
    fn new(instrument: &str, family: AwgFamily, shot_count: usize) -> Self {
        HardwareWaveformSet {
            instrument: instrument.to_string(),
            family,
            channels: family
                .ports()
                .map(|port| (port, ChannelProgram::empty(shot_count)))
                .collect(),
        }
    }

    pub fn channel(&self, port: &str) -> Option<&ChannelProgram> {
        self.channels.get(port)
    }

    pub fn shot_count(&self) -> usize {
        self.channels.values().next().map_or(0, |c| c.shots.len())
    }
}

struct GateRoute {
    instrument: InstrumentId,
    port: &'static str,
    shift: i64,
    shape: GateShape,
}

/// Where a logical channel ends up.
struct Route<'a> {
    channel: &'a ChannelId,
    library: &'a WaveformLibrary,
    instrument: InstrumentId,
    ports: Vec<&'static str>,
    shift: i64,
    gate: Option<GateRoute>,
}

fn port_of(family: AwgFamily, suffix: &str) -> Result<&'static str> {
    family.ports().find(|port| *port == suffix).ok_or_else(|| {
        Error::invariant(format!(
            "Port '{suffix}' does not exist on {} instruments.",
            family.as_str()
        ))
    })
}

fn set_mut(sets: &mut [HardwareWaveformSet], instrument: InstrumentId) -> &mut HardwareWaveformSet {
    &mut sets[instrument.0]
}

fn program_mut<'s>(
    sets: &'s mut [HardwareWaveformSet],
    instrument: InstrumentId,
    port: &str,
) -> Result<&'s mut ChannelProgram> {
    let set = set_mut(sets, instrument);
    let name = set.instrument.clone();
    set.channels
        .get_mut(port)
        .ok_or_else(|| Error::invariant(format!("Instrument '{name}' has no port '{port}'.")))
}

/// Resolve a logical channel and install its output libraries.
fn route_channel<'a>(
    channel: &'a ChannelId,
    libraries: &'a WaveformLibraries,
    topology: &Topology,
    sets: &mut [HardwareWaveformSet],
    sampling_rate: f64,
    grid: u64,
) -> Result<Route<'a>> {
    let physical = topology.physical_channel(topology.resolve(channel)?);
    let family = topology.instrument(physical.instrument).family;
    let library = libraries.get(channel).ok_or_else(|| {
        Error::invariant(format!("No waveform library for channel '{channel}'."))
    })?;

    let outputs = match physical.kind {
        PortKind::Quadrature => {
            let (i_port, q_port) = family.quadrature_ports(&physical.suffix).ok_or_else(|| {
                Error::invariant(format!("'{}' is not a quadrature channel.", physical.name))
            })?;
            let (i_library, q_library) = iq::decompose(library, &physical.correction);
            vec![(i_port, i_library), (q_port, q_library)]
        }
        PortKind::Analog | PortKind::Marker => {
            vec![(port_of(family, &physical.suffix)?, iq::project_real(library))]
        }
    };
    let mut ports = Vec::with_capacity(outputs.len());
    for (port, output_library) in outputs {
        let program = program_mut(sets, physical.instrument, port)?;
        program.library = output_library;
        program.has_content = true;
        ports.push(port);
    }

    let gate = match &physical.gate {
        None => None,
        Some(wiring) => {
            let marker = topology.physical_channel(wiring.channel);
            let marker_family = topology.instrument(marker.instrument).family;
            Some(GateRoute {
                instrument: marker.instrument,
                port: port_of(marker_family, &marker.suffix)?,
                shift: shift_samples(marker.delay + wiring.delay, sampling_rate, grid)?,
                shape: GateShape {
                    buffer: length_to_samples(wiring.buffer, sampling_rate)? as i64,
                    min_width: length_to_samples(wiring.min_width, sampling_rate)? as i64,
                    grid: i64::from(marker_family.traits().sample_multiple),
                },
            })
        }
    };

    Ok(Route {
        channel,
        library,
        instrument: physical.instrument,
        ports,
        shift: shift_samples(physical.delay, sampling_rate, grid)?,
        gate,
    })
}

/// Map compiled shots onto the outputs of every instrument in `topology`.
///
/// Returns one [`HardwareWaveformSet`] per instrument, in topology order.
/// Within a shot every output of every instrument has the same length.
pub fn map_to_hardware(
    shots: &[CompiledSequence],
    libraries: &WaveformLibraries,
    topology: &Topology,
    settings: &CompilerSettings,
    sampling_rate: f64,
) -> Result<Vec<HardwareWaveformSet>> {
    validate_sampling_rate(sampling_rate)?;
    let grid = topology.timing_grid();
    let mut settings = settings.clone();
    for change in settings.sanitize(sampling_rate, grid)? {
        warn!(
            "Setting '{}' changed from {} to {}: {}",
            change.field, change.original, change.sanitized, change.reason
        );
    }
    let margin = settings.margin_samples(sampling_rate, grid);

    let mut sets: Vec<HardwareWaveformSet> = topology
        .instruments()
        .map(|(_, inst)| HardwareWaveformSet::new(&inst.name, inst.family, shots.len()))
        .collect();

    let channels: IndexSet<&ChannelId> = shots.iter().flat_map(|s| s.entries.keys()).collect();
    let mut routes = Vec::with_capacity(channels.len());
    for channel in channels {
        routes.push(route_channel(
            channel,
            libraries,
            topology,
            &mut sets,
            sampling_rate,
            grid,
        )?);
    }

    let driven: HashSet<(InstrumentId, &str)> = routes
        .iter()
        .flat_map(|r| r.ports.iter().map(move |p| (r.instrument, *p)))
        .collect();
    let mut gate_highs: HashMap<(InstrumentId, &'static str), WaveformKey> = HashMap::new();
    for gate in routes.iter().filter_map(|r| r.gate.as_ref()) {
        if driven.contains(&(gate.instrument, gate.port)) {
            return Err(Error::validation(format!(
                "Output {} of '{}' is used both as a gate and by a logical channel.",
                gate.port, sets[gate.instrument.0].instrument
            )));
        }
        if !gate_highs.contains_key(&(gate.instrument, gate.port)) {
            let program = program_mut(&mut sets, gate.instrument, gate.port)?;
            program.has_content = true;
            let high = program
                .library
                .insert(Arc::new(NumericArray::Float64(vec![1.0])));
            gate_highs.insert((gate.instrument, gate.port), high);
        }
    }

    for (index, shot) in shots.iter().enumerate() {
        let base = shot.length().ok_or_else(|| {
            Error::invariant(format!("Channels of shot {index} differ in length."))
        })?;
        let present: Vec<(&Route, &Vec<LLEntry>)> = routes
            .iter()
            .filter_map(|r| shot.entries.get(r.channel).map(|e| (r, e)))
            .collect();
        let shifts: Vec<i64> = present
            .iter()
            .flat_map(|(r, _)| std::iter::once(r.shift).chain(r.gate.as_ref().map(|g| g.shift)))
            .collect();
        let timing = ShotTiming::new(&shifts, margin, base);
        let total = timing.total();

        // Highs and the widest minimum width of the sources of each gate output.
        let mut gate_intervals: IndexMap<(InstrumentId, &'static str), (Vec<Interval>, i64)> =
            IndexMap::new();
        for (route, entries) in present.iter() {
            let padded = pad_entries(entries, timing.head(route.shift), timing.tail(route.shift));
            for port in route.ports.iter() {
                program_mut(&mut sets, route.instrument, port)?.shots[index] = padded.clone();
            }
            if let Some(gate) = &route.gate {
                let offset = timing.head(gate.shift) as i64;
                let envelope: Vec<Interval> = gates::envelope_intervals(entries, route.library)?
                    .into_iter()
                    .map(|(start, end)| (start + offset, end + offset))
                    .collect();
                let shaped = gates::shape_gate(&envelope, gate.shape, total as i64);
                let (merged, min_width) =
                    gate_intervals.entry((gate.instrument, gate.port)).or_default();
                let combined = gates::union(merged, &shaped);
                *merged = combined;
                *min_width = (*min_width).max(gate.shape.min_width);
            }
        }
        for ((instrument, port), high) in gate_highs.iter() {
            let intervals = gate_intervals
                .get(&(*instrument, *port))
                .map(|(highs, min_width)| gates::close_gaps(highs, *min_width))
                .unwrap_or_default();
            program_mut(&mut sets, *instrument, port)?.shots[index] =
                gates::gate_entries(&intervals, total, *high);
        }

        // Idle outputs are padded like a channel without shift playing zeros.
        let idle: Vec<LLEntry> = (base > 0).then(|| LLEntry::taz(base)).into_iter().collect();
        for set in sets.iter_mut() {
            for (port, program) in set.channels.iter_mut() {
                let entries = &mut program.shots[index];
                if entries.is_empty() {
                    *entries = pad_entries(&idle, timing.head(0), timing.tail(0));
                }
                if total_length(entries) != total {
                    return Err(Error::invariant(format!(
                        "Output {port} of '{}' is {} samples long in shot {index}, expected {total}.",
                        set.instrument,
                        total_length(entries)
                    )));
                }
                mark_minilist(entries);
            }
        }
        diagnostic!(
            "Shot {index}: {total} samples, shifts +{}/-{} samples",
            timing.max_fwd(),
            timing.max_back()
        );
    }

    for set in sets.iter() {
        info!(
            "Mapped {} shots onto {} ({} outputs in use)",
            shots.len(),
            set.instrument,
            set.channels.values().filter(|c| c.has_content).count()
        );
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile_sequence::compile_shots;
    use crate::sequence::{Block, Pulse};
    use crate::topology::tests::TOPOLOGY;

    fn shot(channel: &str, entries: Vec<LLEntry>) -> CompiledSequence {
        CompiledSequence {
            entries: [(ChannelId::from(channel), entries)].into_iter().collect(),
        }
    }

    #[test]
    fn test_unknown_logical_channel() {
        let topology = Topology::from_json(TOPOLOGY).unwrap();
        let mut libraries = WaveformLibraries::new();
        libraries.insert("q7".into(), WaveformLibrary::new());
        let result = map_to_hardware(
            &[shot("q7", vec![LLEntry::taz(8)])],
            &libraries,
            &topology,
            &CompilerSettings::default(),
            1e9,
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_gate_port_driven_twice() {
        let json = TOPOLOGY.replace(
            r#"{"name": "digitizerTrig", "physical_channel": "APS2-2m1"}"#,
            r#"{"name": "digitizerTrig", "physical_channel": "APS2-1m1"}"#,
        );
        let topology = Topology::from_json(&json).unwrap();
        let mut libraries = WaveformLibraries::new();
        libraries.insert("q1".into(), WaveformLibrary::new());
        libraries.insert("digitizerTrig".into(), WaveformLibrary::new());
        let mut compiled = shot("q1", vec![LLEntry::taz(8)]);
        compiled
            .entries
            .insert("digitizerTrig".into(), vec![LLEntry::taz(8)]);
        let result = map_to_hardware(
            &[compiled],
            &libraries,
            &topology,
            &CompilerSettings::default(),
            1e9,
        );
        match result {
            Err(Error::Validation(msg)) => assert!(msg.contains("both as a gate"), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unequal_channel_lengths() {
        let topology = Topology::from_json(TOPOLOGY).unwrap();
        let mut libraries = WaveformLibraries::new();
        libraries.insert("q1".into(), WaveformLibrary::new());
        libraries.insert("M-q1".into(), WaveformLibrary::new());
        let mut compiled = shot("q1", vec![LLEntry::taz(8)]);
        compiled.entries.insert("M-q1".into(), vec![LLEntry::taz(12)]);
        let result = map_to_hardware(
            &[compiled],
            &libraries,
            &topology,
            &CompilerSettings::default(),
            1e9,
        );
        assert!(matches!(result, Err(Error::Invariant(_))));
    }

    #[test]
    fn test_shared_gate_closes_gaps_between_sources() {
        let topology = Topology::from_json(
            r#"{
                "instruments": [{"name": "TEK1", "kind": "Tek5014"}],
                "physical_channels": [
                    {"name": "TEK1-12", "instrument": "TEK1",
                     "gate": {"channel": "TEK1-1m1", "buffer": 0.0, "min_width": 40e-9}},
                    {"name": "TEK1-34", "instrument": "TEK1",
                     "gate": {"channel": "TEK1-1m1", "buffer": 0.0, "min_width": 20e-9}},
                    {"name": "TEK1-1m1", "instrument": "TEK1"}
                ],
                "logical_channels": [
                    {"name": "q1", "physical_channel": "TEK1-12"},
                    {"name": "q2", "physical_channel": "TEK1-34"}
                ]
            }"#,
        )
        .unwrap();
        // q1 plays [0, 50), q2 plays [60, 110)
        let sequence = vec![
            Block::default()
                .with_pulse(Pulse::hold("x", "q1".into(), 0.5, 50))
                .with_pulse(Pulse::hold("idle", "q2".into(), 0.0, 60)),
            Block::default().with_pulse(Pulse::hold("x", "q2".into(), 0.5, 50)),
        ];
        let (shots, libraries) = compile_shots(&[sequence], 1e9).unwrap();
        let settings = CompilerSettings {
            timing_margin: 0.0,
            ..CompilerSettings::default()
        };
        let sets = map_to_hardware(&shots, &libraries, &topology, &settings, 1e9).unwrap();
        let gate = sets[0].channel("1m1").unwrap();
        let layout: Vec<(u64, bool)> = gate.shots[0]
            .iter()
            .map(|e| (e.total_length(), e.is_zero()))
            .collect();
        // the 10-sample low between the sources is below the widest minimum width
        assert_eq!(layout, vec![(110, false)]);
    }

    #[test]
    fn test_no_shots() {
        let topology = Topology::from_json(TOPOLOGY).unwrap();
        let sets = map_to_hardware(
            &[],
            &WaveformLibraries::new(),
            &topology,
            &CompilerSettings::default(),
            1e9,
        )
        .unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].shot_count(), 0);
        assert!(sets.iter().all(|s| s.channels.values().all(|c| !c.has_content)));
    }
}
