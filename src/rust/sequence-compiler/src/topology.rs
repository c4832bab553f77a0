// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Channel topology: logical channel -> physical channel -> instrument.
//!
//! The topology arrives as a string-keyed [`TopologyDescription`] and is
//! resolved once into index handles. All cross references are checked at
//! resolve time, so the compiler never looks up names afterwards.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::device_traits::{AwgFamily, PortKind};
use crate::sequence::ChannelId;
use crate::timing::lcm;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentDescription {
    pub name: String,
    /// Hardware family tag, e.g. `"APS"`.
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateDescription {
    /// Physical marker channel driving the gate.
    pub channel: String,
    #[serde(default)]
    pub buffer: f64,
    #[serde(default)]
    pub min_width: f64,
    #[serde(default)]
    pub delay: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhysicalChannelDescription {
    /// `<instrument>-<suffix>`, e.g. `"APS1-12"`.
    pub name: String,
    pub instrument: Option<String>,
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub correction: Option<[[f64; 2]; 2]>,
    #[serde(default)]
    pub gate: Option<GateDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogicalChannelDescription {
    pub name: String,
    pub physical_channel: String,
}

/// Topology as persisted by the channel library.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyDescription {
    pub instruments: Vec<InstrumentDescription>,
    pub physical_channels: Vec<PhysicalChannelDescription>,
    pub logical_channels: Vec<LogicalChannelDescription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalChannelId(pub usize);

#[derive(Debug, Clone)]
pub struct Instrument {
    pub name: String,
    pub family: AwgFamily,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateWiring {
    pub channel: PhysicalChannelId,
    /// Seconds the gate opens before and closes after the pulse envelope.
    pub buffer: f64,
    /// Shortest gate interval, in seconds.
    pub min_width: f64,
    /// Extra shift of the gate path relative to the marker channel, in seconds.
    pub delay: f64,
}

pub const IDENTITY_CORRECTION: [[f64; 2]; 2] = [[1.0, 0.0], [0.0, 1.0]];

#[derive(Debug, Clone)]
pub struct PhysicalChannel {
    pub name: String,
    pub instrument: InstrumentId,
    pub suffix: String,
    pub kind: PortKind,
    /// Signed timing shift in seconds.
    pub delay: f64,
    pub correction: [[f64; 2]; 2],
    pub gate: Option<GateWiring>,
}

/// Resolved, validated topology.
#[derive(Debug, Clone)]
pub struct Topology {
    instruments: Vec<Instrument>,
    physical_channels: Vec<PhysicalChannel>,
    logical_channels: IndexMap<ChannelId, PhysicalChannelId>,
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::validation(format!("Duplicate {kind} name '{name}'.")));
        }
    }
    Ok(())
}

fn check_finite(what: &str, owner: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::validation(format!(
            "{what} of '{owner}' must be finite, got {value}."
        )));
    }
    Ok(())
}

fn check_duration(what: &str, owner: &str, value: f64) -> Result<()> {
    check_finite(what, owner, value)?;
    if value < 0.0 {
        return Err(Error::validation(format!(
            "{what} of '{owner}' must be non-negative, got {value}."
        )));
    }
    Ok(())
}

impl Topology {
    pub fn from_json(json: &str) -> Result<Self> {
        let description: TopologyDescription = serde_json::from_str(json)
            .map_err(|e| Error::validation(format!("Invalid topology description: {e}")))?;
        Topology::from_description(&description)
    }

    pub fn from_description(description: &TopologyDescription) -> Result<Self> {
        check_unique("instrument", description.instruments.iter().map(|i| i.name.as_str()))?;
        check_unique(
            "physical channel",
            description.physical_channels.iter().map(|c| c.name.as_str()),
        )?;
        check_unique(
            "logical channel",
            description.logical_channels.iter().map(|c| c.name.as_str()),
        )?;

        let instruments = description
            .instruments
            .iter()
            .map(|desc| {
                Ok(Instrument {
                    name: desc.name.clone(),
                    family: desc.kind.parse()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let instrument_ids: HashMap<&str, InstrumentId> = instruments
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.name.as_str(), InstrumentId(i)))
            .collect();
        let physical_ids: HashMap<&str, PhysicalChannelId> = description
            .physical_channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), PhysicalChannelId(i)))
            .collect();

        let mut physical_channels = Vec::with_capacity(description.physical_channels.len());
        for desc in description.physical_channels.iter() {
            let Some(instrument_name) = desc.instrument.as_deref() else {
                return Err(Error::validation(format!(
                    "Physical channel '{}' has no AWG assigned.",
                    desc.name
                )));
            };
            let instrument = *instrument_ids.get(instrument_name).ok_or_else(|| {
                Error::validation(format!(
                    "Physical channel '{}' references unknown instrument '{instrument_name}'.",
                    desc.name
                ))
            })?;
            let family = instruments[instrument.0].family;
            let suffix = desc
                .name
                .strip_prefix(instrument_name)
                .and_then(|s| s.strip_prefix('-'))
                .ok_or_else(|| {
                    Error::validation(format!(
                        "Physical channel '{}' must be named '{instrument_name}-<channel>'.",
                        desc.name
                    ))
                })?;
            let kind = family.port_kind(suffix).ok_or_else(|| {
                Error::validation(format!(
                    "Channel suffix '{suffix}' of '{}' is not valid for {} instruments.",
                    desc.name,
                    family.as_str()
                ))
            })?;
            check_finite("Delay", &desc.name, desc.delay)?;
            if let Some(correction) = desc.correction {
                if kind != PortKind::Quadrature {
                    return Err(Error::validation(format!(
                        "Mixer correction on '{}' requires a quadrature channel.",
                        desc.name
                    )));
                }
                for value in correction.iter().flatten() {
                    check_finite("Mixer correction", &desc.name, *value)?;
                }
            }
            let gate = match &desc.gate {
                None => None,
                Some(_) if kind != PortKind::Quadrature => {
                    return Err(Error::validation(format!(
                        "Gate wiring on '{}' requires a quadrature channel.",
                        desc.name
                    )));
                }
                Some(gate) => {
                    let channel = *physical_ids.get(gate.channel.as_str()).ok_or_else(|| {
                        Error::validation(format!(
                            "Gate of '{}' references unknown physical channel '{}'.",
                            desc.name, gate.channel
                        ))
                    })?;
                    check_duration("Gate buffer", &desc.name, gate.buffer)?;
                    check_duration("Gate minimum width", &desc.name, gate.min_width)?;
                    check_finite("Gate delay", &desc.name, gate.delay)?;
                    Some(GateWiring {
                        channel,
                        buffer: gate.buffer,
                        min_width: gate.min_width,
                        delay: gate.delay,
                    })
                }
            };
            physical_channels.push(PhysicalChannel {
                name: desc.name.clone(),
                instrument,
                suffix: suffix.to_string(),
                kind,
                delay: desc.delay,
                correction: desc.correction.unwrap_or(IDENTITY_CORRECTION),
                gate,
            });
        }

        // Gates are only wired from quadrature channels, and must land on
        // markers, so gate paths cannot form chains or cycles.
        for channel in physical_channels.iter() {
            if let Some(gate) = &channel.gate {
                let target = &physical_channels[gate.channel.0];
                if target.kind != PortKind::Marker {
                    return Err(Error::validation(format!(
                        "Gate of '{}' must be wired to a marker channel, '{}' is not one.",
                        channel.name, target.name
                    )));
                }
            }
        }
        validate_port_overlap(&physical_channels, &instruments)?;

        let mut logical_channels = IndexMap::new();
        let mut assigned: HashMap<PhysicalChannelId, &str> = HashMap::new();
        for desc in description.logical_channels.iter() {
            let physical = *physical_ids
                .get(desc.physical_channel.as_str())
                .ok_or_else(|| {
                    Error::validation(format!(
                        "Logical channel '{}' references unknown physical channel '{}'.",
                        desc.name, desc.physical_channel
                    ))
                })?;
            if let Some(other) = assigned.insert(physical, desc.name.as_str()) {
                return Err(Error::validation(format!(
                    "Logical channels '{other}' and '{}' share physical channel '{}'.",
                    desc.name, desc.physical_channel
                )));
            }
            logical_channels.insert(ChannelId::from(desc.name.as_str()), physical);
        }

        Ok(Topology {
            instruments,
            physical_channels,
            logical_channels,
        })
    }

    pub fn instruments(&self) -> impl Iterator<Item = (InstrumentId, &Instrument)> {
        self.instruments
            .iter()
            .enumerate()
            .map(|(i, inst)| (InstrumentId(i), inst))
    }

    pub fn instrument(&self, id: InstrumentId) -> &Instrument {
        &self.instruments[id.0]
    }

    pub fn physical_channel(&self, id: PhysicalChannelId) -> &PhysicalChannel {
        &self.physical_channels[id.0]
    }

    pub fn resolve(&self, channel: &ChannelId) -> Result<PhysicalChannelId> {
        self.logical_channels.get(channel).copied().ok_or_else(|| {
            Error::validation(format!(
                "Logical channel '{channel}' is not part of the channel topology."
            ))
        })
    }

    /// Grid all channel shifts are rounded to, in samples.
    ///
    /// Shifts are shared between instruments, so the grid satisfies every family.
    pub fn timing_grid(&self) -> u64 {
        self.instruments
            .iter()
            .map(|inst| u64::from(inst.family.traits().sample_multiple))
            .fold(1, lcm)
    }
}

/// Reject a quadrature pair and a single analog channel driving the same output.
fn validate_port_overlap(
    physical_channels: &[PhysicalChannel],
    instruments: &[Instrument],
) -> Result<()> {
    let mut used: HashMap<(InstrumentId, &str), &str> = HashMap::new();
    for channel in physical_channels {
        let family = instruments[channel.instrument.0].family;
        let ports: Vec<&str> = match channel.kind {
            PortKind::Quadrature => match family.quadrature_ports(&channel.suffix) {
                Some((i, q)) => vec![i, q],
                None => vec![],
            },
            _ => vec![channel.suffix.as_str()],
        };
        for port in ports {
            if let Some(other) = used.insert((channel.instrument, port), channel.name.as_str()) {
                return Err(Error::validation(format!(
                    "Physical channels '{other}' and '{}' both drive output {port}.",
                    channel.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TOPOLOGY: &str = r#"{
        "instruments": [
            {"name": "APS1", "kind": "APS"},
            {"name": "APS2", "kind": "APS"}
        ],
        "physical_channels": [
            {"name": "APS1-12", "instrument": "APS1", "delay": 0.0,
             "correction": [[1.0, 0.1], [0.2, 0.9]],
             "gate": {"channel": "APS2-1m1", "buffer": 8e-9, "min_width": 40e-9}},
            {"name": "APS1-34", "instrument": "APS1", "delay": 8e-9},
            {"name": "APS2-1m1", "instrument": "APS2", "delay": -4e-9},
            {"name": "APS2-2m1", "instrument": "APS2"}
        ],
        "logical_channels": [
            {"name": "q1", "physical_channel": "APS1-12"},
            {"name": "M-q1", "physical_channel": "APS1-34"},
            {"name": "digitizerTrig", "physical_channel": "APS2-2m1"}
        ]
    }"#;

    fn description() -> TopologyDescription {
        serde_json::from_str(TOPOLOGY).unwrap()
    }

    fn expect_validation_error(description: &TopologyDescription, needle: &str) {
        match Topology::from_description(description) {
            Err(Error::Validation(msg)) => assert!(msg.contains(needle), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve() {
        let topology = Topology::from_json(TOPOLOGY).unwrap();
        let q1 = topology.resolve(&"q1".into()).unwrap();
        let channel = topology.physical_channel(q1);
        assert_eq!(channel.kind, PortKind::Quadrature);
        assert_eq!(channel.suffix, "12");
        assert_eq!(topology.instrument(channel.instrument).name, "APS1");
        let gate = channel.gate.as_ref().unwrap();
        assert_eq!(topology.physical_channel(gate.channel).name, "APS2-1m1");
        assert_eq!(
            topology.physical_channel(topology.resolve(&"M-q1".into()).unwrap()).correction,
            IDENTITY_CORRECTION
        );
        assert_eq!(topology.timing_grid(), 4);
        assert!(topology.resolve(&"q9".into()).is_err());
    }

    #[test]
    fn test_missing_awg() {
        let mut desc = description();
        desc.physical_channels[1].instrument = None;
        expect_validation_error(&desc, "no AWG assigned");
    }

    #[test]
    fn test_unknown_instrument_type() {
        let mut desc = description();
        desc.instruments[0].kind = "X6".to_string();
        expect_validation_error(&desc, "Unsupported instrument type");
    }

    #[test]
    fn test_dangling_references() {
        let mut desc = description();
        desc.logical_channels[0].physical_channel = "APS3-12".to_string();
        expect_validation_error(&desc, "unknown physical channel");

        let mut desc = description();
        desc.physical_channels[0].gate.as_mut().unwrap().channel = "nowhere".to_string();
        expect_validation_error(&desc, "unknown physical channel");

        let mut desc = description();
        desc.physical_channels[2].instrument = Some("APS9".to_string());
        expect_validation_error(&desc, "unknown instrument");
    }

    #[test]
    fn test_suffix_not_allowed() {
        let mut desc = description();
        desc.physical_channels[3].name = "APS2-2m2".to_string();
        desc.logical_channels[2].physical_channel = "APS2-2m2".to_string();
        expect_validation_error(&desc, "not valid for APS");
    }

    #[test]
    fn test_gate_must_be_marker() {
        let mut desc = description();
        desc.physical_channels[0].gate.as_mut().unwrap().channel = "APS1-34".to_string();
        expect_validation_error(&desc, "marker channel");
    }

    #[test]
    fn test_shared_physical_channel() {
        let mut desc = description();
        desc.logical_channels[1].physical_channel = "APS1-12".to_string();
        expect_validation_error(&desc, "share physical channel");
    }

    #[test]
    fn test_overlapping_outputs() {
        let mut desc = description();
        desc.physical_channels.push(PhysicalChannelDescription {
            name: "APS1-1".to_string(),
            instrument: Some("APS1".to_string()),
            delay: 0.0,
            correction: None,
            gate: None,
        });
        expect_validation_error(&desc, "both drive output 1");
    }

    #[test]
    fn test_duplicate_names() {
        let mut desc = description();
        desc.instruments[1].name = "APS1".to_string();
        expect_validation_error(&desc, "Duplicate instrument");
    }
}
