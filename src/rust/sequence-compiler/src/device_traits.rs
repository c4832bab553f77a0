// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Static per-family hardware description.
//!
//! Each AWG family declares its output ports and which physical channel
//! suffixes it accepts. Topology validation and channel allocation both read
//! from these tables instead of dispatching on the instrument at runtime.

use std::str::FromStr;

use crate::Error;

/// Device specific traits for sequence compilation.
pub struct DeviceTraits {
    /// Lengths and delays on this device are multiples of this sample count.
    pub sample_multiple: u16,
    /// Analog output ports, in file order.
    pub analog_ports: &'static [&'static str],
    /// Marker output ports, in file order.
    pub marker_ports: &'static [&'static str],
    /// Suffixes of quadrature channel pairs, mapped to their (I, Q) analog ports.
    pub quadrature_pairs: &'static [(&'static str, (&'static str, &'static str))],
    /// Maximum number of waveform memory points per analog channel.
    pub max_waveform_points: Option<usize>,
}

pub const APS_TRAITS: DeviceTraits = DeviceTraits {
    sample_multiple: 4,
    analog_ports: &["1", "2", "3", "4"],
    marker_ports: &["1m1", "2m1", "3m1", "4m1"],
    quadrature_pairs: &[("12", ("1", "2")), ("34", ("3", "4"))],
    max_waveform_points: Some(8192),
};

pub const TEK5014_TRAITS: DeviceTraits = DeviceTraits {
    sample_multiple: 1,
    analog_ports: &["1", "2", "3", "4"],
    marker_ports: &[
        "1m1", "1m2", "2m1", "2m2", "3m1", "3m2", "4m1", "4m2",
    ],
    quadrature_pairs: &[("12", ("1", "2")), ("34", ("3", "4"))],
    max_waveform_points: None,
};

/// Hardware families the compiler can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AwgFamily {
    /// Bank/link-list style instruments.
    Aps,
    /// Sequence-table style instruments.
    Tek5014,
}

/// Kind of a physical channel, derived from its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Pair of analog outputs driving an IQ mixer.
    Quadrature,
    /// Single analog output.
    Analog,
    /// Digital marker output.
    Marker,
}

impl AwgFamily {
    pub const fn traits(&self) -> &'static DeviceTraits {
        match self {
            AwgFamily::Aps => &APS_TRAITS,
            AwgFamily::Tek5014 => &TEK5014_TRAITS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AwgFamily::Aps => "APS",
            AwgFamily::Tek5014 => "Tek5014",
        }
    }

    /// Classify a physical channel suffix, or `None` if the family does not have it.
    pub fn port_kind(&self, suffix: &str) -> Option<PortKind> {
        let traits = self.traits();
        if traits.quadrature_pairs.iter().any(|(s, _)| *s == suffix) {
            Some(PortKind::Quadrature)
        } else if traits.analog_ports.contains(&suffix) {
            Some(PortKind::Analog)
        } else if traits.marker_ports.contains(&suffix) {
            Some(PortKind::Marker)
        } else {
            None
        }
    }

    /// Analog ports (I, Q) backing a quadrature suffix.
    pub fn quadrature_ports(&self, suffix: &str) -> Option<(&'static str, &'static str)> {
        self.traits()
            .quadrature_pairs
            .iter()
            .find(|(s, _)| *s == suffix)
            .map(|(_, ports)| *ports)
    }

    /// All output ports of the family, analog first.
    pub fn ports(&self) -> impl Iterator<Item = &'static str> {
        let traits = self.traits();
        traits
            .analog_ports
            .iter()
            .chain(traits.marker_ports.iter())
            .copied()
    }
}

impl FromStr for AwgFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<AwgFamily, Error> {
        match s.to_uppercase().as_str() {
            "APS" => Ok(AwgFamily::Aps),
            "TEK5014" => Ok(AwgFamily::Tek5014),
            _ => Err(Error::validation(format!(
                "Unsupported instrument type: {s}. Supported types are: APS, Tek5014"
            ))),
        }
    }
}
