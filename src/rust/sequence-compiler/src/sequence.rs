// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Logical sequence model: pulses, blocks and shots.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use numeric_array::NumericArray;

use crate::pulse_shapes::PulseShape;
use crate::{Error, Result, Samples};

/// Name of a logical channel (qubit drive, measurement, marker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Arc<str>);

impl Deref for ChannelId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        ChannelId(Arc::from(s))
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        ChannelId(Arc::from(s))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sampled pulse.
///
/// Pulses are immutable once built. Two pulses with equal samples share one
/// waveform library entry regardless of their labels.
#[derive(Debug, Clone)]
pub struct Pulse {
    pub label: String,
    pub channels: Vec<ChannelId>,
    pub samples: Arc<NumericArray>,
    /// Phase added to the channel frame after this pulse, in radians.
    pub frame_change: f64,
    /// Number of times the samples are played back to back.
    pub repeat: u32,
}

impl Pulse {
    pub fn new<S: Into<String>>(
        label: S,
        channels: Vec<ChannelId>,
        samples: Arc<NumericArray>,
    ) -> Self {
        Pulse {
            label: label.into(),
            channels,
            samples,
            frame_change: 0.0,
            repeat: 1,
        }
    }

    /// Sample a pulse shape for a single channel.
    pub fn from_shape<S: Into<String>>(
        label: S,
        channel: ChannelId,
        shape: &PulseShape,
        sampling_rate: f64,
    ) -> Result<Self> {
        let samples = shape.sample(sampling_rate)?;
        Ok(Pulse::new(label, vec![channel], Arc::new(samples)))
    }

    /// A uniform hold of `length` samples at `value`.
    pub fn hold<S: Into<String>>(label: S, channel: ChannelId, value: f64, length: usize) -> Self {
        Pulse::new(
            label,
            vec![channel],
            Arc::new(NumericArray::Float64(vec![value; length])),
        )
    }

    pub fn with_frame_change(mut self, frame_change: f64) -> Self {
        self.frame_change = frame_change;
        self
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Uniform-value holds are stored as a single sample and played as a constant.
    pub fn is_hold(&self) -> bool {
        self.samples.is_uniform()
    }

    pub fn length(&self) -> Samples {
        self.samples.len() as Samples
    }

    pub fn total_length(&self) -> Samples {
        self.length() * Samples::from(self.repeat)
    }
}

/// How channels shorter than the longest one are padded within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Pad at the tail.
    #[default]
    Left,
    /// Pad at the head.
    Right,
    /// Split the padding, the odd sample goes to the tail.
    Centre,
}

impl FromStr for Alignment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "right" => Ok(Alignment::Right),
            "centre" | "center" => Ok(Alignment::Centre),
            _ => Err(Error::validation(format!(
                "Invalid block alignment '{s}'. Expected one of: left, right, centre."
            ))),
        }
    }
}

/// Pulses played concurrently, one ordered list per channel.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub pulses: IndexMap<ChannelId, Vec<Pulse>>,
    pub alignment: Alignment,
}

impl Block {
    pub fn new(alignment: Alignment) -> Self {
        Block {
            pulses: IndexMap::new(),
            alignment,
        }
    }

    /// Append a pulse to every channel it addresses.
    pub fn add_pulse(&mut self, pulse: Pulse) {
        for channel in pulse.channels.iter() {
            self.pulses
                .entry(channel.clone())
                .or_default()
                .push(pulse.clone());
        }
    }

    pub fn with_pulse(mut self, pulse: Pulse) -> Self {
        self.add_pulse(pulse);
        self
    }

    pub fn channel_length(&self, channel: &ChannelId) -> Samples {
        self.pulses
            .get(channel)
            .map_or(0, |pulses| pulses.iter().map(Pulse::total_length).sum())
    }

    /// Longest channel in the block.
    pub fn max_pts(&self) -> Samples {
        self.pulses
            .keys()
            .map(|ch| self.channel_length(ch))
            .max()
            .unwrap_or(0)
    }
}

/// One complete experimental shot.
pub type LogicalSequence = Vec<Block>;
