// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Compiles logical pulse sequences into per-instrument hardware waveform sets.
//!
//! The pipeline runs strictly downstream:
//! [`pulse_shapes`] samples pulses, [`compile_sequence`] turns blocks into
//! link-list entries plus a deduplicated waveform library, and [`hardware`]
//! maps logical channels onto physical instrument channels.

pub mod compile_sequence;
pub mod device_traits;
pub mod hardware;
pub mod link_list;
pub mod pulse_shapes;
pub mod sequence;
pub mod settings;
pub mod timing;
pub mod topology;
pub(crate) mod utils;
pub mod waveform_library;


pub use compile_sequence::{CompiledSequence, compile_sequence};
pub use hardware::{ChannelProgram, HardwareWaveformSet, map_to_hardware};

/// Sample counts and sample positions.
pub type Samples = u64;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed topology or malformed sequence input.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The output does not fit the constraints of the target hardware format.
    #[error("Format constraint violated on channel '{channel}'{}: {message}", shot_suffix(.shot))]
    FormatConstraint {
        channel: String,
        shot: Option<usize>,
        message: String,
    },
    /// Internal consistency check failed. Always a compiler bug.
    #[error("Internal error: {0}")]
    Invariant(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

fn shot_suffix(shot: &Option<usize>) -> String {
    shot.map(|s| format!(" (shot {s})")).unwrap_or_default()
}

impl Error {
    pub fn validation<T: std::fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    pub fn invariant<T: std::fmt::Display>(msg: T) -> Self {
        Error::Invariant(msg.to_string())
    }

    pub fn format_constraint<T: std::fmt::Display>(
        channel: &str,
        shot: Option<usize>,
        msg: T,
    ) -> Self {
        Error::FormatConstraint {
            channel: channel.to_string(),
            shot,
            message: msg.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
