// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Binary encoding of hardware waveform sets into instrument files.

pub mod aps;
pub mod container;
pub mod replay;
pub mod sequence_table;
pub mod writer;

use std::path::{Path, PathBuf};

use sequence_compiler::HardwareWaveformSet;
use sequence_compiler::compile_sequence::compile_shots;
use sequence_compiler::sequence::Block;
use sequence_compiler::settings::CompilerSettings;
use sequence_compiler::topology::Topology;

pub use sequence_compiler::{Error, Result, Samples};
pub use writer::{InstrumentOutput, encoder_for, write_instrument_files};

use container::Group;

/// Full scale of the signed 14-bit sample range.
pub const QUANTIZATION_SCALE: f64 = 8191.0;

/// Encodes everything one instrument plays into a container tree.
pub trait SequenceEncoder {
    fn encode(&self, set: &HardwareWaveformSet, settings: &CompilerSettings) -> Result<Group>;
}

/// Clamp to [-1, 1] and quantize to the signed 14-bit range.
///
/// Returns the quantized value and whether the input had to be clamped.
pub fn quantize(value: f64) -> (i16, bool) {
    let clamped = value.clamp(-1.0, 1.0);
    (
        (clamped * QUANTIZATION_SCALE).round() as i16,
        clamped != value,
    )
}

/// Compile `sequences` (one per shot) and write one file per instrument into `dir`.
///
/// Compile errors abort the whole run. Encoding and writing happen per
/// instrument, and their results are reported individually.
pub fn compile_to_files(
    sequences: &[Vec<Block>],
    topology: &Topology,
    settings: &CompilerSettings,
    sampling_rate: f64,
    dir: &Path,
) -> Result<Vec<InstrumentOutput>> {
    compiler_log::init_logging(settings.diagnostics);
    let (shots, libraries) = compile_shots(sequences, sampling_rate)?;
    let sets = sequence_compiler::map_to_hardware(
        &shots,
        &libraries,
        topology,
        settings,
        sampling_rate,
    )?;
    Ok(write_instrument_files(&sets, settings, dir))
}

/// Path of the file written for `instrument`.
pub fn instrument_file(dir: &Path, instrument: &str) -> PathBuf {
    dir.join(format!("{instrument}.awgc"))
}
