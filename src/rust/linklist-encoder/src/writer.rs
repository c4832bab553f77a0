// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use compiler_log::{info, warn};
use sequence_compiler::HardwareWaveformSet;
use sequence_compiler::device_traits::AwgFamily;
use sequence_compiler::settings::CompilerSettings;
use tempfile::NamedTempFile;

use crate::aps::ApsEncoder;
use crate::sequence_table::SequenceTableEncoder;
use crate::{Result, SequenceEncoder, instrument_file};

/// Outcome of encoding and writing the file of one instrument.
#[derive(Debug)]
pub struct InstrumentOutput {
    pub instrument: String,
    pub result: Result<PathBuf>,
}

pub fn encoder_for(family: AwgFamily) -> &'static dyn SequenceEncoder {
    match family {
        AwgFamily::Aps => &ApsEncoder,
        AwgFamily::Tek5014 => &SequenceTableEncoder,
    }
}

/// Write `bytes` to `path` so that the file is either complete or absent.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.as_file()
        .sync_all()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("Failed to publish {}", path.display()))?;
    Ok(())
}

fn encode_and_write(
    set: &HardwareWaveformSet,
    settings: &CompilerSettings,
    dir: &Path,
) -> Result<PathBuf> {
    let container = encoder_for(set.family).encode(set, settings)?;
    let path = instrument_file(dir, &set.instrument);
    write_atomic(&path, &container.to_bytes())?;
    Ok(path)
}

/// Encode every instrument with its family encoder and write one file each.
///
/// A failing instrument leaves no file behind and does not stop the others.
pub fn write_instrument_files(
    sets: &[HardwareWaveformSet],
    settings: &CompilerSettings,
    dir: &Path,
) -> Vec<InstrumentOutput> {
    sets.iter()
        .map(|set| {
            let result = encode_and_write(set, settings, dir);
            match &result {
                Ok(path) => {
                    info!("Wrote {} for {}", path.display(), set.instrument);
                }
                Err(e) => {
                    warn!("No output for {}: {}", set.instrument, e);
                }
            }
            InstrumentOutput {
                instrument: set.instrument.clone(),
                result,
            }
        })
        .collect()
}
