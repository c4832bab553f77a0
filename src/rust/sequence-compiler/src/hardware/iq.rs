// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use numeric_array::NumericArray;

use crate::waveform_library::WaveformLibrary;

/// Project a complex library onto the I and Q outputs of a mixer channel.
///
/// `I = Re(w)·T[0][0] + Im(w)·T[0][1]` and `Q = Im(w)·T[1][1]`. The Q output
/// does not use `T[1][0]`. Keys are kept, so link-list entries of the logical
/// channel address both outputs unchanged.
pub(crate) fn decompose(
    library: &WaveformLibrary,
    correction: &[[f64; 2]; 2],
) -> (WaveformLibrary, WaveformLibrary) {
    let mut i_library = WaveformLibrary::new();
    let mut q_library = WaveformLibrary::new();
    for (key, samples) in library.iter() {
        let re = samples.real_part();
        let im = samples.imag_part();
        let i_samples = re
            .iter()
            .zip(im.iter())
            .map(|(re, im)| re * correction[0][0] + im * correction[0][1])
            .collect();
        let q_samples = im.iter().map(|im| im * correction[1][1]).collect();
        i_library.insert_with_key(*key, Arc::new(NumericArray::Float64(i_samples)));
        q_library.insert_with_key(*key, Arc::new(NumericArray::Float64(q_samples)));
    }
    (i_library, q_library)
}

/// Real part of every waveform, for single-ended analog and marker outputs.
pub(crate) fn project_real(library: &WaveformLibrary) -> WaveformLibrary {
    let mut real_library = WaveformLibrary::new();
    for (key, samples) in library.iter() {
        real_library.insert_with_key(*key, Arc::new(NumericArray::Float64(samples.real_part())));
    }
    real_library
}
