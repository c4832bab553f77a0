// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::{Error, Result, Samples};

pub fn floor_to_grid(value: i64, grid: i64) -> i64 {
    value - value.rem_euclid(grid)
}

pub fn ceil_to_grid(value: i64, grid: i64) -> i64 {
    value + (grid - value.rem_euclid(grid)) % grid
}

/// Round to the nearest grid point, ties away from the lower grid point.
pub fn round_to_grid(value: i64, grid: i64) -> i64 {
    let lower = floor_to_grid(value, grid);
    if 2 * (value - lower) >= grid {
        lower + grid
    } else {
        lower
    }
}

pub fn lcm(a: u64, b: u64) -> u64 {
    fn gcd(a: u64, b: u64) -> u64 {
        if b == 0 { a } else { gcd(b, a % b) }
    }
    if a == 0 || b == 0 {
        return a.max(b);
    }
    a / gcd(a, b) * b
}

pub fn validate_sampling_rate(sampling_rate: f64) -> Result<()> {
    if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Err(Error::validation(format!(
            "Sample rate must be a positive finite number, got {sampling_rate}."
        )));
    }
    Ok(())
}

/// Number of samples covering `t` seconds, rounded half-up.
pub fn length_to_samples(t: f64, sampling_rate: f64) -> Result<Samples> {
    if !t.is_finite() || t < 0.0 {
        return Err(Error::validation(format!(
            "Durations must be finite and non-negative, got {t}."
        )));
    }
    Ok((t * sampling_rate + 0.5).floor() as Samples)
}

/// Signed variant of [`length_to_samples`] used for channel delays.
pub fn delay_to_samples(t: f64, sampling_rate: f64) -> Result<i64> {
    if !t.is_finite() {
        return Err(Error::validation(format!(
            "Delays must be finite, got {t}."
        )));
    }
    Ok((t * sampling_rate + 0.5).floor() as i64)
}
