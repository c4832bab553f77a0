// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Pulse shape library.
//!
//! Sampling is a pure function of the shape parameters and the sample rate:
//! equal inputs give bit-identical arrays, which the waveform library relies
//! on for content addressing.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use num_complex::Complex;
use numeric_array::NumericArray;

use crate::sequence::ChannelId;
use crate::timing::{length_to_samples, validate_sampling_rate};
use crate::utils::normalize_f64;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// Flat top at `amp`.
    Constant,
    /// All zeros.
    Delay,
    /// Gaussian truncated at `cutoff` standard deviations.
    Gaussian,
    /// Gaussian with a derivative quadrature component.
    Drag,
    /// Flat top with tanh rise and fall of width `sigma`.
    Tanh,
    /// Rising half of a Gaussian.
    GaussOn,
    /// Falling half of a Gaussian.
    GaussOff,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PulseShape {
    pub kind: ShapeKind,
    /// Duration of the shape without buffers, in seconds.
    pub duration: f64,
    /// Zero padding added on both sides, in seconds.
    pub buffer: f64,
    pub amp: f64,
    pub phase: f64,
    pub cutoff: f64,
    pub drag_scaling: f64,
    /// Edge width of [`ShapeKind::Tanh`], in seconds.
    pub sigma: f64,
}

impl Default for PulseShape {
    fn default() -> Self {
        PulseShape {
            kind: ShapeKind::Constant,
            duration: 0.0,
            buffer: 0.0,
            amp: 1.0,
            phase: 0.0,
            cutoff: 2.0,
            drag_scaling: 0.0,
            sigma: 0.0,
        }
    }
}

impl Hash for PulseShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        for value in [
            self.duration,
            self.buffer,
            self.amp,
            self.phase,
            self.cutoff,
            self.drag_scaling,
            self.sigma,
        ] {
            normalize_f64(value).hash(state);
        }
    }
}

impl Eq for PulseShape {}

impl PulseShape {
    pub fn new(kind: ShapeKind, duration: f64) -> Self {
        PulseShape {
            kind,
            duration,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(Error::validation(format!(
                "Pulse cutoff must be positive, got {}.",
                self.cutoff
            )));
        }
        for (name, value) in [
            ("amplitude", self.amp),
            ("phase", self.phase),
            ("drag scaling", self.drag_scaling),
        ] {
            if !value.is_finite() {
                return Err(Error::validation(format!(
                    "Pulse {name} must be finite, got {value}."
                )));
            }
        }
        if self.kind == ShapeKind::Tanh && !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::validation(format!(
                "Tanh pulse requires a positive sigma, got {}.",
                self.sigma
            )));
        }
        Ok(())
    }

    /// Sample the shape, including the zero buffers on both sides.
    pub fn sample(&self, sampling_rate: f64) -> Result<NumericArray> {
        validate_sampling_rate(sampling_rate)?;
        self.validate()?;
        let num_points = length_to_samples(self.duration, sampling_rate)? as usize;
        let num_buffer = length_to_samples(self.buffer, sampling_rate)? as usize;

        let envelope: Vec<Complex<f64>> = match self.kind {
            ShapeKind::Constant => vec![Complex::new(1.0, 0.0); num_points],
            ShapeKind::Delay => vec![Complex::new(0.0, 0.0); num_points],
            ShapeKind::Gaussian => gaussian(num_points, self.cutoff)
                .into_iter()
                .map(|x| Complex::new(x, 0.0))
                .collect(),
            ShapeKind::Drag => drag(num_points, self.cutoff, self.drag_scaling),
            ShapeKind::Tanh => tanh(num_points, self.sigma * sampling_rate, self.cutoff)
                .into_iter()
                .map(|x| Complex::new(x, 0.0))
                .collect(),
            ShapeKind::GaussOn => {
                let mut full = gaussian(2 * num_points, self.cutoff);
                full.truncate(num_points);
                full.into_iter().map(|x| Complex::new(x, 0.0)).collect()
            }
            ShapeKind::GaussOff => gaussian(2 * num_points, self.cutoff)
                .into_iter()
                .skip(num_points)
                .map(|x| Complex::new(x, 0.0))
                .collect(),
        };

        let factor = Complex::from_polar(self.amp, self.phase);
        let zero = Complex::new(0.0, 0.0);
        let mut samples = Vec::with_capacity(num_points + 2 * num_buffer);
        samples.extend(std::iter::repeat_n(zero, num_buffer));
        samples.extend(envelope.into_iter().map(|x| x * factor));
        samples.extend(std::iter::repeat_n(zero, num_buffer));
        Ok(NumericArray::Complex64(samples))
    }
}

/// `n` points evenly spaced over `[-cutoff, cutoff]`.
fn linspace(n: usize, cutoff: f64) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![0.0],
        _ => {
            let step = 2.0 * cutoff / (n - 1) as f64;
            (0..n).map(|i| -cutoff + i as f64 * step).collect()
        }
    }
}

/// Gaussian shifted and rescaled so the first sample past either edge is zero.
fn gaussian(n: usize, cutoff: f64) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let x = linspace(n, cutoff);
    let step = x[1] - x[0];
    let next_point = (-0.5 * (x[n - 1] + step).powi(2)).exp();
    x.iter()
        .map(|x| ((-0.5 * x * x).exp() - next_point) / (1.0 - next_point))
        .collect()
}

fn drag(n: usize, cutoff: f64, drag_scaling: f64) -> Vec<Complex<f64>> {
    let in_phase = gaussian(n, cutoff);
    if n <= 1 {
        return in_phase.into_iter().map(|x| Complex::new(x, 0.0)).collect();
    }
    // Standard deviation in samples
    let sigma = n as f64 / (2.0 * cutoff);
    linspace(n, cutoff)
        .iter()
        .zip(in_phase)
        .map(|(x, i)| Complex::new(i, -drag_scaling * x / sigma * i))
        .collect()
}

/// Flat top with tanh edges; `sigma` is in samples.
fn tanh(n: usize, sigma: f64, cutoff: f64) -> Vec<f64> {
    let half = n as f64 / 2.0;
    let x1 = -half + cutoff * sigma;
    let x2 = half - cutoff * sigma;
    (0..n)
        .map(|i| {
            let x = -half + i as f64 + 0.5;
            0.5 * (((x - x1) / sigma).tanh() + ((x2 - x) / sigma).tanh())
        })
        .collect()
}

/// Memoized default pulses per channel.
///
/// Entries are keyed by the full shape, so any calibration change produces a
/// new key. [`PulseCache::invalidate_channel`] drops the stale entries of a
/// recalibrated channel.
#[derive(Debug)]
pub struct PulseCache {
    sampling_rate_bits: u64,
    entries: HashMap<ChannelId, HashMap<PulseShape, Arc<NumericArray>>>,
}

impl PulseCache {
    pub fn new(sampling_rate: f64) -> Result<Self> {
        validate_sampling_rate(sampling_rate)?;
        Ok(PulseCache {
            sampling_rate_bits: sampling_rate.to_bits(),
            entries: HashMap::new(),
        })
    }

    pub fn sampling_rate(&self) -> f64 {
        f64::from_bits(self.sampling_rate_bits)
    }

    /// Samples of `shape` on `channel`, sampled on first request.
    pub fn get_or_sample(
        &mut self,
        channel: &ChannelId,
        shape: &PulseShape,
    ) -> Result<Arc<NumericArray>> {
        let sampling_rate = self.sampling_rate();
        let channel_entries = self.entries.entry(channel.clone()).or_default();
        if let Some(samples) = channel_entries.get(shape) {
            return Ok(Arc::clone(samples));
        }
        let samples = Arc::new(shape.sample(sampling_rate)?);
        channel_entries.insert(shape.clone(), Arc::clone(&samples));
        Ok(samples)
    }

    pub fn invalidate_channel(&mut self, channel: &ChannelId) {
        self.entries.remove(channel);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(kind: ShapeKind, duration: f64) -> PulseShape {
        PulseShape::new(kind, duration)
    }

    #[test]
    fn test_sample_count_and_buffers() {
        let mut pulse = shape(ShapeKind::Gaussian, 40e-9);
        pulse.buffer = 4e-9;
        let samples = pulse.sample(1e9).unwrap();
        assert_eq!(samples.len(), 48);
        for i in (0..4).chain(44..48) {
            assert_eq!(samples.abs_at_index(i), Some(0.0));
        }
        // Peak in the middle, close to the amplitude
        assert!(samples.abs_at_index(23).unwrap() > 0.99);
    }

    #[test]
    fn test_round_half_up() {
        // 2.5 samples
        let samples = shape(ShapeKind::Constant, 2.5).sample(1.0).unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let mut pulse = shape(ShapeKind::Drag, 20e-9);
        pulse.drag_scaling = 0.3;
        pulse.phase = 0.7;
        assert_eq!(pulse.sample(1.2e9).unwrap(), pulse.sample(1.2e9).unwrap());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            shape(ShapeKind::Constant, -1e-9).sample(1e9),
            Err(Error::Validation(_))
        ));
        assert!(shape(ShapeKind::Constant, f64::NAN).sample(1e9).is_err());
        assert!(shape(ShapeKind::Constant, 1e-9).sample(-1e9).is_err());
        assert!(shape(ShapeKind::Tanh, 1e-8).sample(1e9).is_err());
        let mut pulse = shape(ShapeKind::Constant, 1e-9);
        pulse.buffer = -1.0;
        assert!(pulse.sample(1e9).is_err());
    }

    #[test]
    fn test_constant_is_uniform() {
        let mut pulse = shape(ShapeKind::Constant, 16e-9);
        pulse.amp = 0.5;
        let samples = pulse.sample(1e9).unwrap();
        assert!(samples.is_uniform());
        pulse.buffer = 1e-9;
        assert!(!pulse.sample(1e9).unwrap().is_uniform());
    }

    #[test]
    fn test_gaussian_edges_vanish() {
        let g = gaussian(64, 2.0);
        assert!(g[0] > 0.0 && g[0] < 0.05);
        assert!((g[0] - g[63]).abs() < 1e-12);
    }

    #[test]
    fn test_drag_quadrature_antisymmetric() {
        let d = drag(32, 2.0, 0.5);
        for i in 0..16 {
            assert!((d[i].im + d[31 - i].im).abs() < 1e-12);
            assert!((d[i].re - d[31 - i].re).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gauss_on_off_mirror() {
        let on = shape(ShapeKind::GaussOn, 10e-9).sample(1e9).unwrap();
        let off = shape(ShapeKind::GaussOff, 10e-9).sample(1e9).unwrap();
        assert_eq!(on.len(), 10);
        for i in 0..10 {
            let a = on.abs_at_index(i).unwrap();
            let b = off.abs_at_index(9 - i).unwrap();
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tanh_flat_top() {
        let mut pulse = shape(ShapeKind::Tanh, 100e-9);
        pulse.sigma = 2e-9;
        let samples = pulse.sample(1e9).unwrap();
        assert!((samples.abs_at_index(50).unwrap() - 1.0).abs() < 1e-6);
        assert!(samples.abs_at_index(0).unwrap() < 0.1);
    }

    #[test]
    fn test_pulse_cache() {
        let mut cache = PulseCache::new(1e9).unwrap();
        let q1 = ChannelId::from("q1");
        let pulse = shape(ShapeKind::Gaussian, 20e-9);
        let a = cache.get_or_sample(&q1, &pulse).unwrap();
        let b = cache.get_or_sample(&q1, &pulse).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let mut recalibrated = pulse.clone();
        recalibrated.amp = 0.8;
        let c = cache.get_or_sample(&q1, &recalibrated).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);

        cache.invalidate_channel(&q1);
        assert!(cache.is_empty());
    }
}
