// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use num_complex::Complex;

/// Sampled amplitudes of a waveform.
///
/// Marker and single-ended channels carry real samples, quadrature channels
/// carry complex samples.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    Float64(Vec<f64>),
    Complex64(Vec<Complex<f64>>),
}

impl NumericArray {
    pub fn abs_at_index(&self, index: usize) -> Option<f64> {
        match self {
            NumericArray::Float64(vec) => vec.get(index).map(|x| x.abs()),
            NumericArray::Complex64(vec) => vec.get(index).map(|x| x.norm()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NumericArray::Float64(vec) => vec.len(),
            NumericArray::Complex64(vec) => vec.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            NumericArray::Float64(vec) => vec.is_empty(),
            NumericArray::Complex64(vec) => vec.is_empty(),
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, NumericArray::Complex64(_))
    }

    /// True if the array is non-empty and every sample equals the first one.
    pub fn is_uniform(&self) -> bool {
        match self {
            NumericArray::Float64(vec) => vec.first().is_some_and(|v| vec.iter().all(|x| x == v)),
            NumericArray::Complex64(vec) => {
                vec.first().is_some_and(|v| vec.iter().all(|x| x == v))
            }
        }
    }

    /// Index of the first and last sample with a nonzero magnitude.
    pub fn nonzero_span(&self) -> Option<(usize, usize)> {
        let first = (0..self.len()).find(|&i| self.abs_at_index(i).is_some_and(|x| x != 0.0))?;
        let last = (first..self.len())
            .rev()
            .find(|&i| self.abs_at_index(i).is_some_and(|x| x != 0.0))?;
        Some((first, last))
    }

    /// A copy truncated to the first `n` samples.
    pub fn head(&self, n: usize) -> NumericArray {
        match self {
            NumericArray::Float64(vec) => NumericArray::Float64(vec[..n.min(vec.len())].to_vec()),
            NumericArray::Complex64(vec) => {
                NumericArray::Complex64(vec[..n.min(vec.len())].to_vec())
            }
        }
    }

    /// Multiply every sample by `factor`.
    ///
    /// Real arrays are promoted to complex unless `factor` is purely real.
    pub fn scaled(&self, factor: Complex<f64>) -> NumericArray {
        match self {
            NumericArray::Float64(vec) if factor.im == 0.0 => {
                NumericArray::Float64(vec.iter().map(|x| x * factor.re).collect())
            }
            NumericArray::Float64(vec) => {
                NumericArray::Complex64(vec.iter().map(|x| factor * *x).collect())
            }
            NumericArray::Complex64(vec) => {
                NumericArray::Complex64(vec.iter().map(|x| x * factor).collect())
            }
        }
    }

    pub fn real_part(&self) -> Vec<f64> {
        match self {
            NumericArray::Float64(vec) => vec.clone(),
            NumericArray::Complex64(vec) => vec.iter().map(|x| x.re).collect(),
        }
    }

    pub fn imag_part(&self) -> Vec<f64> {
        match self {
            NumericArray::Float64(vec) => vec![0.0; vec.len()],
            NumericArray::Complex64(vec) => vec.iter().map(|x| x.im).collect(),
        }
    }

    /// Iterate over the samples as complex values.
    pub fn iter_complex(&self) -> Box<dyn Iterator<Item = Complex<f64>> + '_> {
        match self {
            NumericArray::Float64(vec) => Box::new(vec.iter().map(|x| Complex::new(*x, 0.0))),
            NumericArray::Complex64(vec) => Box::new(vec.iter().copied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_uniform() {
        assert!(NumericArray::Float64(vec![0.5; 4]).is_uniform());
        assert!(!NumericArray::Float64(vec![0.5, 0.4]).is_uniform());
        assert!(!NumericArray::Float64(vec![]).is_uniform());
        assert!(NumericArray::Complex64(vec![Complex::new(0.0, 1.0); 3]).is_uniform());
    }

    #[test]
    fn test_nonzero_span() {
        let arr = NumericArray::Float64(vec![0.0, 0.0, 0.3, 0.0, -0.1, 0.0]);
        assert_eq!(arr.nonzero_span(), Some((2, 4)));
        assert_eq!(NumericArray::Float64(vec![0.0; 3]).nonzero_span(), None);
    }

    #[test]
    fn test_scaled_promotes_to_complex() {
        let arr = NumericArray::Float64(vec![1.0, 2.0]);
        assert_eq!(
            arr.scaled(Complex::new(2.0, 0.0)),
            NumericArray::Float64(vec![2.0, 4.0])
        );
        assert_eq!(
            arr.scaled(Complex::new(0.0, 1.0)),
            NumericArray::Complex64(vec![Complex::new(0.0, 1.0), Complex::new(0.0, 2.0)])
        );
    }
}
