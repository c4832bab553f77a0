// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Module for defining settings for the sequence compiler.
use serde::Deserialize;

use crate::timing::ceil_to_grid;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct SanitizationChange {
    pub field: &'static str,
    pub original: String,
    pub sanitized: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Safety margin added before and after every shot, in seconds.
    pub timing_margin: f64,
    /// Format version written into every output file.
    pub file_version: f64,
    pub diagnostics: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        CompilerSettings {
            timing_margin: 100e-9,
            file_version: 2.0,
            diagnostics: false,
        }
    }
}

impl CompilerSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::validation(format!("Invalid compiler settings: {e}")))
    }

    /// Timing margin in samples, on the given grid.
    ///
    /// Call [`CompilerSettings::sanitize`] first; the margin is assumed valid.
    pub fn margin_samples(&self, sampling_rate: f64, grid: u64) -> i64 {
        ceil_to_grid(
            (self.timing_margin * sampling_rate).round() as i64,
            grid as i64,
        )
    }

    /// Validate the settings against the sample rate and timing grid.
    ///
    /// Returns the changes made to fields that were valid but not representable.
    pub fn sanitize(
        &mut self,
        sampling_rate: f64,
        grid: u64,
    ) -> Result<Vec<SanitizationChange>> {
        let mut changes = vec![];
        if !self.timing_margin.is_finite() || self.timing_margin < 0.0 {
            return Err(Error::validation(format!(
                "Timing margin must be finite and non-negative, got {}.",
                self.timing_margin
            )));
        }
        if !self.file_version.is_finite() {
            return Err(Error::validation("File version must be finite."));
        }
        let margin = self.margin_samples(sampling_rate, grid);
        let sanitized = margin as f64 / sampling_rate;
        if (sanitized - self.timing_margin).abs() > f64::EPSILON * sanitized.max(1.0) {
            changes.push(SanitizationChange {
                field: "timing_margin",
                original: self.timing_margin.to_string(),
                sanitized: sanitized.to_string(),
                reason: format!("Not a multiple of {grid} samples."),
            });
            self.timing_margin = sanitized;
        }
        Ok(changes)
    }
}
