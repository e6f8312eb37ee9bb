use serde::Serialize;

use crate::constants::{DEFAULT_THRESHOLD_COUNT, DEFAULT_THRESHOLD_START, DEFAULT_THRESHOLD_STEP};
use crate::error::{Ge2eError, Ge2eResult};

/// Strictly ascending, non-empty sequence of decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdGrid {
    values: Vec<f64>,
}

impl Default for ThresholdGrid {
    /// 50 thresholds `0.50, 0.51, ..., 0.99`.
    fn default() -> Self {
        Self {
            values: linspace(
                DEFAULT_THRESHOLD_START,
                DEFAULT_THRESHOLD_STEP,
                DEFAULT_THRESHOLD_COUNT,
            ),
        }
    }
}

fn linspace(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

impl ThresholdGrid {
    /// Wraps explicit thresholds. Fails on an empty, non-finite, or unsorted grid.
    pub fn new(values: Vec<f64>) -> Ge2eResult<Self> {
        if values.is_empty() {
            return Err(Ge2eError::invalid("threshold grid is empty"));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Ge2eError::invalid(format!(
                "threshold grid contains non-finite value {bad}"
            )));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Ge2eError::invalid("threshold grid must be strictly ascending"));
        }
        Ok(Self { values })
    }

    /// `count` thresholds `start, start + step, ...`.
    pub fn linspace(start: f64, step: f64, count: usize) -> Ge2eResult<Self> {
        if step <= 0.0 {
            return Err(Ge2eError::invalid(format!(
                "threshold step must be positive, got {step}"
            )));
        }
        Self::new(linspace(start, step, count))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// False-accept and false-reject rates at one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorRates {
    pub far: f64,
    pub frr: f64,
}

/// Operating point where FAR and FRR are closest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EerResult {
    /// Threshold from the grid at which `|FAR - FRR|` is smallest.
    pub threshold: f64,
    /// `(FAR + FRR) / 2` at that threshold.
    pub eer: f64,
    pub far: f64,
    pub frr: f64,
}

impl std::fmt::Display for EerResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EER: {:.2} (thres: {:.2}, FAR: {:.2}, FRR: {:.2})",
            self.eer, self.threshold, self.far, self.frr
        )
    }
}
