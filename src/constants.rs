//! Cross-cutting, shared constants.
//!
//! Defaults mirror the hyper-parameters the GE2E recipe is usually trained with.
//! Prefer deriving secondary constants from primary ones to avoid drift.

use crate::error::{Ge2eError, Ge2eResult};

pub const DEFAULT_SPEAKERS_PER_BATCH: usize = 4;
pub const DEFAULT_UTTERANCES_PER_SPEAKER: usize = 5;

pub const DEFAULT_EVAL_SPEAKERS_PER_BATCH: usize = 4;
pub const DEFAULT_EVAL_UTTERANCES_PER_SPEAKER: usize = 6;

pub const DEFAULT_EMBEDDING_CLIP_NORM: f64 = 3.0;
pub const DEFAULT_CALIBRATION_CLIP_NORM: f64 = 1.0;

pub const DEFAULT_INITIAL_SCALE: f64 = 10.0;
pub const DEFAULT_INITIAL_BIAS: f64 = -5.0;

pub const DEFAULT_THRESHOLD_START: f64 = 0.5;
pub const DEFAULT_THRESHOLD_STEP: f64 = 0.01;
pub const DEFAULT_THRESHOLD_COUNT: usize = 50;

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_LR_DECAY: f64 = 0.85;
pub const DEFAULT_EPOCHS: usize = 950;
pub const DEFAULT_EVAL_EPOCHS: usize = 10;
pub const DEFAULT_LOG_INTERVAL: usize = 30;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 120;
pub const DEFAULT_SEED: u64 = 55;

/// Added to the gradient norm before computing the clip coefficient.
pub const CLIP_NORM_EPSILON: f64 = 1e-6;

/// Batch geometry: `N` speakers, each contributing exactly `M` utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDims {
    /// Speakers per batch (`N`).
    pub speakers: usize,
    /// Utterances per speaker (`M`).
    pub utterances: usize,
}

impl Default for BatchDims {
    fn default() -> Self {
        Self {
            speakers: DEFAULT_SPEAKERS_PER_BATCH,
            utterances: DEFAULT_UTTERANCES_PER_SPEAKER,
        }
    }
}

impl BatchDims {
    pub fn new(speakers: usize, utterances: usize) -> Self {
        Self {
            speakers,
            utterances,
        }
    }

    /// Total number of utterances in the flattened batch (`N * M`).
    pub fn flat_len(&self) -> usize {
        self.speakers * self.utterances
    }

    /// Validates the geometry for training use.
    ///
    /// Returns an error if:
    /// - either count is zero
    /// - `speakers < 2` (no competing speakers for the loss or FAR)
    /// - `utterances < 2` (leave-one-out centroids divide by `M - 1`)
    pub fn validate(&self) -> Ge2eResult<()> {
        if self.speakers == 0 || self.utterances == 0 {
            return Err(Ge2eError::invalid(format!(
                "batch dims must be positive, got {}x{}",
                self.speakers, self.utterances
            )));
        }
        if self.speakers < 2 {
            return Err(Ge2eError::invalid(format!(
                "at least 2 speakers per batch required, got {}",
                self.speakers
            )));
        }
        if self.utterances < 2 {
            return Err(Ge2eError::invalid(format!(
                "at least 2 utterances per speaker required, got {}",
                self.utterances
            )));
        }
        Ok(())
    }
}
