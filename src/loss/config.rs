use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_INITIAL_BIAS, DEFAULT_INITIAL_SCALE};
use crate::error::{Ge2eError, Ge2eResult};

/// Per-utterance comparison between the true-speaker similarity and its competitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossPolicy {
    /// `-S'[s,u,s] + log sum_k exp(S'[s,u,k])`.
    #[default]
    Softmax,
    /// `1 - sigmoid(S'[s,u,s]) + max_{k != s} sigmoid(S'[s,u,k])`.
    Contrast,
}

impl FromStr for LossPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "softmax" => Ok(Self::Softmax),
            "contrast" | "contrastive" => Ok(Self::Contrast),
            _ => Err(format!("Unknown loss policy: {}", s)),
        }
    }
}

impl fmt::Display for LossPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Softmax => write!(f, "softmax"),
            Self::Contrast => write!(f, "contrast"),
        }
    }
}

/// How per-utterance losses are folded into the final scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    Mean,
    #[default]
    Sum,
}

impl FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            _ => Err(format!("Unknown loss reduction: {}", s)),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Sum => write!(f, "sum"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Configuration for [`Ge2eLoss`](super::Ge2eLoss).
pub struct LossConfig {
    /// Per-utterance objective.
    pub policy: LossPolicy,
    /// Batch reduction.
    pub reduction: Reduction,
    /// Starting value of the calibration scale `w`. Must be positive.
    pub initial_scale: f64,
    /// Starting value of the calibration bias `b`.
    pub initial_bias: f64,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            policy: LossPolicy::default(),
            reduction: Reduction::default(),
            initial_scale: DEFAULT_INITIAL_SCALE,
            initial_bias: DEFAULT_INITIAL_BIAS,
        }
    }
}

impl LossConfig {
    pub fn with_policy(policy: LossPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Checks that the scale is positive and both parameters are finite.
    pub fn validate(&self) -> Ge2eResult<()> {
        if !self.initial_scale.is_finite() || self.initial_scale <= 0.0 {
            return Err(Ge2eError::invalid(format!(
                "initial scale must be positive, got {}",
                self.initial_scale
            )));
        }
        if !self.initial_bias.is_finite() {
            return Err(Ge2eError::invalid(format!(
                "initial bias must be finite, got {}",
                self.initial_bias
            )));
        }
        Ok(())
    }
}
