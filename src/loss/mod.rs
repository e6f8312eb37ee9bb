//! GE2E loss reduction with learnable affine calibration.
//!
//! The similarity tensor is calibrated as `S' = w * S + b` and each utterance
//! row is compared against its own speaker's entry under a configurable
//! [`LossPolicy`]. Both policies are non-negative and strictly decrease as the
//! true-speaker similarity grows with the competitors held fixed.
//!
//! # Calibration parameters
//!
//! `w` is stored as `log(w)` and exponentiated on use, so no optimizer step can
//! drive it non-positive (which would invert the calibration). `b` is
//! unconstrained. Both live in [`candle_core::Var`]s exposed through
//! [`Ge2eLoss::vars`] for the optimizer and gradient clipping; the training loop
//! is the single writer.

pub mod config;

#[cfg(test)]
mod tests;

pub use config::{LossConfig, LossPolicy, Reduction};

use candle_core::{D, Device, Tensor, Var};
use tracing::debug;

use crate::centroid::centroids;
use crate::error::{Ge2eError, Ge2eResult};
use crate::similarity::{similarity_dims, similarity_tensor};
use crate::tensor::identity_mask;

/// GE2E loss reducer owning the calibration scale and bias.
pub struct Ge2eLoss {
    log_scale: Var,
    bias: Var,
    config: LossConfig,
}

impl std::fmt::Debug for Ge2eLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ge2eLoss")
            .field("scale", &self.scale().ok())
            .field("bias", &self.bias().ok())
            .field("policy", &self.config.policy)
            .field("reduction", &self.config.reduction)
            .finish()
    }
}

impl Ge2eLoss {
    /// Creates the reducer with `w` and `b` at their configured starting values.
    pub fn new(config: LossConfig, device: &Device) -> Ge2eResult<Self> {
        config.validate()?;
        let log_scale = Var::new(config.initial_scale.ln() as f32, device)?;
        let bias = Var::new(config.initial_bias as f32, device)?;
        Ok(Self {
            log_scale,
            bias,
            config,
        })
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Current calibration scale `w` (always positive).
    pub fn scale(&self) -> Ge2eResult<f64> {
        Ok(self.log_scale.as_tensor().exp()?.to_scalar::<f32>()? as f64)
    }

    /// Current calibration bias `b`.
    pub fn bias(&self) -> Ge2eResult<f64> {
        Ok(self.bias.as_tensor().to_scalar::<f32>()? as f64)
    }

    /// Overwrites `w` and `b`, e.g. when restoring from an external checkpoint.
    pub fn set_calibration(&self, scale: f64, bias: f64) -> Ge2eResult<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Ge2eError::invalid(format!(
                "calibration scale must be positive, got {scale}"
            )));
        }
        let device = self.bias.device();
        self.log_scale.set(&Tensor::new(scale.ln() as f32, device)?)?;
        self.bias.set(&Tensor::new(bias as f32, device)?)?;
        Ok(())
    }

    /// Trainable parameters, `[log(w), b]`.
    pub fn vars(&self) -> Vec<Var> {
        vec![self.log_scale.clone(), self.bias.clone()]
    }

    /// `w * S + b`, elementwise.
    pub fn calibrate(&self, similarity: &Tensor) -> Ge2eResult<Tensor> {
        let scale = self.log_scale.as_tensor().exp()?;
        Ok(similarity
            .broadcast_mul(&scale)?
            .broadcast_add(self.bias.as_tensor())?)
    }

    /// Loss for each utterance row: `(N, M, N) -> (N, M)`.
    pub fn per_utterance(&self, similarity: &Tensor) -> Ge2eResult<Tensor> {
        let (n, m) = similarity_dims(similarity)?;
        let logits = self.calibrate(similarity)?;
        let own_mask = identity_mask(n, similarity.device())?
            .unsqueeze(1)?
            .broadcast_as((n, m, n))?;

        match self.config.policy {
            LossPolicy::Softmax => {
                let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
                let own = own_mask
                    .to_dtype(logits.dtype())?
                    .mul(&log_probs)?
                    .sum(D::Minus1)?;
                Ok(own.neg()?)
            }
            LossPolicy::Contrast => {
                let probs = sigmoid(&logits)?;
                let own = own_mask
                    .to_dtype(logits.dtype())?
                    .mul(&probs)?
                    .sum(D::Minus1)?;
                let hardest = own_mask
                    .where_cond(&probs.zeros_like()?, &probs)?
                    .max(D::Minus1)?;
                Ok(own.affine(-1.0, 1.0)?.add(&hardest)?)
            }
        }
    }

    /// Scalar loss for a similarity tensor, reduced per [`Reduction`].
    pub fn loss(&self, similarity: &Tensor) -> Ge2eResult<Tensor> {
        let per_utterance = self.per_utterance(similarity)?;
        let loss = match self.config.reduction {
            Reduction::Mean => per_utterance.mean_all()?,
            Reduction::Sum => per_utterance.sum_all()?,
        };
        Ok(loss)
    }

    /// Centroids, similarity tensor, and loss for an `(N, M, D)` embedding batch.
    ///
    /// Differentiable end to end with respect to the embeddings, `w`, and `b`.
    pub fn forward(&self, embeddings: &Tensor) -> Ge2eResult<Tensor> {
        let centroids = centroids(embeddings)?;
        let similarity = similarity_tensor(embeddings, &centroids)?;
        let loss = self.loss(&similarity)?;
        debug!(
            dims = ?embeddings.dims(),
            policy = %self.config.policy,
            "Computed GE2E loss"
        );
        Ok(loss)
    }
}

fn sigmoid(t: &Tensor) -> Ge2eResult<Tensor> {
    Ok(t.neg()?.exp()?.affine(1.0, 1.0)?.recip()?)
}
