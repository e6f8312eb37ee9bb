use candle_core::Var;
use candle_core::backprop::GradStore;
use tracing::debug;

use crate::constants::{
    CLIP_NORM_EPSILON, DEFAULT_CALIBRATION_CLIP_NORM, DEFAULT_EMBEDDING_CLIP_NORM,
};
use crate::error::{Ge2eError, Ge2eResult};

/// Maximum global gradient norms, applied independently per parameter group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradClipNorms {
    /// Encoder parameters. Default: `3.0`.
    pub embedding: f64,
    /// Loss calibration `(w, b)`. Default: `1.0`.
    pub calibration: f64,
}

impl Default for GradClipNorms {
    fn default() -> Self {
        Self {
            embedding: DEFAULT_EMBEDDING_CLIP_NORM,
            calibration: DEFAULT_CALIBRATION_CLIP_NORM,
        }
    }
}

impl GradClipNorms {
    pub fn validate(&self) -> Ge2eResult<()> {
        for (name, value) in [
            ("embedding", self.embedding),
            ("calibration", self.calibration),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Ge2eError::invalid(format!(
                    "{name} clip norm must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Rescales the gradients of `vars` in place so their global L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping. Vars without a gradient are skipped.
/// A NaN or infinite norm is an `InvalidInput` error and leaves `grads` untouched.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Ge2eResult<f64> {
    if !max_norm.is_finite() || max_norm <= 0.0 {
        return Err(Ge2eError::invalid(format!(
            "max gradient norm must be positive, got {max_norm}"
        )));
    }

    let mut total_sq = 0.0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total_sq += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let total = total_sq.sqrt();
    if !total.is_finite() {
        return Err(Ge2eError::invalid(format!("gradient norm is not finite: {total}")));
    }

    if total > max_norm {
        let coef = max_norm / (total + CLIP_NORM_EPSILON);
        for var in vars {
            if let Some(grad) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), grad.affine(coef, 0.0)?);
            }
        }
        debug!(norm = total, max_norm, coef, "Clipped gradients");
    }

    Ok(total)
}
