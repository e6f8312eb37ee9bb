//! Equal-error-rate evaluation over a similarity tensor.
//!
//! For each threshold `t` on an ascending grid the similarity tensor is
//! binarized at `S > t` and
//!
//! - `FAR(t) = sum_s sum_{u, k != s} [S[s,u,k] > t] / ((N - 1) * M * N)`
//! - `FRR(t) = sum_s (M - sum_u [S[s,u,s] > t]) / (M * N)`
//!
//! The threshold minimizing `|FAR - FRR|` wins, ties going to the first one
//! scanned. `EER = (FAR + FRR) / 2` there.

pub mod types;


pub use types::{EerResult, ErrorRates, ThresholdGrid};

use candle_core::Tensor;
use tracing::debug;

use crate::error::{Ge2eError, Ge2eResult};
use crate::similarity::similarity_dims;
use crate::tensor::{count_true, greater_than, identity_mask};

/// FAR and FRR of an `(N, M, N)` similarity tensor at `threshold`.
pub fn error_rates(similarity: &Tensor, threshold: f64) -> Ge2eResult<ErrorRates> {
    let (n, m) = similarity_dims(similarity)?;
    let own = identity_mask(n, similarity.device())?
        .unsqueeze(1)?
        .broadcast_as((n, m, n))?;
    rates_with_mask(similarity, &own, n, m, threshold)
}

fn rates_with_mask(
    similarity: &Tensor,
    own: &Tensor,
    n: usize,
    m: usize,
    threshold: f64,
) -> Ge2eResult<ErrorRates> {
    let accepted = greater_than(similarity, threshold)?;
    let accepted_total = count_true(&accepted)?;
    let accepted_own = count_true(&accepted.mul(own)?)?;

    let genuine = (m * n) as f64;
    let impostor = ((n - 1) * m * n) as f64;
    Ok(ErrorRates {
        far: (accepted_total - accepted_own) / impostor,
        frr: (genuine - accepted_own) / genuine,
    })
}

/// Sweeps `thresholds` in order and returns the equal-error operating point.
///
/// Fails with an invalid-input error if `thresholds` is empty or `N < 2`.
pub fn find_eer(similarity: &Tensor, thresholds: &[f64]) -> Ge2eResult<EerResult> {
    if thresholds.is_empty() {
        return Err(Ge2eError::invalid("threshold grid is empty"));
    }
    let (n, m) = similarity_dims(similarity)?;
    let own = identity_mask(n, similarity.device())?
        .unsqueeze(1)?
        .broadcast_as((n, m, n))?;

    let mut best: Option<(f64, EerResult)> = None;
    for &threshold in thresholds {
        let rates = rates_with_mask(similarity, &own, n, m, threshold)?;
        let gap = (rates.far - rates.frr).abs();
        if best.as_ref().is_none_or(|(best_gap, _)| gap < *best_gap) {
            best = Some((
                gap,
                EerResult {
                    threshold,
                    eer: (rates.far + rates.frr) / 2.0,
                    far: rates.far,
                    frr: rates.frr,
                },
            ));
        }
    }

    let (_, result) = best.ok_or_else(|| Ge2eError::invalid("threshold grid is empty"))?;
    debug!(
        threshold = result.threshold,
        eer = result.eer,
        far = result.far,
        frr = result.frr,
        "Located equal error rate"
    );
    Ok(result)
}

/// EER evaluator bound to a fixed threshold grid.
#[derive(Debug, Clone, Default)]
pub struct EerEvaluator {
    grid: ThresholdGrid,
}

impl EerEvaluator {
    pub fn new(grid: ThresholdGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &ThresholdGrid {
        &self.grid
    }

    /// [`find_eer`] over this evaluator's grid.
    pub fn evaluate(&self, similarity: &Tensor) -> Ge2eResult<EerResult> {
        find_eer(similarity, self.grid.values())
    }
}
