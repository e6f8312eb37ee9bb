//! Per-speaker centroids over an `(N, M, D)` embedding batch.
//!
//! [`centroids`] averages each speaker's utterances. The leave-one-out variants
//! drop the scored utterance from its own speaker's centroid so an utterance is
//! never compared against a mean that already contains it:
//!
//! `C_loo[s, u] = (M * C[s] - E[s, u]) / (M - 1)`
//!
//! All functions are deterministic and differentiable.


use candle_core::Tensor;

use crate::error::{Ge2eError, Ge2eResult};
use crate::tensor::{expect_rank, mean_axis};

/// Validates an embedding batch and returns `(N, M, D)`.
pub fn batch_dims(embeddings: &Tensor) -> Ge2eResult<(usize, usize, usize)> {
    expect_rank(embeddings, 3, "embedding batch")?;
    Ok(embeddings.dims3()?)
}

/// Arithmetic mean over the utterance axis: `(N, M, D) -> (N, D)`.
///
/// Fails with a shape error if `M == 0`.
pub fn centroids(embeddings: &Tensor) -> Ge2eResult<Tensor> {
    let (n, m, _) = batch_dims(embeddings)?;
    if m == 0 {
        return Err(Ge2eError::shape(format!(
            "every speaker needs at least one utterance, got {n} speakers with 0"
        )));
    }
    mean_axis(embeddings, 1)
}

fn check_centroids(embeddings: &Tensor, centroids: &Tensor) -> Ge2eResult<(usize, usize, usize)> {
    let (n, m, d) = batch_dims(embeddings)?;
    expect_rank(centroids, 2, "centroids")?;
    if centroids.dims() != [n, d] {
        return Err(Ge2eError::shape(format!(
            "centroids {:?} do not match embedding batch {:?}",
            centroids.dims(),
            embeddings.dims()
        )));
    }
    if m < 2 {
        return Err(Ge2eError::invalid(format!(
            "leave-one-out centroids need at least 2 utterances per speaker, got {m}"
        )));
    }
    Ok((n, m, d))
}

/// Centroid of speaker `speaker` with utterance `utterance` removed: shape `(D,)`.
///
/// Fails with an invalid-input error when `M < 2` (the result would divide by zero).
pub fn leave_one_out_centroid(
    embeddings: &Tensor,
    centroids: &Tensor,
    speaker: usize,
    utterance: usize,
) -> Ge2eResult<Tensor> {
    let (n, m, _) = check_centroids(embeddings, centroids)?;
    if speaker >= n || utterance >= m {
        return Err(Ge2eError::shape(format!(
            "cell ({speaker}, {utterance}) out of range for {n} speakers x {m} utterances"
        )));
    }
    let total = centroids.get(speaker)?.affine(m as f64, 0.0)?;
    let held_out = embeddings.get(speaker)?.get(utterance)?;
    Ok((total - held_out)?.affine(1.0 / (m - 1) as f64, 0.0)?)
}

/// Leave-one-out centroid for every utterance at once: `(N, M, D)`.
///
/// Cell `[s, u]` is [`leave_one_out_centroid`] for `(s, u)`.
pub fn leave_one_out_centroids(embeddings: &Tensor, centroids: &Tensor) -> Ge2eResult<Tensor> {
    let (n, m, d) = check_centroids(embeddings, centroids)?;
    let totals = centroids
        .unsqueeze(1)?
        .broadcast_as((n, m, d))?
        .affine(m as f64, 0.0)?;
    Ok(totals.sub(embeddings)?.affine(1.0 / (m - 1) as f64, 0.0)?)
}
