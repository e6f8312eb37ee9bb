//! Utterance-to-centroid cosine similarity.
//!
//! [`similarity_tensor`] turns an `(N, M, D)` embedding batch and its `(N, D)`
//! centroids into an `(N, M, N)` tensor `S` where `S[s, u, k]` is the cosine
//! between utterance `(s, u)` and speaker `k`'s centroid. On the diagonal
//! (`k == s`) the leave-one-out centroid is used instead, so an utterance is
//! never scored against a mean that contains it.
//!
//! Cosine similarity of a zero vector is defined as `0`, never `NaN`.
//!
//! Cost is `O(N^2 * M * D)`, dominated by one `(N*M, D) x (D, N)` matmul.


use candle_core::{D, Tensor};
use tracing::debug;

use crate::centroid::{batch_dims, leave_one_out_centroids};
use crate::error::{Ge2eError, Ge2eResult};
use crate::tensor::{expect_rank, identity_mask};

/// Cosine similarity of two slices; `0.0` if either is all zeros or lengths differ.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a_sq, norm_b_sq) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (&av, &bv)| {
            (dot + av * bv, na + av * av, nb + bv * bv)
        });

    let norm_a = norm_a_sq.sqrt();
    let norm_b = norm_b_sq.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Row norms over the last axis, keeping it as size one.
///
/// Zero rows get a norm of exactly `0` with a zero gradient: the square root
/// is never evaluated at `0`, where its derivative is infinite.
fn l2_norm(t: &Tensor) -> Ge2eResult<Tensor> {
    let squared = t.sqr()?.sum_keepdim(D::Minus1)?;
    let is_zero = squared.eq(0.0)?;
    let safe = is_zero.where_cond(&squared.ones_like()?, &squared)?;
    Ok(is_zero.where_cond(&squared.zeros_like()?, &safe.sqrt()?)?)
}

/// `num / denom`, with zero denominators replaced by one (the numerator is
/// zero there as well, so the result is exactly `0`).
fn zero_safe_div(num: &Tensor, denom: &Tensor) -> Ge2eResult<Tensor> {
    let is_zero = denom.eq(0.0)?;
    let denom = is_zero.where_cond(&denom.ones_like()?, denom)?;
    Ok(num.div(&denom)?)
}

/// Cosine between matching rows of two same-shaped tensors: `(.., D) -> (..)`.
pub fn rowwise_cosine(a: &Tensor, b: &Tensor) -> Ge2eResult<Tensor> {
    if a.dims() != b.dims() {
        return Err(Ge2eError::shape(format!(
            "rowwise cosine requires identical shapes, got {:?} and {:?}",
            a.dims(),
            b.dims()
        )));
    }
    let dot = a.mul(b)?.sum_keepdim(D::Minus1)?;
    let denom = l2_norm(a)?.mul(&l2_norm(b)?)?;
    Ok(zero_safe_div(&dot, &denom)?.squeeze(D::Minus1)?)
}

/// All-pairs cosine between the rows of `rows` `(K, D)` and `cols` `(N, D)`: `(K, N)`.
pub fn cosine_matrix(rows: &Tensor, cols: &Tensor) -> Ge2eResult<Tensor> {
    expect_rank(rows, 2, "rows")?;
    expect_rank(cols, 2, "cols")?;
    if rows.dims()[1] != cols.dims()[1] {
        return Err(Ge2eError::shape(format!(
            "embedding dims differ: {:?} vs {:?}",
            rows.dims(),
            cols.dims()
        )));
    }
    let dot = rows.matmul(&cols.t()?)?;
    let denom = l2_norm(rows)?.broadcast_mul(&l2_norm(cols)?.t()?)?;
    zero_safe_div(&dot, &denom)
}

/// GE2E similarity tensor `(N, M, N)` with leave-one-out centroids on the diagonal.
///
/// `centroids` must be the `(N, D)` centroids of `embeddings` (see
/// [`centroids`](crate::centroid::centroids)). Requires `M >= 2`.
pub fn similarity_tensor(embeddings: &Tensor, centroids: &Tensor) -> Ge2eResult<Tensor> {
    let (n, m, d) = batch_dims(embeddings)?;
    let own_centroids = leave_one_out_centroids(embeddings, centroids)?;

    let own = rowwise_cosine(embeddings, &own_centroids)?;
    let cross = cosine_matrix(&embeddings.reshape((n * m, d))?, centroids)?.reshape((n, m, n))?;

    let diagonal = identity_mask(n, embeddings.device())?
        .unsqueeze(1)?
        .broadcast_as((n, m, n))?;
    let own = own.unsqueeze(2)?.broadcast_as((n, m, n))?;

    debug!(speakers = n, utterances = m, dim = d, "Computed similarity tensor");
    Ok(diagonal.where_cond(&own, &cross)?)
}

/// Similarity of held-out utterances `(N, M, D)` against independent centroids
/// `(K, D)`, giving `(N, M, K)`.
///
/// No leave-one-out correction is applied, since the centroids were computed
/// from other utterances (enrollment halves during evaluation).
pub fn cross_similarity_tensor(embeddings: &Tensor, centroids: &Tensor) -> Ge2eResult<Tensor> {
    let (n, m, d) = batch_dims(embeddings)?;
    expect_rank(centroids, 2, "centroids")?;
    let k = centroids.dims()[0];
    Ok(cosine_matrix(&embeddings.reshape((n * m, d))?, centroids)?.reshape((n, m, k))?)
}

/// Validates an `(N, M, N)` similarity tensor with `N >= 2`; returns `(N, M)`.
pub fn similarity_dims(similarity: &Tensor) -> Ge2eResult<(usize, usize)> {
    expect_rank(similarity, 3, "similarity tensor")?;
    let (n, m, k) = similarity.dims3()?;
    if n != k {
        return Err(Ge2eError::shape(format!(
            "similarity tensor must be (N, M, N), got {:?}",
            similarity.dims()
        )));
    }
    if n < 2 {
        return Err(Ge2eError::invalid(format!("at least 2 speakers required, got {n}")));
    }
    if m == 0 {
        return Err(Ge2eError::shape("similarity tensor has no utterances"));
    }
    Ok((n, m))
}
