use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::{Linear, Module, VarBuilder, VarMap};

use crate::error::{Ge2eError, Ge2eResult};
use crate::shuffle::Permutation;
use crate::tensor::{expect_rank, reshape};

/// The external embedding producer.
///
/// `embed` maps `K` input rows `(K, ...)` to `(K, D)` embeddings and must be
/// order-preserving: output row `i` belongs to input row `i`.
pub trait SpeakerEncoder {
    fn embed(&self, features: &Tensor) -> Ge2eResult<Tensor>;

    /// Trainable parameters, clipped together as the embedding group.
    fn vars(&self) -> Vec<Var>;

    fn embedding_dim(&self) -> usize;
}

/// Runs `encoder` and checks that it honored the `(K, ...) -> (K, D)` contract.
pub fn embed_checked<E: SpeakerEncoder + ?Sized>(
    encoder: &E,
    rows: &Tensor,
) -> Ge2eResult<Tensor> {
    let k = rows.dims().first().copied().unwrap_or(0);
    let embedded = encoder.embed(rows)?;
    if embedded.rank() != 2 || embedded.dims()[0] != k {
        return Err(Ge2eError::Encoder {
            reason: format!(
                "expected ({k}, D) embeddings, got shape {:?}",
                embedded.dims()
            ),
        });
    }
    Ok(embedded)
}

/// Embeds an `(N, M, ...)` batch into `(N, M, D)`.
///
/// With a permutation, the flattened utterances are fed to the encoder in
/// permuted order and restored afterwards.
pub fn embed_batch<E: SpeakerEncoder + ?Sized>(
    encoder: &E,
    batch: &Tensor,
    permutation: Option<&Permutation>,
) -> Ge2eResult<Tensor> {
    let dims = batch.dims();
    if dims.len() < 3 {
        return Err(Ge2eError::shape(format!(
            "feature batch must be (N, M, ...), got {dims:?}"
        )));
    }
    let (n, m) = (dims[0], dims[1]);
    let mut flat_shape = vec![n * m];
    flat_shape.extend_from_slice(&dims[2..]);
    let flat = reshape(batch, &flat_shape)?;

    let embedded = match permutation {
        Some(perm) => perm.restore_rows(&embed_checked(encoder, &perm.permute_rows(&flat)?)?)?,
        None => embed_checked(encoder, &flat)?,
    };
    let d = embedded.dims()[1];
    reshape(&embedded, &[n, m, d])
}

/// Reference encoder: mean-pool frames, project linearly, L2-normalize.
///
/// Accepts `(K, T, F)` frame sequences or already pooled `(K, F)` features.
/// Stands in for a real network in the binary and tests.
pub struct ProjectionEncoder {
    varmap: VarMap,
    projection: Linear,
    feature_dim: usize,
    embedding_dim: usize,
}

impl std::fmt::Debug for ProjectionEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionEncoder")
            .field("feature_dim", &self.feature_dim)
            .field("embedding_dim", &self.embedding_dim)
            .finish()
    }
}

impl ProjectionEncoder {
    pub fn new(feature_dim: usize, embedding_dim: usize, device: &Device) -> Ge2eResult<Self> {
        if feature_dim == 0 || embedding_dim == 0 {
            return Err(Ge2eError::invalid(format!(
                "encoder dims must be positive, got {feature_dim} -> {embedding_dim}"
            )));
        }
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let projection = candle_nn::linear(feature_dim, embedding_dim, vb.pp("projection"))?;
        Ok(Self {
            varmap,
            projection,
            feature_dim,
            embedding_dim,
        })
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }
}

impl SpeakerEncoder for ProjectionEncoder {
    fn embed(&self, features: &Tensor) -> Ge2eResult<Tensor> {
        let pooled = match features.rank() {
            3 => features.mean(1)?,
            _ => {
                expect_rank(features, 2, "encoder input")?;
                features.clone()
            }
        };
        if pooled.dims()[1] != self.feature_dim {
            return Err(Ge2eError::shape(format!(
                "encoder expects {} features, got {:?}",
                self.feature_dim,
                features.dims()
            )));
        }
        let projected = self.projection.forward(&pooled)?;
        let norm = projected
            .sqr()?
            .sum_keepdim(D::Minus1)?
            .affine(1.0, 1e-12)?
            .sqrt()?;
        Ok(projected.broadcast_div(&norm)?)
    }

    fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}
