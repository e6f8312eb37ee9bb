use candle_core::Tensor;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use super::encoder::{SpeakerEncoder, embed_batch};
use super::metrics::{EVAL_EER, MetricsSink};
use crate::centroid::centroids;
use crate::constants::{
    BatchDims, DEFAULT_EVAL_SPEAKERS_PER_BATCH, DEFAULT_EVAL_UTTERANCES_PER_SPEAKER,
};
use crate::eer::{EerEvaluator, EerResult, ThresholdGrid};
use crate::error::{Ge2eError, Ge2eResult};
use crate::shuffle::BatchShuffler;
use crate::similarity::cross_similarity_tensor;
use crate::tensor::narrow;

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Evaluation batch geometry. `utterances` is split evenly into an
    /// enrollment half and a verification half, so it must be even.
    pub dims: BatchDims,
    pub grid: ThresholdGrid,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            dims: BatchDims::new(
                DEFAULT_EVAL_SPEAKERS_PER_BATCH,
                DEFAULT_EVAL_UTTERANCES_PER_SPEAKER,
            ),
            grid: ThresholdGrid::default(),
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Ge2eResult<()> {
        let dims = self.dims;
        if dims.speakers < 2 {
            return Err(Ge2eError::invalid(format!(
                "evaluation needs at least 2 speakers, got {}",
                dims.speakers
            )));
        }
        if dims.utterances < 2 || dims.utterances % 2 != 0 {
            return Err(Ge2eError::invalid(format!(
                "evaluation utterances must be even and at least 2, got {}",
                dims.utterances
            )));
        }
        if self.grid.is_empty() {
            return Err(Ge2eError::invalid("threshold grid is empty"));
        }
        Ok(())
    }
}

/// Aggregate of a multi-epoch verification run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    /// Mean EER of each epoch, in order.
    pub epoch_eers: Vec<f64>,
    /// Mean of `epoch_eers`.
    pub mean_eer: f64,
    pub batches: usize,
}

/// Enrollment/verification EER evaluation.
///
/// Each `(N, M, ...)` batch is split along the utterance axis: the first
/// `M/2` utterances build speaker centroids, the remaining `M/2` are scored
/// against every centroid. Verification utterances take no part in the
/// centroids, so plain cosine similarity is used throughout.
#[derive(Debug, Clone)]
pub struct VerificationEvaluator {
    dims: BatchDims,
    eer: EerEvaluator,
    shuffler: BatchShuffler,
}

impl VerificationEvaluator {
    pub fn new(config: EvaluatorConfig) -> Ge2eResult<Self> {
        config.validate()?;
        let half = config.dims.utterances / 2;
        let shuffler = BatchShuffler::new(config.dims.speakers * half)?;
        Ok(Self {
            dims: config.dims,
            eer: EerEvaluator::new(config.grid),
            shuffler,
        })
    }

    pub fn dims(&self) -> BatchDims {
        self.dims
    }

    /// Scores a single batch.
    pub fn evaluate_batch<E, R>(
        &self,
        encoder: &E,
        batch: &Tensor,
        rng: &mut R,
    ) -> Ge2eResult<EerResult>
    where
        E: SpeakerEncoder + ?Sized,
        R: Rng + ?Sized,
    {
        let dims = batch.dims();
        if dims.len() < 3 || dims[0] != self.dims.speakers || dims[1] != self.dims.utterances {
            return Err(Ge2eError::shape(format!(
                "evaluation batch must be ({}, {}, ...), got {dims:?}",
                self.dims.speakers, self.dims.utterances
            )));
        }
        let half = self.dims.utterances / 2;
        let enrollment = narrow(batch, 1, 0, half)?;
        let verification = narrow(batch, 1, half, half)?;

        let enrollment = embed_batch(encoder, &enrollment, None)?;
        let permutation = self.shuffler.draw(rng);
        let verification = embed_batch(encoder, &verification, Some(&permutation))?;

        let centroids = centroids(&enrollment)?;
        let similarity = cross_similarity_tensor(&verification, &centroids)?;
        self.eer.evaluate(&similarity)
    }

    /// Averages batch EERs per epoch and over all epochs.
    ///
    /// Each epoch's mean is recorded under `eval/eer` with the epoch index as step.
    pub fn evaluate<E, R, F>(
        &self,
        encoder: &E,
        epochs: usize,
        mut batches_for: F,
        rng: &mut R,
        sink: &mut dyn MetricsSink,
    ) -> Ge2eResult<EvaluationSummary>
    where
        E: SpeakerEncoder + ?Sized,
        R: Rng + ?Sized,
        F: FnMut(usize) -> Ge2eResult<Vec<Tensor>>,
    {
        if epochs == 0 {
            return Err(Ge2eError::invalid("evaluation needs at least one epoch"));
        }
        let mut epoch_eers = Vec::with_capacity(epochs);
        let mut batches = 0usize;
        for epoch in 0..epochs {
            let mut sum = 0.0;
            let mut count = 0usize;
            for batch in batches_for(epoch)? {
                let result = self.evaluate_batch(encoder, &batch, rng)?;
                info!(epoch = epoch + 1, batch = count + 1, "{result}");
                sum += result.eer;
                count += 1;
            }
            if count == 0 {
                return Err(Ge2eError::invalid(format!(
                    "evaluation epoch {epoch} had no batches"
                )));
            }
            let epoch_eer = sum / count as f64;
            sink.record(EVAL_EER, epoch_eer, epoch as u64)?;
            info!(epoch = epoch + 1, eer = epoch_eer, "Evaluation epoch finished");
            epoch_eers.push(epoch_eer);
            batches += count;
        }
        let mean_eer = epoch_eers.iter().sum::<f64>() / epoch_eers.len() as f64;
        info!(epochs, mean_eer, "EER across {epochs} epochs: {mean_eer:.4}");
        Ok(EvaluationSummary {
            epoch_eers,
            mean_eer,
            batches,
        })
    }
}
