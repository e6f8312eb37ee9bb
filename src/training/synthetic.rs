use candle_core::{Device, Tensor};
use rand::Rng;
use rand::seq::index;

use crate::constants::BatchDims;
use crate::error::{Ge2eError, Ge2eResult};

/// Generator of clustered frame features: every speaker owns a prototype
/// vector and each frame is that prototype plus uniform noise.
#[derive(Debug, Clone)]
pub struct SyntheticSpeakers {
    prototypes: Vec<Vec<f32>>,
    frames: usize,
    noise: f32,
}

impl SyntheticSpeakers {
    pub fn new<R: Rng + ?Sized>(
        num_speakers: usize,
        frames: usize,
        feature_dim: usize,
        noise: f32,
        rng: &mut R,
    ) -> Ge2eResult<Self> {
        if num_speakers == 0 || frames == 0 || feature_dim == 0 {
            return Err(Ge2eError::invalid(format!(
                "synthetic corpus needs positive sizes, got speakers={num_speakers} \
                 frames={frames} features={feature_dim}"
            )));
        }
        if !noise.is_finite() || noise < 0.0 {
            return Err(Ge2eError::invalid(format!(
                "noise must be finite and non-negative, got {noise}"
            )));
        }
        let prototypes = (0..num_speakers)
            .map(|_| (0..feature_dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect();
        Ok(Self {
            prototypes,
            frames,
            noise,
        })
    }

    pub fn num_speakers(&self) -> usize {
        self.prototypes.len()
    }

    pub fn feature_dim(&self) -> usize {
        self.prototypes.first().map_or(0, Vec::len)
    }

    /// Samples `dims.speakers` distinct speakers and returns an `(N, M, T, F)` batch.
    pub fn batch<R: Rng + ?Sized>(
        &self,
        dims: BatchDims,
        rng: &mut R,
        device: &Device,
    ) -> Ge2eResult<Tensor> {
        if dims.speakers > self.num_speakers() {
            return Err(Ge2eError::invalid(format!(
                "batch wants {} speakers but the corpus has {}",
                dims.speakers,
                self.num_speakers()
            )));
        }
        let feature_dim = self.feature_dim();
        let mut data = Vec::with_capacity(dims.flat_len() * self.frames * feature_dim);
        for speaker in index::sample(rng, self.num_speakers(), dims.speakers) {
            let prototype = &self.prototypes[speaker];
            for _ in 0..dims.utterances * self.frames {
                data.extend(prototype.iter().map(|&p| {
                    if self.noise > 0.0 {
                        p + rng.gen_range(-self.noise..self.noise)
                    } else {
                        p
                    }
                }));
            }
        }
        Ok(Tensor::from_vec(
            data,
            (dims.speakers, dims.utterances, self.frames, feature_dim),
            device,
        )?)
    }

    /// `count` independent batches, as one epoch of a data loader would yield.
    pub fn batches<R: Rng + ?Sized>(
        &self,
        count: usize,
        dims: BatchDims,
        rng: &mut R,
        device: &Device,
    ) -> Ge2eResult<Vec<Tensor>> {
        (0..count).map(|_| self.batch(dims, rng, device)).collect()
    }
}
