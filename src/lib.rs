//! GE2E speaker-verification core (used by the `ge2e` binary and integration tests).
//!
//! # Public API Surface
//!
//! ## Batch Geometry
//! - [`BatchDims`] - `N` speakers by `M` utterances
//! - [`tensor`] - validated reshape/stack/select/compare/reduce helpers
//! - [`BatchShuffler`], [`Permutation`] - order-reversible per-batch shuffling
//! - [`centroids`], [`leave_one_out_centroids`] - speaker centroids
//!
//! ## Scoring
//! - [`similarity_tensor`] - `(N, M, N)` cosine similarity with leave-one-out diagonal
//! - [`cross_similarity_tensor`] - plain cosine against external centroids
//! - [`Ge2eLoss`], [`LossConfig`] - calibrated GE2E loss (softmax or contrast)
//! - [`EerEvaluator`], [`find_eer`] - equal error rate over a threshold grid
//!
//! ## Training & Evaluation
//! - [`SpeakerEncoder`] - the seam to an external embedding network
//! - [`Trainer`], [`VerificationEvaluator`] - drivers around the core
//! - [`MetricsSink`] - where scalar metrics go
//!
//! ## Configuration
//! - [`Ge2eConfig`], [`ConfigError`] - environment-backed run configuration
//!
//! All tensors are `f32` [`candle_core::Tensor`]s. Every operation reports
//! failures through [`Ge2eError`]; nothing substitutes a default value.

pub mod centroid;
pub mod config;
pub mod constants;
pub mod device;
pub mod eer;
pub mod error;
pub mod loss;
pub mod shuffle;
pub mod similarity;
pub mod tensor;
pub mod training;

pub use centroid::{centroids, leave_one_out_centroid, leave_one_out_centroids};
pub use config::{ConfigError, Ge2eConfig};
pub use constants::BatchDims;
pub use device::{DevicePreference, select_device};
pub use eer::{EerEvaluator, EerResult, ErrorRates, ThresholdGrid, error_rates, find_eer};
pub use error::{Ge2eError, Ge2eResult};
pub use loss::{Ge2eLoss, LossConfig, LossPolicy, Reduction};
pub use shuffle::{BatchShuffler, Permutation};
pub use similarity::{cosine_similarity, cross_similarity_tensor, similarity_tensor};
pub use training::{
    Checkpointer, EpochReport, EvaluationSummary, EvaluatorConfig, GradClipNorms, JsonLinesSink,
    MemorySink, MetricRecord, MetricsSink, MultiSink, ProjectionEncoder, SpeakerEncoder,
    StepReport, SyntheticSpeakers, TracingSink, Trainer, TrainerConfig, VerificationEvaluator,
};
