//! Training and evaluation drivers around the GE2E core.
//!
//! The embedding network itself is external: anything implementing
//! [`SpeakerEncoder`] can be trained by [`Trainer`] and scored by
//! [`VerificationEvaluator`]. [`ProjectionEncoder`] is a minimal stand-in.

pub mod clip;
pub mod encoder;
pub mod evaluator;
pub mod metrics;
pub mod synthetic;
pub mod trainer;


pub use clip::{GradClipNorms, clip_grad_norm};
pub use encoder::{ProjectionEncoder, SpeakerEncoder, embed_batch, embed_checked};
pub use evaluator::{EvaluationSummary, EvaluatorConfig, VerificationEvaluator};
pub use metrics::{
    EVAL_EER, JsonLinesSink, MemorySink, MetricRecord, MetricsSink, MultiSink, TRAIN_LOSS,
    TRAIN_TOTAL_LOSS, TracingSink,
};
pub use synthetic::SyntheticSpeakers;
pub use trainer::{Checkpointer, EpochReport, StepReport, Trainer, TrainerConfig};
