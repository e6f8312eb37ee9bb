//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `GE2E_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    BatchDims, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_EPOCHS, DEFAULT_EVAL_EPOCHS,
    DEFAULT_EVAL_SPEAKERS_PER_BATCH, DEFAULT_EVAL_UTTERANCES_PER_SPEAKER, DEFAULT_LEARNING_RATE,
    DEFAULT_LOG_INTERVAL, DEFAULT_LR_DECAY, DEFAULT_SEED, DEFAULT_SPEAKERS_PER_BATCH,
    DEFAULT_THRESHOLD_COUNT, DEFAULT_THRESHOLD_START, DEFAULT_THRESHOLD_STEP,
    DEFAULT_UTTERANCES_PER_SPEAKER,
};
use crate::device::DevicePreference;
use crate::eer::ThresholdGrid;
use crate::loss::{LossConfig, LossPolicy, Reduction};
use crate::training::{EvaluatorConfig, GradClipNorms, TrainerConfig};

/// Default pooled feature width (log-mel bins).
pub const DEFAULT_FEATURE_DIM: usize = 40;
/// Default embedding width of the reference encoder.
pub const DEFAULT_EMBEDDING_DIM: usize = 64;
/// Default frames per synthetic utterance.
pub const DEFAULT_FRAMES: usize = 20;
/// Default size of the synthetic speaker pool.
pub const DEFAULT_CORPUS_SPEAKERS: usize = 32;
/// Default batches drawn per epoch.
pub const DEFAULT_BATCHES_PER_EPOCH: usize = 8;
/// Default half-width of the uniform frame noise.
pub const DEFAULT_SYNTHETIC_NOISE: f32 = 0.5;

/// Full run configuration: batch geometry, loss, optimizer schedule, evaluation,
/// and the synthetic data source used by the `ge2e` binary.
///
/// Use [`Ge2eConfig::from_env`] to read `GE2E_*` overrides on top of defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Ge2eConfig {
    /// Training batch geometry. Default: `4 x 5`.
    pub train_dims: BatchDims,

    /// Evaluation batch geometry. Default: `4 x 6`.
    pub eval_dims: BatchDims,

    /// EER threshold grid. Default: `0.50, 0.51, ..., 0.99`.
    pub threshold_grid: ThresholdGrid,

    pub grad_clip: GradClipNorms,

    pub loss: LossConfig,

    /// Base SGD learning rate. Default: `0.01`.
    pub learning_rate: f64,

    /// Per-epoch learning-rate decay. Default: `0.85`.
    pub lr_decay: f64,

    /// Training epochs. Default: `950`.
    pub epochs: usize,

    /// Evaluation epochs. Default: `10`.
    pub eval_epochs: usize,

    /// Batches between progress events. Default: `30`.
    pub log_interval: usize,

    /// Epochs between checkpoints. `0` disables. Default: `120`.
    pub checkpoint_interval: usize,

    /// Seed for shuffling and synthetic data. Default: `55`.
    pub seed: u64,

    /// Compute backend. Default: `auto`.
    pub device: DevicePreference,

    /// JSON-lines metrics file. Metrics only go to the log when unset.
    pub metrics_path: Option<PathBuf>,

    pub feature_dim: usize,
    pub embedding_dim: usize,
    pub frames: usize,
    pub corpus_speakers: usize,
    pub batches_per_epoch: usize,
    pub synthetic_noise: f32,
}

impl Default for Ge2eConfig {
    fn default() -> Self {
        Self {
            train_dims: BatchDims::new(DEFAULT_SPEAKERS_PER_BATCH, DEFAULT_UTTERANCES_PER_SPEAKER),
            eval_dims: BatchDims::new(
                DEFAULT_EVAL_SPEAKERS_PER_BATCH,
                DEFAULT_EVAL_UTTERANCES_PER_SPEAKER,
            ),
            threshold_grid: ThresholdGrid::default(),
            grad_clip: GradClipNorms::default(),
            loss: LossConfig::default(),
            learning_rate: DEFAULT_LEARNING_RATE,
            lr_decay: DEFAULT_LR_DECAY,
            epochs: DEFAULT_EPOCHS,
            eval_epochs: DEFAULT_EVAL_EPOCHS,
            log_interval: DEFAULT_LOG_INTERVAL,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            seed: DEFAULT_SEED,
            device: DevicePreference::default(),
            metrics_path: None,
            feature_dim: DEFAULT_FEATURE_DIM,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            frames: DEFAULT_FRAMES,
            corpus_speakers: DEFAULT_CORPUS_SPEAKERS,
            batches_per_epoch: DEFAULT_BATCHES_PER_EPOCH,
            synthetic_noise: DEFAULT_SYNTHETIC_NOISE,
        }
    }
}

impl Ge2eConfig {
    const ENV_SPEAKERS: &'static str = "GE2E_SPEAKERS_PER_BATCH";
    const ENV_UTTERANCES: &'static str = "GE2E_UTTERANCES_PER_SPEAKER";
    const ENV_EVAL_SPEAKERS: &'static str = "GE2E_EVAL_SPEAKERS_PER_BATCH";
    const ENV_EVAL_UTTERANCES: &'static str = "GE2E_EVAL_UTTERANCES_PER_SPEAKER";
    const ENV_THRESHOLD_START: &'static str = "GE2E_THRESHOLD_START";
    const ENV_THRESHOLD_STEP: &'static str = "GE2E_THRESHOLD_STEP";
    const ENV_THRESHOLD_COUNT: &'static str = "GE2E_THRESHOLD_COUNT";
    const ENV_EMBEDDING_CLIP: &'static str = "GE2E_EMBEDDING_CLIP_NORM";
    const ENV_CALIBRATION_CLIP: &'static str = "GE2E_CALIBRATION_CLIP_NORM";
    const ENV_LOSS_POLICY: &'static str = "GE2E_LOSS_POLICY";
    const ENV_LOSS_REDUCTION: &'static str = "GE2E_LOSS_REDUCTION";
    const ENV_INITIAL_SCALE: &'static str = "GE2E_INITIAL_SCALE";
    const ENV_INITIAL_BIAS: &'static str = "GE2E_INITIAL_BIAS";
    const ENV_LEARNING_RATE: &'static str = "GE2E_LEARNING_RATE";
    const ENV_LR_DECAY: &'static str = "GE2E_LR_DECAY";
    const ENV_EPOCHS: &'static str = "GE2E_EPOCHS";
    const ENV_EVAL_EPOCHS: &'static str = "GE2E_EVAL_EPOCHS";
    const ENV_LOG_INTERVAL: &'static str = "GE2E_LOG_INTERVAL";
    const ENV_CHECKPOINT_INTERVAL: &'static str = "GE2E_CHECKPOINT_INTERVAL";
    const ENV_SEED: &'static str = "GE2E_SEED";
    const ENV_DEVICE: &'static str = "GE2E_DEVICE";
    const ENV_METRICS_PATH: &'static str = "GE2E_METRICS_PATH";
    const ENV_FEATURE_DIM: &'static str = "GE2E_FEATURE_DIM";
    const ENV_EMBEDDING_DIM: &'static str = "GE2E_EMBEDDING_DIM";
    const ENV_FRAMES: &'static str = "GE2E_FRAMES";
    const ENV_CORPUS_SPEAKERS: &'static str = "GE2E_CORPUS_SPEAKERS";
    const ENV_BATCHES_PER_EPOCH: &'static str = "GE2E_BATCHES_PER_EPOCH";
    const ENV_SYNTHETIC_NOISE: &'static str = "GE2E_SYNTHETIC_NOISE";

    /// Loads configuration from environment variables (falling back to defaults).
    ///
    /// A variable that is set but does not parse is an error, not a silent default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();

        let train_dims = BatchDims::new(
            Self::parse_from_env(Self::ENV_SPEAKERS, d.train_dims.speakers)?,
            Self::parse_from_env(Self::ENV_UTTERANCES, d.train_dims.utterances)?,
        );
        let eval_dims = BatchDims::new(
            Self::parse_from_env(Self::ENV_EVAL_SPEAKERS, d.eval_dims.speakers)?,
            Self::parse_from_env(Self::ENV_EVAL_UTTERANCES, d.eval_dims.utterances)?,
        );
        let threshold_grid = Self::parse_grid_from_env()?;
        let grad_clip = GradClipNorms {
            embedding: Self::parse_from_env(Self::ENV_EMBEDDING_CLIP, d.grad_clip.embedding)?,
            calibration: Self::parse_from_env(
                Self::ENV_CALIBRATION_CLIP,
                d.grad_clip.calibration,
            )?,
        };
        let loss = LossConfig {
            policy: Self::parse_from_env::<LossPolicy>(Self::ENV_LOSS_POLICY, d.loss.policy)?,
            reduction: Self::parse_from_env::<Reduction>(
                Self::ENV_LOSS_REDUCTION,
                d.loss.reduction,
            )?,
            initial_scale: Self::parse_from_env(Self::ENV_INITIAL_SCALE, d.loss.initial_scale)?,
            initial_bias: Self::parse_from_env(Self::ENV_INITIAL_BIAS, d.loss.initial_bias)?,
        };

        Ok(Self {
            train_dims,
            eval_dims,
            threshold_grid,
            grad_clip,
            loss,
            learning_rate: Self::parse_from_env(Self::ENV_LEARNING_RATE, d.learning_rate)?,
            lr_decay: Self::parse_from_env(Self::ENV_LR_DECAY, d.lr_decay)?,
            epochs: Self::parse_from_env(Self::ENV_EPOCHS, d.epochs)?,
            eval_epochs: Self::parse_from_env(Self::ENV_EVAL_EPOCHS, d.eval_epochs)?,
            log_interval: Self::parse_from_env(Self::ENV_LOG_INTERVAL, d.log_interval)?,
            checkpoint_interval: Self::parse_from_env(
                Self::ENV_CHECKPOINT_INTERVAL,
                d.checkpoint_interval,
            )?,
            seed: Self::parse_from_env(Self::ENV_SEED, d.seed)?,
            device: Self::parse_from_env::<DevicePreference>(Self::ENV_DEVICE, d.device)?,
            metrics_path: Self::parse_optional_path_from_env(Self::ENV_METRICS_PATH),
            feature_dim: Self::parse_from_env(Self::ENV_FEATURE_DIM, d.feature_dim)?,
            embedding_dim: Self::parse_from_env(Self::ENV_EMBEDDING_DIM, d.embedding_dim)?,
            frames: Self::parse_from_env(Self::ENV_FRAMES, d.frames)?,
            corpus_speakers: Self::parse_from_env(Self::ENV_CORPUS_SPEAKERS, d.corpus_speakers)?,
            batches_per_epoch: Self::parse_from_env(
                Self::ENV_BATCHES_PER_EPOCH,
                d.batches_per_epoch,
            )?,
            synthetic_noise: Self::parse_from_env(Self::ENV_SYNTHETIC_NOISE, d.synthetic_noise)?,
        })
    }

    /// Validates cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trainer_config().validate()?;
        self.evaluator_config().validate()?;

        if self.log_interval == 0 {
            return Err(ConfigError::Invalid {
                reason: "log interval must be at least 1".to_string(),
            });
        }
        if self.epochs == 0 || self.eval_epochs == 0 || self.batches_per_epoch == 0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "epochs ({}), eval epochs ({}) and batches per epoch ({}) must be positive",
                    self.epochs, self.eval_epochs, self.batches_per_epoch
                ),
            });
        }
        if self.feature_dim == 0 || self.embedding_dim == 0 || self.frames == 0 {
            return Err(ConfigError::Invalid {
                reason: "feature dim, embedding dim and frames must be positive".to_string(),
            });
        }
        let widest = self.train_dims.speakers.max(self.eval_dims.speakers);
        if self.corpus_speakers < widest {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "corpus has {} speakers but a batch needs {widest}",
                    self.corpus_speakers
                ),
            });
        }
        if let Some(ref path) = self.metrics_path
            && path.is_dir()
        {
            return Err(ConfigError::Invalid {
                reason: format!("metrics path is a directory: {}", path.display()),
            });
        }
        if !self.synthetic_noise.is_finite() || self.synthetic_noise < 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "synthetic noise must be non-negative, got {}",
                    self.synthetic_noise
                ),
            });
        }

        Ok(())
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            dims: self.train_dims,
            learning_rate: self.learning_rate,
            lr_decay: self.lr_decay,
            log_interval: self.log_interval,
            checkpoint_interval: self.checkpoint_interval,
            grad_clip: self.grad_clip,
            loss: self.loss.clone(),
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            dims: self.eval_dims,
            grid: self.threshold_grid.clone(),
        }
    }

    fn parse_from_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match env::var(name) {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    name,
                    reason: e.to_string(),
                    value,
                }),
            Err(_) => Ok(default),
        }
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn parse_grid_from_env() -> Result<ThresholdGrid, ConfigError> {
        let start = Self::parse_from_env(Self::ENV_THRESHOLD_START, DEFAULT_THRESHOLD_START)?;
        let step = Self::parse_from_env(Self::ENV_THRESHOLD_STEP, DEFAULT_THRESHOLD_STEP)?;
        let count = Self::parse_from_env(Self::ENV_THRESHOLD_COUNT, DEFAULT_THRESHOLD_COUNT)?;
        Ok(ThresholdGrid::linspace(start, step, count)?)
    }
}
