use candle_core::{Device, Tensor, Var};
use candle_nn::{Optimizer, SGD};
use rand::rngs::StdRng;
use tracing::{debug, info};

use super::clip::{GradClipNorms, clip_grad_norm};
use super::encoder::{SpeakerEncoder, embed_batch};
use super::metrics::{MetricsSink, TRAIN_LOSS, TRAIN_TOTAL_LOSS};
use crate::constants::{
    BatchDims, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_LEARNING_RATE, DEFAULT_LOG_INTERVAL,
    DEFAULT_LR_DECAY,
};
use crate::error::{Ge2eError, Ge2eResult};
use crate::loss::{Ge2eLoss, LossConfig};
use crate::shuffle::BatchShuffler;

/// Hyper-parameters of the training driver.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub dims: BatchDims,
    pub learning_rate: f64,
    /// Multiplicative learning-rate decay applied once per epoch.
    pub lr_decay: f64,
    /// Emit a progress event every this many batches. `0` disables.
    pub log_interval: usize,
    /// Invoke the checkpointer every this many epochs. `0` disables.
    pub checkpoint_interval: usize,
    pub grad_clip: GradClipNorms,
    pub loss: LossConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            dims: BatchDims::default(),
            learning_rate: DEFAULT_LEARNING_RATE,
            lr_decay: DEFAULT_LR_DECAY,
            log_interval: DEFAULT_LOG_INTERVAL,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            grad_clip: GradClipNorms::default(),
            loss: LossConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Ge2eResult<()> {
        self.dims.validate()?;
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Ge2eError::invalid(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.lr_decay > 0.0 && self.lr_decay <= 1.0) {
            return Err(Ge2eError::invalid(format!(
                "lr decay must be in (0, 1], got {}",
                self.lr_decay
            )));
        }
        self.grad_clip.validate()?;
        self.loss.validate()
    }

    /// Step schedule: `learning_rate * lr_decay^epoch`.
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        self.learning_rate * self.lr_decay.powi(epoch.min(i32::MAX as usize) as i32)
    }
}

/// Outcome of a single optimization step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub loss: f64,
    /// Encoder gradient norm before clipping.
    pub embedding_grad_norm: f64,
    /// Calibration gradient norm before clipping.
    pub calibration_grad_norm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub batches: usize,
    pub total_loss: f64,
    pub mean_loss: f64,
    pub learning_rate: f64,
}

/// Persists model state at checkpoint epochs.
pub trait Checkpointer {
    fn checkpoint(&mut self, epoch: usize, encoder_vars: &[Var], loss: &Ge2eLoss)
    -> Ge2eResult<()>;
}

/// Drives GE2E optimization of an encoder together with the loss calibration.
///
/// Each step shuffles the flattened batch before embedding, restores the
/// original order, computes the loss, clips the two parameter groups
/// independently, and applies one SGD update.
pub struct Trainer<E: SpeakerEncoder> {
    encoder: E,
    loss: Ge2eLoss,
    optimizer: SGD,
    shuffler: BatchShuffler,
    rng: StdRng,
    sink: Box<dyn MetricsSink + Send>,
    config: TrainerConfig,
    iteration: u64,
}

impl<E: SpeakerEncoder> std::fmt::Debug for Trainer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("loss", &self.loss)
            .field("config", &self.config)
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

impl<E: SpeakerEncoder> Trainer<E> {
    pub fn new(
        encoder: E,
        config: TrainerConfig,
        rng: StdRng,
        sink: Box<dyn MetricsSink + Send>,
        device: &Device,
    ) -> Ge2eResult<Self> {
        config.validate()?;
        let loss = Ge2eLoss::new(config.loss.clone(), device)?;
        let mut vars = encoder.vars();
        vars.extend(loss.vars());
        let optimizer = SGD::new(vars, config.learning_rate)?;
        let shuffler = BatchShuffler::for_batch(config.dims)?;

        info!(
            speakers = config.dims.speakers,
            utterances = config.dims.utterances,
            learning_rate = config.learning_rate,
            policy = %config.loss.policy,
            reduction = %config.loss.reduction,
            "Trainer initialized"
        );

        Ok(Self {
            encoder,
            loss,
            optimizer,
            shuffler,
            rng,
            sink,
            config,
            iteration: 0,
        })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn loss(&self) -> &Ge2eLoss {
        &self.loss
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Number of optimization steps taken so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Consumes the trainer, handing back the encoder, the calibrated loss and the sink.
    pub fn into_parts(self) -> (E, Ge2eLoss, Box<dyn MetricsSink + Send>) {
        (self.encoder, self.loss, self.sink)
    }

    fn check_batch(&self, batch: &Tensor) -> Ge2eResult<()> {
        let dims = batch.dims();
        let want = self.config.dims;
        if dims.len() < 3 || dims[0] != want.speakers || dims[1] != want.utterances {
            return Err(Ge2eError::shape(format!(
                "training batch must be ({}, {}, ...), got {dims:?}",
                want.speakers, want.utterances
            )));
        }
        Ok(())
    }

    /// One optimization step on an `(N, M, ...)` feature batch.
    pub fn train_step(&mut self, batch: &Tensor) -> Ge2eResult<StepReport> {
        self.check_batch(batch)?;

        let permutation = self.shuffler.draw(&mut self.rng);
        let embeddings = embed_batch(&self.encoder, batch, Some(&permutation))?;
        let loss = self.loss.forward(&embeddings)?;
        let loss_value = loss.to_scalar::<f32>()? as f64;
        if !loss_value.is_finite() {
            return Err(Ge2eError::invalid(format!(
                "loss is not finite at iteration {}: {loss_value}",
                self.iteration
            )));
        }

        let mut grads = loss.backward()?;
        let clip = self.config.grad_clip;
        let embedding_grad_norm = clip_grad_norm(&mut grads, &self.encoder.vars(), clip.embedding)?;
        let calibration_grad_norm =
            clip_grad_norm(&mut grads, &self.loss.vars(), clip.calibration)?;
        self.optimizer.step(&grads)?;
        self.iteration += 1;

        debug!(
            iteration = self.iteration,
            loss = loss_value,
            embedding_grad_norm,
            calibration_grad_norm,
            "Training step"
        );

        Ok(StepReport {
            loss: loss_value,
            embedding_grad_norm,
            calibration_grad_norm,
        })
    }

    /// Runs one epoch over `batches` at the scheduled learning rate for `epoch`.
    pub fn train_epoch<I>(&mut self, epoch: usize, batches: I) -> Ge2eResult<EpochReport>
    where
        I: IntoIterator<Item = Tensor>,
    {
        let learning_rate = self.config.learning_rate_at(epoch);
        self.optimizer.set_learning_rate(learning_rate);

        let mut total_loss = 0.0;
        let mut count = 0usize;
        for batch in batches {
            let step = self.iteration;
            let report = self.train_step(&batch)?;
            total_loss += report.loss;
            count += 1;

            self.sink.record(TRAIN_LOSS, report.loss, step)?;
            self.sink.record(TRAIN_TOTAL_LOSS, total_loss, step)?;

            if self.config.log_interval > 0 && count % self.config.log_interval == 0 {
                info!(
                    epoch = epoch + 1,
                    batch = count,
                    iteration = self.iteration,
                    loss = report.loss,
                    mean_loss = total_loss / count as f64,
                    "Training progress"
                );
            }
        }

        if count == 0 {
            return Err(Ge2eError::invalid(format!("epoch {epoch} had no batches")));
        }

        Ok(EpochReport {
            epoch,
            batches: count,
            total_loss,
            mean_loss: total_loss / count as f64,
            learning_rate,
        })
    }

    /// Trains for `epochs` epochs, asking `batches_for` for each epoch's data.
    ///
    /// The checkpointer runs every `checkpoint_interval` epochs and once more
    /// after the final epoch if that one was not already checkpointed.
    pub fn train<F>(
        &mut self,
        epochs: usize,
        mut batches_for: F,
        mut checkpointer: Option<&mut dyn Checkpointer>,
    ) -> Ge2eResult<Vec<EpochReport>>
    where
        F: FnMut(usize) -> Ge2eResult<Vec<Tensor>>,
    {
        let mut reports = Vec::with_capacity(epochs);
        let interval = self.config.checkpoint_interval;
        for epoch in 0..epochs {
            let batches = batches_for(epoch)?;
            let report = self.train_epoch(epoch, batches)?;
            info!(
                epoch = epoch + 1,
                mean_loss = report.mean_loss,
                learning_rate = report.learning_rate,
                "Epoch finished"
            );
            reports.push(report);

            let last = epoch + 1 == epochs;
            let scheduled = interval > 0 && (epoch + 1) % interval == 0;
            if let Some(ckpt) = checkpointer.as_deref_mut()
                && (scheduled || last)
            {
                ckpt.checkpoint(epoch + 1, &self.encoder.vars(), &self.loss)?;
                info!(epoch = epoch + 1, "Checkpoint written");
            }
        }
        Ok(reports)
    }
}
