//! GE2E training and verification entrypoint.
//!
//! Trains the reference encoder on synthetic clustered speakers, then reports
//! the enrollment/verification EER as JSON on stdout.

use std::fs::File;
use std::io::BufWriter;

use mimalloc::MiMalloc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use ge2e::config::Ge2eConfig;
use ge2e::device::select_device;
use ge2e::training::{
    JsonLinesSink, MultiSink, ProjectionEncoder, SyntheticSpeakers, TracingSink,
    Trainer, VerificationEvaluator,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn build_sink(config: &Ge2eConfig) -> anyhow::Result<MultiSink> {
    let sink = MultiSink::new().with(TracingSink);
    match &config.metrics_path {
        Some(path) => {
            let file = File::create(path)?;
            tracing::info!(path = %path.display(), "Writing metrics");
            Ok(sink.with(JsonLinesSink::new(BufWriter::new(file))))
        }
        None => Ok(sink),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Ge2eConfig::from_env()?;
    config.validate()?;

    tracing::info!(
        speakers = config.train_dims.speakers,
        utterances = config.train_dims.utterances,
        epochs = config.epochs,
        policy = %config.loss.policy,
        "GE2E starting"
    );

    let device = select_device(config.device)?;
    let mut data_rng = StdRng::seed_from_u64(config.seed);
    let speakers = SyntheticSpeakers::new(
        config.corpus_speakers,
        config.frames,
        config.feature_dim,
        config.synthetic_noise,
        &mut data_rng,
    )?;

    let encoder = ProjectionEncoder::new(config.feature_dim, config.embedding_dim, &device)?;
    let mut trainer = Trainer::new(
        encoder,
        config.trainer_config(),
        StdRng::seed_from_u64(config.seed),
        Box::new(build_sink(&config)?),
        &device,
    )?;

    let reports = trainer.train(
        config.epochs,
        |_| speakers.batches(config.batches_per_epoch, config.train_dims, &mut data_rng, &device),
        None,
    )?;
    if let Some(last) = reports.last() {
        tracing::info!(
            final_mean_loss = last.mean_loss,
            scale = trainer.loss().scale()?,
            bias = trainer.loss().bias()?,
            "Training finished"
        );
    }

    let (encoder, _, mut sink) = trainer.into_parts();
    let evaluator = VerificationEvaluator::new(config.evaluator_config())?;
    let mut eval_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let summary = evaluator.evaluate(
        &encoder,
        config.eval_epochs,
        |_| speakers.batches(config.batches_per_epoch, config.eval_dims, &mut data_rng, &device),
        &mut eval_rng,
        sink.as_mut(),
    )?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
