//! Scalar metric sinks.
//!
//! The training and evaluation drivers only emit `(name, value, step)` triples.
//! Where they end up is the sink's business.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Ge2eResult;

/// Per-batch training loss.
pub const TRAIN_LOSS: &str = "train/loss";
/// Running sum of batch losses within the current epoch.
pub const TRAIN_TOTAL_LOSS: &str = "train/total_loss";
/// Mean EER of one evaluation epoch.
pub const EVAL_EER: &str = "eval/eer";

/// A single recorded scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub step: u64,
    pub recorded_at: DateTime<Utc>,
}

impl MetricRecord {
    pub fn now(name: &str, value: f64, step: u64) -> Self {
        Self {
            name: name.to_string(),
            value,
            step,
            recorded_at: Utc::now(),
        }
    }
}

pub trait MetricsSink {
    fn record(&mut self, name: &str, value: f64, step: u64) -> Ge2eResult<()>;
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn record(&mut self, name: &str, value: f64, step: u64) -> Ge2eResult<()> {
        (**self).record(name, value, step)
    }
}

/// Emits every metric as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&mut self, name: &str, value: f64, step: u64) -> Ge2eResult<()> {
        info!(metric = name, value, step, "Recorded metric");
        Ok(())
    }
}

/// In-memory sink. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }

    /// Values recorded under `name`, in emission order.
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.value)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, name: &str, value: f64, step: u64) -> Ge2eResult<()> {
        self.records.lock().push(MetricRecord::now(name, value, step));
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricsSink for JsonLinesSink<W> {
    fn record(&mut self, name: &str, value: f64, step: u64) -> Ge2eResult<()> {
        let record = MetricRecord::now(name, value, step);
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Fans out every record to several sinks, stopping at the first failure.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink + Send>>,
}

impl std::fmt::Debug for MultiSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl MetricsSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl MetricsSink for MultiSink {
    fn record(&mut self, name: &str, value: f64, step: u64) -> Ge2eResult<()> {
        for sink in &mut self.sinks {
            sink.record(name, value, step)?;
        }
        Ok(())
    }
}
