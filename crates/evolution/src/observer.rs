//! Per-generation progress reporting.

use salesman_core::GenerationRecord;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Receives one call per generation, generation 0 included.
///
/// Called inline from the engine, so implementations must return promptly.
pub trait ProgressObserver: Send {
    /// A generation finished.
    fn on_generation(&mut self, record: &GenerationRecord, total_generations: usize);
}

/// Logs generation statistics through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    interval: usize,
}

impl LoggingObserver {
    /// Log every generation.
    pub fn new() -> Self {
        Self { interval: 1 }
    }

    /// Log every `interval`-th generation plus the last one.
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for LoggingObserver {
    fn on_generation(&mut self, record: &GenerationRecord, total_generations: usize) {
        if record.generation % self.interval != 0 && record.generation != total_generations {
            return;
        }
        info!(
            "Generation {}/{}: best={:.2} worst={:.2} mean={:.2} std={:.2} unfit={}",
            record.generation,
            total_generations,
            record.best,
            record.worst,
            record.mean,
            record.stddev,
            record.unfit
        );
    }
}

/// A generation record plus the run length, as sent by [`ChannelObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Statistics for the generation
    pub record: GenerationRecord,
    /// Generations in the run, excluding generation 0
    pub total_generations: usize,
}

/// Forwards records to an unbounded channel. Never blocks the engine.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver its events arrive on.
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_generation(&mut self, record: &GenerationRecord, total_generations: usize) {
        let event = ProgressEvent {
            record: *record,
            total_generations,
        };
        if self.tx.send(event).is_err() {
            debug!("Progress receiver dropped, generation {} not forwarded", record.generation);
        }
    }
}
