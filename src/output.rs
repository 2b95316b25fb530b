//! # Output Lifecycle
//!
//! Wires the aggregation engine into a running test:
//!
//! 1. Producers push samples into a shared [`SampleBuffer`] from any thread.
//! 2. A [`PeriodicFlusher`] drains the buffer at a fixed interval and hands
//!    the samples to the [`Aggregator`], which routes them into the series
//!    collection.
//! 3. [`SummaryOutput::stop`] stops the flusher, performs one final flush and
//!    builds the end-of-test [`Report`].
//!
//! ## Locking
//!
//! The buffer lock is only held to push or to swap the pending vector out.
//! Ingestion and report building both happen under the aggregator lock, so a
//! report never observes a half-ingested batch.

use crate::config::SummaryConfig;
use crate::error::{IngestError, OutputError, ReportError};
use crate::metric::Sample;
use crate::report::{Report, ReportBuilder};
use crate::series::Collection;
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Samples waiting for the next flush.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    pending: Mutex<Vec<Sample>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: Sample) {
        self.pending.lock().push(sample);
    }

    pub fn extend<I: IntoIterator<Item = Sample>>(&self, samples: I) {
        self.pending.lock().extend(samples);
    }

    /// Take every pending sample, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Sample> {
        mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// The series collection plus the bookkeeping of rejected samples.
#[derive(Debug)]
pub struct Aggregator {
    collection: Collection,
    builder: ReportBuilder,
    dropped: u64,
}

impl Aggregator {
    pub fn new(collection: Collection, builder: ReportBuilder) -> Self {
        Self {
            collection,
            builder,
            dropped: 0,
        }
    }

    /// Route a batch of samples into the collection.
    ///
    /// Rejected samples are counted and skipped; the rest of the batch is
    /// still ingested. Returns the number of accepted samples.
    pub fn ingest(&mut self, samples: Vec<Sample>) -> usize {
        let total = samples.len();
        let mut rejected: u64 = 0;
        let mut first_error: Option<IngestError> = None;

        for sample in &samples {
            if let Err(e) = self.collection.add_sample(sample) {
                rejected += 1;
                debug!("Dropping sample: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            warn!(
                "Dropped {} of {} samples in this flush (first error: {})",
                rejected, total, e
            );
        }
        self.dropped += rejected;
        total - rejected as usize
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    /// Build a report of everything ingested so far.
    pub fn report(&self, elapsed: Duration) -> Result<Report, ReportError> {
        let mut report = self.builder.build(&self.collection, elapsed)?;
        report.dropped_samples = self.dropped;
        Ok(report)
    }
}

/// Background task invoking a flush callback at a fixed interval.
#[derive(Debug)]
pub struct PeriodicFlusher {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicFlusher {
    /// Spawn the flusher on the current tokio runtime.
    pub fn start<F>(period: Duration, mut flush: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => flush(),
                    _ = stopped.changed() => break,
                }
            }

            // samples pushed between the last tick and the stop signal
            flush();
        });

        Self { stop, handle }
    }

    /// Signal the task and wait for its final flush.
    pub async fn stop(self) -> Result<(), JoinError> {
        // the task may already be gone; joining reports why
        let _ = self.stop.send(true);
        self.handle.await
    }
}

/// End-of-test summary output.
///
/// Owns the sample buffer, the aggregator and the flusher task for one run.
#[derive(Debug)]
pub struct SummaryOutput {
    buffer: Arc<SampleBuffer>,
    aggregator: Arc<Mutex<Aggregator>>,
    flush_interval: Duration,
    flusher: Option<PeriodicFlusher>,
    started: Option<Instant>,
}

impl SummaryOutput {
    pub fn new(config: &SummaryConfig) -> Self {
        let collection = Collection::new(config.trend_factory.clone(), config.retained_labels.clone());
        let builder =
            ReportBuilder::new(config.trend_stats.clone()).with_filter(config.filter.clone());

        Self {
            buffer: Arc::new(SampleBuffer::new()),
            aggregator: Arc::new(Mutex::new(Aggregator::new(collection, builder))),
            flush_interval: config.flush_interval,
            flusher: None,
            started: None,
        }
    }

    /// Start the periodic flusher. Must be called from a tokio runtime.
    pub fn start(&mut self) {
        if self.flusher.is_some() {
            warn!("Summary output already started");
            return;
        }

        let buffer = Arc::clone(&self.buffer);
        let aggregator = Arc::clone(&self.aggregator);
        self.flusher = Some(PeriodicFlusher::start(self.flush_interval, move || {
            flush_into(&buffer, &aggregator);
        }));
        self.started = Some(Instant::now());
        info!(
            "Summary output started (flush interval {:?})",
            self.flush_interval
        );
    }

    /// Shared handle producers push samples into.
    pub fn buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Flush pending samples right away. Returns the number accepted.
    pub fn flush(&self) -> usize {
        flush_into(&self.buffer, &self.aggregator)
    }

    /// Time since [`SummaryOutput::start`], zero before it.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Report of everything flushed so far, without stopping.
    pub fn snapshot(&self) -> Result<Report, ReportError> {
        self.aggregator.lock().report(self.elapsed())
    }

    /// Stop flushing, ingest what is left and build the final report.
    pub async fn stop(mut self) -> Result<Report, OutputError> {
        if let Some(flusher) = self.flusher.take() {
            flusher.stop().await?;
        }
        self.flush();

        let elapsed = self.elapsed();
        let report = self.aggregator.lock().report(elapsed)?;
        info!(
            "Summary output stopped after {:?}: {} metrics, {} dropped samples",
            elapsed,
            report.len(),
            report.dropped_samples
        );
        Ok(report)
    }
}

fn flush_into(buffer: &SampleBuffer, aggregator: &Mutex<Aggregator>) -> usize {
    let samples = buffer.drain();
    if samples.is_empty() {
        return 0;
    }
    let count = samples.len();
    let accepted = aggregator.lock().ingest(samples);
    debug!("Flushed {} samples ({} accepted)", count, accepted);
    accepted
}
