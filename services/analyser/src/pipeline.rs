//! Batch Pipeline
//!
//! Producers pull frames from a shared [`FrameSource`], assemble them into
//! fixed-size [`Batch`]es and push them through a bounded [`BatchQueue`];
//! consumers dequeue and hand each batch to a [`BatchHandler`].
//!
//! ## Scheduling
//!
//! Everything is cooperative. Tasks suspend on socket reads, on queue
//! put/get and on the consumer pacing sleep. A producer holds the frame
//! source for a whole batch so each batch is a contiguous run of frames.
//!
//! ## Termination
//!
//! 1. All producers finish their batches
//! 2. The queue drains: every enqueued batch is marked done
//! 3. Consumers are cancelled
//!
//! Cancellation is only observed when a consumer is about to dequeue or is
//! pacing, so a dequeued batch is always handled and marked done. A failed
//! producer stops the other producers and loses only its partial batch;
//! complete batches already queued are still drained before cancellation.

use crate::error::PipelineError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vectorlink_config::AnalyserSettings;
use vectorlink_network::FrameSource;

/// Shortest elapsed time used when computing a batch rate
const MIN_BATCH_SECS: f64 = 1e-9;

/// Pipeline shape and pacing
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub producers: usize,
    pub consumers: usize,
    /// Frames per batch
    pub batch_size: usize,
    pub batches_per_producer: usize,
    pub queue_capacity: usize,
    /// Consumer pause after each handled batch
    pub consumer_pacing: Duration,
}

impl PipelineConfig {
    pub fn from_settings(settings: &AnalyserSettings) -> Self {
        Self {
            producers: settings.producers,
            consumers: settings.consumers,
            batch_size: settings.batch_size,
            batches_per_producer: settings.batches_per_producer(),
            queue_capacity: settings.queue_capacity,
            consumer_pacing: settings.consumer_pacing(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.producers == 0 || self.consumers == 0 {
            return Err(PipelineError::configuration(
                "pipeline needs at least one producer and one consumer",
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::configuration("batch size must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::configuration("queue capacity must be at least 1"));
        }
        Ok(())
    }

    pub fn total_frames(&self) -> usize {
        self.producers * self.batches_per_producer * self.batch_size
    }
}

/// Frames received back-to-back by one producer
#[derive(Debug, Clone)]
pub struct Batch {
    pub producer: usize,
    /// Position in the producer's output, starting at 0
    pub index: usize,
    pub frames: Vec<Bytes>,
    /// Frames per second while this batch was received
    pub rate_hz: f64,
}

/// Work done with each dequeued batch
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &Batch) -> Result<(), PipelineError>;
}

/// Bounded multi-producer multi-consumer queue with completion tracking
///
/// Mirrors a task queue: [`put`](Self::put) counts an item as unfinished,
/// [`task_done`](Self::task_done) retires it and [`join`](Self::join) waits
/// until nothing is unfinished.
#[derive(Clone)]
pub struct BatchQueue {
    tx: mpsc::Sender<Batch>,
    rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    unfinished: Arc<watch::Sender<usize>>,
}

impl BatchQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (unfinished, _) = watch::channel(0);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            unfinished: Arc::new(unfinished),
        }
    }

    /// Enqueue, suspending while the queue is full
    ///
    /// Cancel safe: a put abandoned while waiting for space leaves no trace.
    pub async fn put(&self, batch: Batch) -> Result<(), PipelineError> {
        let permit = self.tx.reserve().await.map_err(|_| PipelineError::Task {
            task: "queue".to_string(),
            message: "batch queue closed".to_string(),
        })?;
        self.unfinished.send_modify(|n| *n += 1);
        permit.send(batch);
        Ok(())
    }

    /// Dequeue, suspending while the queue is empty
    ///
    /// Cancel safe: an abandoned get never removes an item.
    pub async fn get(&self) -> Option<Batch> {
        self.rx.lock().await.recv().await
    }

    /// Mark one dequeued batch as fully processed
    pub fn task_done(&self) {
        self.unfinished.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Wait until every enqueued batch has been marked done
    pub async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Batches enqueued but not yet marked done
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }
}

/// Pipeline outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub frames_received: u64,
    pub batches_produced: u64,
    /// Batches handled successfully
    pub batches_consumed: u64,
    /// Batches whose handler returned an error
    pub failed_batches: u64,
    /// Frames of partial batches abandoned when a producer failed
    pub discarded_frames: u64,
    /// Per-batch receive rates, grouped by producer in production order
    pub rates: Vec<f64>,
}

/// Counts of a pipeline run plus the error that stopped it early, if any
#[derive(Debug)]
pub struct PipelineRun {
    pub report: PipelineReport,
    pub error: Option<PipelineError>,
}

impl PipelineRun {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<PipelineReport, PipelineError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }
}

#[derive(Debug, Default)]
struct ProducerOutcome {
    producer: usize,
    frames: u64,
    batches: u64,
    discarded_frames: u64,
    rates: Vec<f64>,
    error: Option<PipelineError>,
}

#[derive(Debug, Default)]
struct ConsumerOutcome {
    handled: u64,
    failed: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run producers and consumers to completion
    ///
    /// The caller keeps its handle on `source` so it can close the link
    /// afterwards. A producer error stops the other producers and discards
    /// the failing producer's partial batch. Batches already queued are still
    /// handled before consumers are cancelled, so the returned [`PipelineRun`]
    /// always accounts for every complete batch.
    pub async fn run<S, H>(&self, source: Arc<Mutex<S>>, handler: Arc<H>) -> PipelineRun
    where
        S: FrameSource + 'static,
        H: BatchHandler + 'static,
    {
        let config = &self.config;
        let queue = BatchQueue::new(config.queue_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!(
            producers = config.producers,
            consumers = config.consumers,
            batch_size = config.batch_size,
            batches_per_producer = config.batches_per_producer,
            "Starting batch pipeline"
        );

        let mut consumers = JoinSet::new();
        for id in 0..config.consumers {
            consumers.spawn(consume(
                id,
                queue.clone(),
                handler.clone(),
                cancel_rx.clone(),
                config.consumer_pacing,
            ));
        }

        let mut producers = JoinSet::new();
        for id in 0..config.producers {
            producers.spawn(produce(
                id,
                source.clone(),
                queue.clone(),
                config.batch_size,
                config.batches_per_producer,
                stop_rx.clone(),
            ));
        }

        let mut report = PipelineReport::default();
        let mut outcomes = Vec::with_capacity(config.producers);
        let mut failure: Option<PipelineError> = None;

        while let Some(joined) = producers.join_next().await {
            let mut outcome = joined.unwrap_or_else(|e| ProducerOutcome {
                error: Some(PipelineError::Task {
                    task: "producer".to_string(),
                    message: e.to_string(),
                }),
                ..Default::default()
            });
            if let Some(e) = outcome.error.take() {
                error!(category = e.category(), "Producer failed: {}", e);
                let _ = stop_tx.send(true);
                failure.get_or_insert(e);
            }
            outcomes.push(outcome);
        }

        // Complete batches are handled even after a producer failure
        queue.join().await;
        debug!("Batch queue drained");
        let _ = cancel_tx.send(true);

        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.batches_consumed += outcome.handled;
                    report.failed_batches += outcome.failed;
                }
                Err(e) => {
                    let e = PipelineError::Task {
                        task: "consumer".to_string(),
                        message: e.to_string(),
                    };
                    error!("{}", e);
                    failure.get_or_insert(e);
                }
            }
        }

        outcomes.sort_by_key(|o| o.producer);
        for outcome in outcomes {
            report.frames_received += outcome.frames;
            report.batches_produced += outcome.batches;
            report.discarded_frames += outcome.discarded_frames;
            report.rates.extend(outcome.rates);
        }

        if failure.is_some() {
            warn!(
                batches = report.batches_produced,
                consumed = report.batches_consumed,
                discarded_frames = report.discarded_frames,
                "Batch pipeline stopped early"
            );
        } else {
            info!(
                frames = report.frames_received,
                batches = report.batches_produced,
                consumed = report.batches_consumed,
                failed = report.failed_batches,
                "Batch pipeline finished"
            );
        }

        PipelineRun {
            report,
            error: failure,
        }
    }
}

/// Resolve once cancellation is requested or the pipeline is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn produce<S>(
    id: usize,
    source: Arc<Mutex<S>>,
    queue: BatchQueue,
    batch_size: usize,
    batches: usize,
    mut stop: watch::Receiver<bool>,
) -> ProducerOutcome
where
    S: FrameSource,
{
    let mut outcome = ProducerOutcome {
        producer: id,
        rates: Vec::with_capacity(batches),
        ..Default::default()
    };

    for index in 0..batches {
        let started = Instant::now();
        let mut frames = Vec::with_capacity(batch_size);
        let dropped = {
            let mut reader = tokio::select! {
                biased;
                _ = cancelled(&mut stop) => break,
                reader = source.lock() => reader,
            };
            for _ in 0..batch_size {
                match reader.next_frame().await {
                    Ok(frame) => frames.push(frame),
                    Err(err) => {
                        warn!(
                            producer = id,
                            batch = index,
                            frames = frames.len(),
                            "Discarding partial batch"
                        );
                        outcome.discarded_frames += frames.len() as u64;
                        outcome.error = Some(PipelineError::Producer {
                            producer: id,
                            batch: index,
                            source: err,
                        });
                        return outcome;
                    }
                }
            }
            reader.take_drop_report()
        };

        let elapsed = started.elapsed().as_secs_f64().max(MIN_BATCH_SECS);
        let rate_hz = batch_size as f64 / elapsed;
        info!(
            producer = id,
            batch = index,
            dropped,
            "Receive frequency is {:.2}[Hz]",
            rate_hz
        );

        let batch = Batch {
            producer: id,
            index,
            frames,
            rate_hz,
        };
        tokio::select! {
            biased;
            _ = cancelled(&mut stop) => break,
            put = queue.put(batch) => {
                if let Err(e) = put {
                    outcome.error = Some(e);
                    return outcome;
                }
            }
        }

        outcome.frames += batch_size as u64;
        outcome.batches += 1;
        outcome.rates.push(rate_hz);
    }

    debug!(producer = id, batches = outcome.batches, "Producer finished");
    outcome
}

async fn consume<H>(
    id: usize,
    queue: BatchQueue,
    handler: Arc<H>,
    mut cancel: watch::Receiver<bool>,
    pacing: Duration,
) -> ConsumerOutcome
where
    H: BatchHandler,
{
    let mut outcome = ConsumerOutcome::default();

    loop {
        let batch = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            batch = queue.get() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        match handler.handle(&batch).await {
            Ok(()) => outcome.handled += 1,
            Err(e) => {
                outcome.failed += 1;
                warn!(
                    consumer = id,
                    producer = batch.producer,
                    batch = batch.index,
                    "Batch handler failed: {}",
                    e
                );
            }
        }
        queue.task_done();

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = tokio::time::sleep(pacing) => {}
        }
    }

    debug!(consumer = id, handled = outcome.handled, "Consumer stopped");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    fn batch(index: usize) -> Batch {
        Batch {
            producer: 0,
            index,
            frames: vec![Bytes::from_static(b"x")],
            rate_hz: 1.0,
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: SyncMutex<Vec<usize>>,
    }

    #[async_trait]
    impl BatchHandler for Recorder {
        async fn handle(&self, batch: &Batch) -> Result<(), PipelineError> {
            self.seen.lock().push(batch.index);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_queue_join_waits_for_task_done() {
        let queue = BatchQueue::new(4);
        queue.put(batch(0)).await.unwrap();
        queue.put(batch(1)).await.unwrap();
        assert_eq!(queue.unfinished(), 2);

        assert_eq!(queue.get().await.unwrap().index, 0);
        queue.task_done();
        assert_eq!(queue.unfinished(), 1);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.join().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert_eq!(queue.get().await.unwrap().index, 1);
        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_suspends_put() {
        let queue = BatchQueue::new(1);
        queue.put(batch(0)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.put(batch(1))).await;
        assert!(blocked.is_err());
        // The abandoned put must not count as unfinished
        assert_eq!(queue.unfinished(), 1);

        queue.get().await.unwrap();
        queue.put(batch(1)).await.unwrap();
        assert_eq!(queue.unfinished(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_consumer_does_not_dequeue() {
        let queue = BatchQueue::new(4);
        queue.put(batch(7)).await.unwrap();

        let (cancel_tx, cancel_rx) = watch::channel(true);
        let recorder = Arc::new(Recorder::default());
        let outcome = consume(0, queue.clone(), recorder.clone(), cancel_rx, Duration::ZERO).await;
        drop(cancel_tx);

        assert_eq!(outcome.handled, 0);
        assert!(recorder.seen.lock().is_empty());
        assert_eq!(queue.unfinished(), 1);
        assert_eq!(queue.get().await.unwrap().index, 7);
    }

    #[tokio::test]
    async fn test_consumer_finishes_batch_then_stops_at_pacing() {
        let queue = BatchQueue::new(4);
        queue.put(batch(0)).await.unwrap();
        queue.put(batch(1)).await.unwrap();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let recorder = Arc::new(Recorder::default());
        let consumer = tokio::spawn(consume(
            0,
            queue.clone(),
            recorder.clone(),
            cancel_rx,
            Duration::from_secs(60),
        ));

        // Let it handle the first batch and enter the pacing sleep
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_tx.send(true).unwrap();
        let outcome = consumer.await.unwrap();

        assert_eq!(outcome.handled, 1);
        assert_eq!(*recorder.seen.lock(), vec![0]);
        assert_eq!(queue.unfinished(), 1);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig {
            producers: 1,
            consumers: 4,
            batch_size: 10,
            batches_per_producer: 5,
            queue_capacity: 32,
            consumer_pacing: Duration::from_millis(100),
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.total_frames(), 50);

        config.queue_capacity = 0;
        assert!(Pipeline::new(config.clone()).is_err());

        config.queue_capacity = 1;
        config.consumers = 0;
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = AnalyserSettings::default();
        let config = PipelineConfig::from_settings(&settings);
        assert_eq!(config.producers, 1);
        assert_eq!(config.consumers, 4);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batches_per_producer, 200);
        assert_eq!(config.consumer_pacing, Duration::from_millis(100));
    }
}
