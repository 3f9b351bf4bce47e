//! Batch pipeline scheduling tests over an in-memory frame source

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use vectorlink_analyser::{Batch, BatchHandler, Pipeline, PipelineConfig, PipelineError};
use vectorlink_network::{FrameSource, TransportError};

/// Frames numbered 0..n, yielding to the scheduler on every read like a socket
struct MemorySource {
    frames: VecDeque<Bytes>,
}

impl MemorySource {
    fn numbered(n: u64) -> Arc<Mutex<Self>> {
        let frames = (0..n)
            .map(|i| Bytes::copy_from_slice(&i.to_le_bytes()))
            .collect();
        Arc::new(Mutex::new(Self { frames }))
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> vectorlink_network::Result<Bytes> {
        tokio::task::yield_now().await;
        self.frames
            .pop_front()
            .ok_or(TransportError::ConnectionClosed {
                peer: None,
                buffered: 0,
            })
    }
}

fn frame_number(frame: &Bytes) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(frame);
    u64::from_le_bytes(raw)
}

/// Records every batch, optionally slowly, optionally failing chosen indices
#[derive(Default)]
struct Recorder {
    batches: SyncMutex<Vec<Batch>>,
    delay: Duration,
    fail_index: Option<usize>,
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl BatchHandler for Recorder {
    async fn handle(&self, batch: &Batch) -> Result<(), PipelineError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.batches.lock().push(batch.clone());
        self.finished.fetch_add(1, Ordering::SeqCst);

        if self.fail_index == Some(batch.index) {
            return Err(PipelineError::Handler {
                producer: batch.producer,
                batch: batch.index,
                message: "rejected".to_string(),
            });
        }
        Ok(())
    }
}

fn config(producers: usize, consumers: usize, batches: usize, batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        producers,
        consumers,
        batch_size,
        batches_per_producer: batches,
        queue_capacity: 32,
        consumer_pacing: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_every_frame_lands_in_exactly_one_batch() {
    let source = MemorySource::numbered(50);
    let recorder = Arc::new(Recorder::default());

    let report = Pipeline::new(config(1, 4, 5, 10))
        .unwrap()
        .run(source.clone(), recorder.clone())
        .await
        .into_result()
        .unwrap();

    assert_eq!(report.frames_received, 50);
    assert_eq!(report.batches_produced, 5);
    assert_eq!(report.batches_consumed, 5);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(report.rates.len(), 5);
    assert!(report.rates.iter().all(|r| *r > 0.0));

    let batches = recorder.batches.lock();
    let indices: HashSet<usize> = batches.iter().map(|b| b.index).collect();
    assert_eq!(indices, (0..5).collect());

    let mut numbers: Vec<u64> = batches
        .iter()
        .flat_map(|b| b.frames.iter().map(frame_number))
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (0..50).collect::<Vec<_>>());
    assert!(source.lock().await.frames.is_empty());
}

#[tokio::test]
async fn test_batches_are_contiguous_with_several_producers() {
    let source = MemorySource::numbered(120);
    let recorder = Arc::new(Recorder::default());

    let report = Pipeline::new(config(3, 2, 4, 10))
        .unwrap()
        .run(source, recorder.clone())
        .await
        .into_result()
        .unwrap();

    assert_eq!(report.frames_received, 120);
    assert_eq!(report.batches_consumed, 12);

    for batch in recorder.batches.lock().iter() {
        let numbers: Vec<u64> = batch.frames.iter().map(frame_number).collect();
        let first = numbers[0];
        assert_eq!(numbers, (first..first + 10).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_small_queue_applies_backpressure_without_loss() {
    let source = MemorySource::numbered(40);
    let recorder = Arc::new(Recorder {
        delay: Duration::from_millis(5),
        ..Default::default()
    });
    let mut config = config(1, 1, 8, 5);
    config.queue_capacity = 1;

    let report = Pipeline::new(config)
        .unwrap()
        .run(source, recorder.clone())
        .await
        .into_result()
        .unwrap();

    assert_eq!(report.batches_consumed, 8);
    // One consumer dequeues in FIFO order
    let order: Vec<usize> = recorder.batches.lock().iter().map(|b| b.index).collect();
    assert_eq!(order, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_handler_failures_are_counted_not_fatal() {
    let source = MemorySource::numbered(50);
    let recorder = Arc::new(Recorder {
        fail_index: Some(2),
        ..Default::default()
    });

    let report = Pipeline::new(config(1, 4, 5, 10))
        .unwrap()
        .run(source, recorder)
        .await
        .into_result()
        .unwrap();

    assert_eq!(report.batches_consumed, 4);
    assert_eq!(report.failed_batches, 1);
}

#[tokio::test]
async fn test_producer_failure_cancels_and_in_flight_batches_complete() {
    // Enough frames for two batches; the third fails mid-way
    let source = MemorySource::numbered(25);
    let recorder = Arc::new(Recorder {
        delay: Duration::from_millis(100),
        ..Default::default()
    });

    let run = Pipeline::new(config(1, 4, 5, 10))
        .unwrap()
        .run(source, recorder.clone())
        .await;

    assert!(!run.is_complete());
    match &run.error {
        Some(PipelineError::Producer {
            producer, batch, source,
        }) => {
            assert_eq!(*producer, 0);
            assert_eq!(*batch, 2);
            assert!(source.is_disconnect());
        }
        other => panic!("expected producer failure, got {:?}", other),
    }

    let started = recorder.started.load(Ordering::SeqCst);
    let finished = recorder.finished.load(Ordering::SeqCst);
    assert_eq!(started, finished);
    assert!(started <= 2);
}

#[tokio::test]
async fn test_queued_batches_survive_producer_failure() {
    // One slow consumer leaves the second batch queued when the producer fails
    let source = MemorySource::numbered(25);
    let recorder = Arc::new(Recorder {
        delay: Duration::from_millis(100),
        ..Default::default()
    });

    let run = Pipeline::new(config(1, 1, 10, 10))
        .unwrap()
        .run(source, recorder.clone())
        .await;

    assert!(matches!(
        run.error,
        Some(PipelineError::Producer { batch: 2, .. })
    ));
    assert_eq!(run.report.batches_produced, 2);
    assert_eq!(run.report.batches_consumed, 2);
    assert_eq!(run.report.discarded_frames, 5);
    assert_eq!(run.report.rates.len(), 2);
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 2);

    let order: Vec<usize> = recorder.batches.lock().iter().map(|b| b.index).collect();
    assert_eq!(order, vec![0, 1]);
    assert!(run.into_result().is_err());
}

#[tokio::test]
async fn test_no_dequeue_after_drain() {
    let source = MemorySource::numbered(30);
    let recorder = Arc::new(Recorder::default());
    let pipeline = Pipeline::new(config(1, 4, 3, 10)).unwrap();

    let report = pipeline
        .run(source, recorder.clone())
        .await
        .into_result()
        .unwrap();

    // Consumers have all returned, so the handled count is final
    assert_eq!(report.batches_consumed, 3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.started.load(Ordering::SeqCst), 3);
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 3);
}
