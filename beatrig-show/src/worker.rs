//! Audio queue and the analysis worker thread

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use beatrig_analysis::BeatDetector;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::director::ScenarioDirector;
use crate::error::ShowError;

/// Blocks the input may run ahead of the worker
pub const QUEUE_CAPACITY: usize = 20;

/// Sample buffers kept for reuse by the input
const SPARE_BUFFERS: usize = QUEUE_CAPACITY + 4;

/// How often the worker checks for shutdown while idle
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One block of mono input
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    /// Seconds since the show started
    pub timestamp: f64,
}

/// Producer side of the audio queue, safe to use from an audio callback
#[derive(Clone)]
pub struct AudioSender {
    tx: Sender<AudioBlock>,
    spare_tx: Sender<Vec<f32>>,
    spare_rx: Receiver<Vec<f32>>,
    dropped: Arc<AtomicU64>,
    accepting: Arc<AtomicBool>,
}

impl AudioSender {
    /// Queue a block without blocking. Returns false if it was dropped.
    pub fn push(&self, block: AudioBlock) -> bool {
        if !self.accepting.load(Ordering::Relaxed) {
            self.recycle(block.samples);
            return false;
        }
        match self.tx.try_send(block) {
            Ok(()) => true,
            Err(TrySendError::Full(block)) | Err(TrySendError::Disconnected(block)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.recycle(block.samples);
                false
            }
        }
    }

    /// An empty buffer for the next block, reused when one is spare
    pub fn spare_buffer(&self, capacity: usize) -> Vec<f32> {
        match self.spare_rx.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer
            }
            Err(_) => Vec::with_capacity(capacity),
        }
    }

    fn recycle(&self, buffer: Vec<f32>) {
        let _ = self.spare_tx.try_send(buffer);
    }

    /// Blocks dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Blocks waiting for the worker
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    /// Refuse every further block
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }
}

/// Consumer side of the audio queue
pub struct AudioReceiver {
    rx: Receiver<AudioBlock>,
    spare_tx: Sender<Vec<f32>>,
}

impl AudioReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<AudioBlock, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<AudioBlock> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Hand a processed block's buffer back to the input
    pub fn recycle(&self, samples: Vec<f32>) {
        let _ = self.spare_tx.try_send(samples);
    }
}

/// Bounded queue between the audio input and the worker
pub fn audio_queue() -> (AudioSender, AudioReceiver) {
    let (tx, rx) = bounded(QUEUE_CAPACITY);
    let (spare_tx, spare_rx) = bounded(SPARE_BUFFERS);
    let sender = AudioSender {
        tx,
        spare_tx: spare_tx.clone(),
        spare_rx,
        dropped: Arc::new(AtomicU64::new(0)),
        accepting: Arc::new(AtomicBool::new(true)),
    };
    (sender, AudioReceiver { rx, spare_tx })
}

/// Thread running detection and direction for every queued block
pub struct AnalysisWorker {
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    pub fn spawn(
        mut detector: BeatDetector,
        mut director: ScenarioDirector,
        rx: AudioReceiver,
    ) -> Result<Self, ShowError> {
        let running = Arc::new(AtomicBool::new(true));
        let processed = Arc::new(AtomicU64::new(0));
        let thread_running = running.clone();
        let thread_processed = processed.clone();

        let thread = thread::Builder::new()
            .name("analysis-worker".to_string())
            .spawn(move || {
                while thread_running.load(Ordering::Relaxed) {
                    let block = match rx.recv_timeout(POLL_INTERVAL) {
                        Ok(block) => block,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    let result = detector.process(&block.samples, block.timestamp);
                    director.process(&block.samples, &result, block.timestamp);
                    rx.recycle(block.samples);
                    thread_processed.fetch_add(1, Ordering::Relaxed);
                }
                tracing::info!(
                    blocks = thread_processed.load(Ordering::Relaxed),
                    rejected_states = detector.song().rejected_transitions(),
                    rejected_scenarios = director.state().illegal_transitions,
                    "analysis worker stopped"
                );
            })
            .map_err(|source| ShowError::Spawn {
                name: "analysis-worker",
                source,
            })?;

        Ok(Self {
            running,
            processed,
            thread: Some(thread),
        })
    }

    pub fn blocks_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Clear the running flag and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("analysis worker panicked");
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
