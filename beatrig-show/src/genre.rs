//! Background genre classification
//!
//! Each request runs on its own thread and is tagged with the song it was
//! made for and an [`EpochToken`]. Cancelling advances the generation so
//! in-flight work skips the classifier and never reports back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{ClassifyError, ShowError};
use crate::resample::resample_mono;

/// Rate the classifier expects its input at
pub const CLASSIFIER_SAMPLE_RATE: u32 = 16_000;

/// An opaque genre model.
///
/// Returns a genre label such as `"rock"`, or an empty string when it is not
/// confident.
pub trait GenreClassifier: Send + Sync {
    fn classify(&self, samples: &[f32], sample_rate: u32) -> Result<String, ClassifyError>;
}

/// Shared generation counter
#[derive(Debug, Clone, Default)]
pub struct Generation {
    counter: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every token handed out so far
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> EpochToken {
        EpochToken {
            epoch: self.current(),
            generation: self.clone(),
        }
    }
}

/// Tag of a background task; stale once its generation moved on
#[derive(Debug, Clone)]
pub struct EpochToken {
    epoch: u64,
    generation: Generation,
}

impl EpochToken {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self) -> bool {
        self.generation.current() == self.epoch
    }
}

/// Result of one classification attempt
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub song_id: u64,
    pub result: Result<String, ClassifyError>,
}

/// Runs classification requests and collects their outcomes
pub struct GenreService {
    classifier: Arc<dyn GenreClassifier>,
    generation: Generation,
    outcome_tx: Sender<ClassifyOutcome>,
    outcome_rx: Receiver<ClassifyOutcome>,
}

impl GenreService {
    pub fn new(classifier: Arc<dyn GenreClassifier>) -> Self {
        let (outcome_tx, outcome_rx) = bounded(16);
        Self {
            classifier,
            generation: Generation::new(),
            outcome_tx,
            outcome_rx,
        }
    }

    /// Classify `samples` for `song_id` on a new thread
    pub fn request(
        &self,
        song_id: u64,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<EpochToken, ShowError> {
        let token = self.generation.token();
        let task_token = token.clone();
        let classifier = self.classifier.clone();
        let tx = self.outcome_tx.clone();

        thread::Builder::new()
            .name("genre-classifier".to_string())
            .spawn(move || {
                let result = classify_at_model_rate(&*classifier, &samples, sample_rate, &task_token);
                let Some(result) = result else {
                    tracing::debug!(song_id, "classification cancelled");
                    return;
                };
                if !task_token.is_current() {
                    tracing::debug!(song_id, "dropping stale classification");
                    return;
                }
                if tx.try_send(ClassifyOutcome { song_id, result }).is_err() {
                    tracing::debug!(song_id, "classification outcome dropped");
                }
            })
            .map_err(|source| ShowError::Spawn {
                name: "genre-classifier",
                source,
            })?;

        tracing::debug!(song_id, epoch = token.epoch(), "classification requested");
        Ok(token)
    }

    /// Make every in-flight request stale
    pub fn cancel_pending(&self) {
        self.generation.advance();
    }

    /// Next finished outcome, if any
    pub fn try_recv(&self) -> Option<ClassifyOutcome> {
        self.outcome_rx.try_recv().ok()
    }

    /// All finished outcomes
    pub fn drain(&self) -> Vec<ClassifyOutcome> {
        self.outcome_rx.try_iter().collect()
    }

    /// Queue an outcome as if a request had finished
    #[cfg(test)]
    pub(crate) fn deliver(&self, outcome: ClassifyOutcome) {
        let _ = self.outcome_tx.try_send(outcome);
    }
}

/// None when the token went stale before the classifier ran
fn classify_at_model_rate(
    classifier: &dyn GenreClassifier,
    samples: &[f32],
    sample_rate: u32,
    token: &EpochToken,
) -> Option<Result<String, ClassifyError>> {
    if samples.is_empty() {
        return Some(Err(ClassifyError::NoAudio));
    }
    let input = match resample_mono(samples, sample_rate, CLASSIFIER_SAMPLE_RATE) {
        Ok(input) => input,
        Err(e) => return Some(Err(ClassifyError::Resample(e.to_string()))),
    };
    if !token.is_current() {
        return None;
    }
    Some(classifier.classify(&input, CLASSIFIER_SAMPLE_RATE))
}
