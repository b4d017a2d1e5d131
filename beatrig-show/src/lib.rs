//! Show control for beatrig
//!
//! This crate turns analysis results into lighting:
//! - Scenario: the graph of lighting presets and their legal transitions
//! - Director: per-block scenario choice, transient effects and smoke
//! - Dimmer: VU-driven overhead dimmer pushed from the DMX sender thread
//! - Genre: background classification tagged with epoch tokens
//! - Worker: the bounded audio queue and the analysis thread
//! - Show: startup and ordered shutdown of all of the above

mod dimmer;
mod director;
mod error;
mod genre;
mod resample;
mod scenario;
mod show;
mod worker;

pub use dimmer::{
    vu_to_level, DimmerSignal, VuDimmer, DIMMER_CEILING, DIMMER_FLOOR, PULSE_THRESHOLD, SMOOTHING,
    VU_FULL,
};
pub use director::{ClassificationStatus, DirectorConfig, ScenarioDirector, ShowRuntimeState};
pub use error::{ClassifyError, ShowError};
pub use genre::{
    ClassifyOutcome, EpochToken, GenreClassifier, GenreService, Generation, CLASSIFIER_SAMPLE_RATE,
};
pub use resample::{resample_mono, ResampleError};
pub use scenario::{
    EventKind, Scenario, ScenarioGraph, ScenarioKind, SmokeCadence, TransientEffect,
};
pub use show::Show;
pub use worker::{
    audio_queue, AnalysisWorker, AudioBlock, AudioReceiver, AudioSender, QUEUE_CAPACITY,
};
