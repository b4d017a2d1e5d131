//! Audio analysis for beatrig
//!
//! Turns blocks of microphone samples into beats, BPM, section flags
//! (chorus, crescendo, drum solo), drum hits and the song lifecycle state.

mod debounce;
mod detector;
mod features;
mod hpss;
mod onset;
mod song_state;
mod spectrum;
mod tempo;
mod tuning;

pub use debounce::DebouncedFlag;
pub use detector::{BeatDetector, DetectionResult, DetectorConfig};
pub use features::{BlockFeatures, FeatureExtractor, TUNING_PERIOD};
pub use hpss::{Hpss, HpssEnergy};
pub use onset::{OnsetDetector, OnsetFrame};
pub use song_state::{SongState, SongStateConfig, SongStateMachine, StateTransitions};
pub use spectrum::{centroid, flatness, rms, BlockSpectrum};
pub use tempo::{BpmEstimator, TempoTracker};
pub use tuning::{Thresholds, TuningStore};
