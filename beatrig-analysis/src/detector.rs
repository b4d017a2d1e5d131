//! Per-block analysis pipeline
//!
//! [`BeatDetector`] owns every piece of cross-block analysis state and turns
//! one block of samples into a [`DetectionResult`].

use crate::debounce::DebouncedFlag;
use crate::features::FeatureExtractor;
use crate::onset::OnsetDetector;
use crate::song_state::{SongState, SongStateConfig, SongStateMachine, StateTransitions};
use crate::spectrum::{self, BlockSpectrum};
use crate::tempo::{BpmEstimator, TempoTracker};
use crate::tuning::{Thresholds, TuningStore};

/// Analysis parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub song: SongStateConfig,
    /// Stable interval for the chorus and crescendo flags (seconds)
    pub section_debounce: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            song: SongStateConfig::default(),
            section_debounce: 0.5,
        }
    }
}

/// Everything the analysis learned from one block
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionResult {
    pub beat_detected: bool,
    /// Current BPM estimate, 0.0 when unknown
    pub bpm: f32,
    /// RMS loudness of the block
    pub vu: f32,
    pub is_chorus: bool,
    pub is_crescendo: bool,
    pub is_drum_solo: bool,
    pub snare_hit: bool,
    pub kick_hit: bool,
    pub state: SongState,
    pub state_changed: bool,
}

/// Beat, section and song-state detector fed one block at a time
pub struct BeatDetector {
    config: DetectorConfig,
    spectrum: BlockSpectrum,
    onset: OnsetDetector,
    tempo: TempoTracker,
    bpm: BpmEstimator,
    features: FeatureExtractor,
    chorus: DebouncedFlag,
    crescendo: DebouncedFlag,
    song: SongStateMachine,
}

impl BeatDetector {
    pub fn new(config: DetectorConfig, tuning: TuningStore) -> Self {
        Self {
            spectrum: BlockSpectrum::new(config.sample_rate, config.block_size),
            onset: OnsetDetector::new(),
            tempo: TempoTracker::for_blocks(config.sample_rate, config.block_size),
            bpm: BpmEstimator::new(),
            features: FeatureExtractor::new(tuning),
            chorus: DebouncedFlag::new(config.section_debounce),
            crescendo: DebouncedFlag::new(config.section_debounce),
            song: SongStateMachine::new(config.song),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> SongState {
        self.song.state()
    }

    pub fn song(&self) -> &SongStateMachine {
        &self.song
    }

    /// Replace the table that guards song state transitions
    pub fn set_transitions(&mut self, transitions: StateTransitions) {
        self.song.set_transitions(transitions);
    }

    pub fn thresholds(&self) -> &Thresholds {
        self.features.thresholds()
    }

    /// Analyze one block observed at `now` (seconds since show start)
    pub fn process(&mut self, samples: &[f32], now: f64) -> DetectionResult {
        let vu = spectrum::rms(samples);
        let loud = self.song.is_loud(vu);

        self.spectrum.analyze(samples);
        let onset = self.onset.process(self.spectrum.magnitudes(), vu, now);

        let beat_detected = self.tempo.process(&onset, !loud, now);
        if beat_detected {
            self.bpm.record_beat(now);
        } else {
            self.bpm.prune(now);
        }
        let bpm = self.bpm.bpm(!loud);
        if beat_detected {
            tracing::trace!(at = now, bpm, "beat");
        }

        let features = self
            .features
            .process(samples, &self.spectrum, onset.detected, loud, now);
        let is_chorus = self.chorus.update(features.is_chorus, now);
        let is_crescendo = self.crescendo.update(features.is_crescendo, now);

        let state_changed = self.song.update(vu, now);

        DetectionResult {
            beat_detected,
            bpm,
            vu,
            is_chorus,
            is_crescendo,
            is_drum_solo: features.is_drum_solo,
            snare_hit: features.snare_hit,
            kick_hit: features.kick_hit,
            state: self.song.state(),
            state_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::tests::noise;
    use std::f32::consts::PI;

    /// 120 BPM noise clicks over a quiet 220 Hz tone
    fn click_track(seconds: f32, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f32) as usize;
        let beat = sample_rate as usize / 2;
        let burst = noise(200, 0.8, 11);
        (0..len)
            .map(|i| {
                let tone = 0.05 * (2.0 * PI * 220.0 * i as f32 / sample_rate as f32).sin();
                let offset = i % beat;
                let click = if offset < burst.len() {
                    burst[offset] * (1.0 - offset as f32 / burst.len() as f32)
                } else {
                    0.0
                };
                tone + click
            })
            .collect()
    }

    #[test]
    fn test_click_track() {
        let config = DetectorConfig::default();
        let mut detector = BeatDetector::new(config, TuningStore::in_memory());
        let signal = click_track(8.0, config.sample_rate);

        let mut beats = Vec::new();
        let mut last = DetectionResult::default();
        for (i, block) in signal.chunks_exact(config.block_size).enumerate() {
            let now = (i * config.block_size) as f64 / config.sample_rate as f64;
            last = detector.process(block, now);
            if last.beat_detected {
                beats.push(now);
            }
        }

        assert!((14..=17).contains(&beats.len()), "beats {beats:?}");
        // Every beat sits on the click grid
        for pair in beats.windows(2) {
            let gap = pair[1] - pair[0];
            assert!((0.45..=0.55).contains(&gap), "beats {beats:?}");
        }
        assert!((last.bpm - 120.0).abs() < 5.0, "bpm {}", last.bpm);
        assert_eq!(last.state, SongState::Ongoing);
    }

    #[test]
    fn test_silence() {
        let config = DetectorConfig::default();
        let mut detector = BeatDetector::new(config, TuningStore::in_memory());
        let silence = vec![0.0f32; config.block_size];
        for i in 0..300 {
            let result = detector.process(&silence, i as f64 * 0.0116);
            assert!(!result.beat_detected);
            assert!(!result.snare_hit && !result.kick_hit);
            assert_eq!(result.vu, 0.0);
            assert_eq!(result.bpm, 0.0);
            assert_eq!(result.state, SongState::Intermission);
            assert!(!result.state_changed);
        }
    }

    #[test]
    fn test_state_change_is_reported_once() {
        let config = DetectorConfig::default();
        let mut detector = BeatDetector::new(config, TuningStore::in_memory());
        let loud = vec![0.1f32; config.block_size];
        let first = detector.process(&loud, 0.0);
        assert!(first.state_changed);
        assert_eq!(first.state, SongState::Starting);
        let second = detector.process(&loud, 0.01);
        assert!(!second.state_changed);
    }
}
