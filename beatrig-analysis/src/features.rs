//! Per-block timbral features and section/hit detection
//!
//! Computes loudness, flatness, harmonic/percussive balance and (on onsets)
//! the spectral centroid, then applies self-tuning thresholds to flag chorus,
//! crescendo, drum solo, snare and kick.

use crate::hpss::Hpss;
use crate::spectrum::{self, BlockSpectrum};
use crate::tuning::{Thresholds, TuningStore};

/// Seconds between self-tuning passes
pub const TUNING_PERIOD: f64 = 30.0;
/// A detector firing on more than this fraction of eligible blocks is too eager
const MAX_FIRE_RATE: f32 = 0.5;
/// Relative step applied to a threshold by one tuning pass
const NUDGE: f32 = 0.05;

/// Features of one audio block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockFeatures {
    pub rms: f32,
    pub flatness: f32,
    pub harmonic_energy: f32,
    pub percussive_energy: f32,
    /// Spectral centroid in Hz, only computed for onset blocks
    pub centroid: Option<f32>,
    pub is_chorus: bool,
    pub is_crescendo: bool,
    pub is_drum_solo: bool,
    pub snare_hit: bool,
    pub kick_hit: bool,
}

/// Firing counts gathered over one tuning window
#[derive(Debug, Default)]
struct TuningWindow {
    started: Option<f64>,
    music_blocks: u32,
    onsets: u32,
    chorus: u32,
    crescendo: u32,
    drum_solo: u32,
    snare: u32,
    kick: u32,
}

/// How a tuning pass judged one detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    TooEager,
    Silent,
    Fine,
}

fn verdict(fired: u32, eligible: u32) -> Verdict {
    if eligible == 0 {
        Verdict::Fine
    } else if fired == 0 {
        Verdict::Silent
    } else if fired as f32 / eligible as f32 > MAX_FIRE_RATE {
        Verdict::TooEager
    } else {
        Verdict::Fine
    }
}

/// Feature extractor with adaptive thresholds
pub struct FeatureExtractor {
    hpss: Hpss,
    thresholds: Thresholds,
    store: TuningStore,
    previous_rms: f32,
    window: TuningWindow,
}

impl FeatureExtractor {
    /// Create an extractor whose thresholds are loaded from (and saved to) `store`
    pub fn new(store: TuningStore) -> Self {
        let thresholds = store.load();
        tracing::debug!(?thresholds, path = ?store.path(), "loaded detector thresholds");
        Self {
            hpss: Hpss::new(),
            thresholds,
            store,
            previous_rms: 0.0,
            window: TuningWindow::default(),
        }
    }

    /// Current thresholds
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Replace the thresholds (e.g. from an operator override)
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    /// Extract features for one block.
    ///
    /// `spectrum` must already hold the magnitudes of `samples`. `onset`
    /// says whether the onset detector fired on this block, and
    /// `music_playing` whether the block counts towards self-tuning.
    pub fn process(
        &mut self,
        samples: &[f32],
        spectrum: &BlockSpectrum,
        onset: bool,
        music_playing: bool,
        now: f64,
    ) -> BlockFeatures {
        let t = self.thresholds;
        let rms = spectrum::rms(samples);
        let flatness = spectrum::flatness(spectrum.magnitudes());
        let energy = self.hpss.energies(samples);

        let mut features = BlockFeatures {
            rms,
            flatness,
            harmonic_energy: energy.harmonic,
            percussive_energy: energy.percussive,
            is_chorus: rms > t.chorus_rms && flatness < t.chorus_flatness,
            is_crescendo: rms > self.previous_rms * t.crescendo_mult,
            is_drum_solo: energy.percussive > t.drum_ratio * energy.harmonic,
            ..BlockFeatures::default()
        };
        self.previous_rms = rms;

        if onset {
            let centroid = spectrum::centroid(spectrum.magnitudes(), spectrum.bin_hz());
            features.centroid = Some(centroid);
            if centroid > t.snare_centroid {
                features.snare_hit = true;
            } else if centroid < t.kick_centroid {
                features.kick_hit = true;
            }
        }

        self.record(&features, onset, music_playing, now);
        features
    }

    fn record(&mut self, features: &BlockFeatures, onset: bool, music_playing: bool, now: f64) {
        let started = *self.window.started.get_or_insert(now);

        if music_playing {
            let w = &mut self.window;
            w.music_blocks += 1;
            w.chorus += features.is_chorus as u32;
            w.crescendo += features.is_crescendo as u32;
            w.drum_solo += features.is_drum_solo as u32;
            if onset {
                w.onsets += 1;
                w.snare += features.snare_hit as u32;
                w.kick += features.kick_hit as u32;
            }
        }

        if now - started >= TUNING_PERIOD {
            self.tune();
            self.window = TuningWindow {
                started: Some(now),
                ..TuningWindow::default()
            };
        }
    }

    /// Nudge every threshold based on how often it fired in the last window
    fn tune(&mut self) {
        let w = &self.window;
        let before = self.thresholds;
        let t = &mut self.thresholds;

        match verdict(w.chorus, w.music_blocks) {
            Verdict::TooEager => {
                t.chorus_rms *= 1.0 + NUDGE;
                t.chorus_flatness *= 1.0 - NUDGE;
            }
            Verdict::Silent => {
                t.chorus_rms *= 1.0 - NUDGE;
                t.chorus_flatness = (t.chorus_flatness * (1.0 + NUDGE)).min(1.0);
            }
            Verdict::Fine => {}
        }

        match verdict(w.crescendo, w.music_blocks) {
            Verdict::TooEager => t.crescendo_mult *= 1.0 + NUDGE,
            Verdict::Silent => t.crescendo_mult = (t.crescendo_mult * (1.0 - NUDGE)).max(1.01),
            Verdict::Fine => {}
        }

        match verdict(w.drum_solo, w.music_blocks) {
            Verdict::TooEager => t.drum_ratio *= 1.0 + NUDGE,
            Verdict::Silent => t.drum_ratio = (t.drum_ratio * (1.0 - NUDGE)).max(1.0),
            Verdict::Fine => {}
        }

        // Hit thresholds are judged against onsets, and must keep snare above kick
        match verdict(w.snare, w.onsets) {
            Verdict::TooEager => t.snare_centroid *= 1.0 + NUDGE,
            Verdict::Silent => {
                t.snare_centroid = (t.snare_centroid * (1.0 - NUDGE)).max(t.kick_centroid * 1.5)
            }
            Verdict::Fine => {}
        }
        match verdict(w.kick, w.onsets) {
            Verdict::TooEager => t.kick_centroid *= 1.0 - NUDGE,
            Verdict::Silent => {
                t.kick_centroid = (t.kick_centroid * (1.0 + NUDGE)).min(t.snare_centroid / 1.5)
            }
            Verdict::Fine => {}
        }

        if self.thresholds == before {
            return;
        }

        tracing::info!(
            music_blocks = w.music_blocks,
            chorus = w.chorus,
            crescendo = w.crescendo,
            drum_solo = w.drum_solo,
            snare = w.snare,
            kick = w.kick,
            thresholds = ?self.thresholds,
            "retuned detector thresholds"
        );
        if let Err(e) = self.store.save(&self.thresholds) {
            tracing::warn!(error = %e, "failed to persist detector thresholds");
        }
    }
}
