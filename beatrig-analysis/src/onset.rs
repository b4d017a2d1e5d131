//! Spectral-flux onset detection

use std::collections::VecDeque;

/// Number of past flux values the adaptive threshold looks at
const HISTORY_LEN: usize = 16;
/// Multiplier applied to the mean flux on top of the median
const THRESHOLD_OFFSET: f32 = 0.5;
/// Blocks quieter than this RMS never produce an onset
const SILENCE_RMS: f32 = 0.005;
/// Minimum time between two onsets (seconds)
const MIN_GAP: f64 = 0.05;
/// An onset must also reach this fraction of the recent peak flux
const PEAK_RATIO: f32 = 0.1;
/// Per-block decay of the tracked peak flux
const PEAK_DECAY: f32 = 0.995;

/// Onset detector output for one block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnsetFrame {
    /// Onset detection function value (spectral flux)
    pub flux: f32,
    pub detected: bool,
}

/// Detects note/drum onsets as peaks in half-wave rectified spectral flux
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    previous: Vec<f32>,
    history: VecDeque<f32>,
    scratch: Vec<f32>,
    peak: f32,
    last_onset: Option<f64>,
}

impl Default for OnsetDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl OnsetDetector {
    pub fn new() -> Self {
        Self {
            previous: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_LEN + 1),
            scratch: Vec::with_capacity(HISTORY_LEN),
            peak: 0.0,
            last_onset: None,
        }
    }

    /// Feed the magnitude spectrum and RMS of the block observed at `now`
    pub fn process(&mut self, magnitudes: &[f32], rms: f32, now: f64) -> OnsetFrame {
        let flux = self.flux(magnitudes);
        let threshold = self.threshold().max(PEAK_RATIO * self.peak);

        self.peak = (self.peak * PEAK_DECAY).max(flux);
        self.history.push_back(flux);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        let gap_ok = self.last_onset.map_or(true, |t| now - t >= MIN_GAP);
        let detected = rms >= SILENCE_RMS && flux > threshold && gap_ok;
        if detected {
            self.last_onset = Some(now);
        }

        OnsetFrame { flux, detected }
    }

    /// Time of the last detected onset
    pub fn last_onset(&self) -> Option<f64> {
        self.last_onset
    }

    pub fn reset(&mut self) {
        self.previous.clear();
        self.history.clear();
        self.peak = 0.0;
        self.last_onset = None;
    }

    /// Sum of positive magnitude increases (log-compressed) since the last block
    fn flux(&mut self, magnitudes: &[f32]) -> f32 {
        if self.previous.len() != magnitudes.len() {
            self.previous = vec![0.0; magnitudes.len()];
        }

        let mut flux = 0.0;
        for (prev, &m) in self.previous.iter_mut().zip(magnitudes) {
            let compressed = (1.0 + m).ln();
            let diff = compressed - *prev;
            if diff > 0.0 {
                flux += diff;
            }
            *prev = compressed;
        }
        flux
    }

    /// Median plus offset times mean of the recent flux history
    fn threshold(&mut self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        let mean = self.scratch.iter().sum::<f32>() / self.scratch.len() as f32;
        self.scratch
            .sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = self.scratch[self.scratch.len() / 2];
        median + THRESHOLD_OFFSET * mean
    }
}
