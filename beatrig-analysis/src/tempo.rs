//! Real-time beat tracking and BPM estimation
//!
//! [`TempoTracker`] finds the beat period by autocorrelating a few seconds of
//! onset detection function and turns onsets into beats, predicting beats
//! across short gaps. [`BpmEstimator`] derives a displayed BPM from the
//! resulting beat times.

use std::collections::VecDeque;

use crate::onset::OnsetFrame;

/// Seconds of onset detection function kept for autocorrelation
const ODF_SECONDS: f64 = 6.0;
/// Seconds between period re-estimations
const ESTIMATE_INTERVAL: f64 = 1.0;
const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;
/// Normalized correlation a period must reach to be trusted
const MIN_CORRELATION: f32 = 0.1;
/// A longer lag must beat the current best by this factor to replace it
const LAG_MARGIN: f32 = 1.1;
/// Minimum spacing of beats while no period is known
const FREE_RUNNING_GAP: f64 = 0.3;
/// Fraction of the period around the predicted beat where onsets hold the phase
const PHASE_TOLERANCE: f64 = 0.2;

/// Seconds of beat history kept by the estimator
const BEAT_HISTORY_SECONDS: f64 = 60.0;
/// Inter-beat intervals considered for the BPM estimate
const RECENT_BEATS: usize = 8;
const MIN_BEATS: usize = 4;
const OCTAVE_GUARD_BPM: f32 = 120.0;
const OCTAVE_SPREAD: f32 = 0.2;

/// Beat tracker driven by onset detection output
#[derive(Debug, Clone)]
pub struct TempoTracker {
    block_period: f64,
    capacity: usize,
    odf: VecDeque<f32>,
    period: Option<f64>,
    last_estimate: Option<f64>,
    last_beat: Option<f64>,
}

impl TempoTracker {
    /// Create a tracker for blocks arriving every `block_period` seconds
    pub fn new(block_period: f64) -> Self {
        let block_period = block_period.max(1e-4);
        let capacity = (ODF_SECONDS / block_period).ceil() as usize;
        Self {
            block_period,
            capacity,
            odf: VecDeque::with_capacity(capacity + 1),
            period: None,
            last_estimate: None,
            last_beat: None,
        }
    }

    /// Tracker for blocks of `block_size` samples at `sample_rate`
    pub fn for_blocks(sample_rate: u32, block_size: usize) -> Self {
        Self::new(block_size as f64 / sample_rate.max(1) as f64)
    }

    /// Feed one block's onset output; returns true if a beat falls on this block
    pub fn process(&mut self, onset: &OnsetFrame, silent: bool, now: f64) -> bool {
        self.odf.push_back(onset.flux);
        if self.odf.len() > self.capacity {
            self.odf.pop_front();
        }

        let due = self
            .last_estimate
            .map_or(true, |t| now - t >= ESTIMATE_INTERVAL);
        if due {
            self.last_estimate = Some(now);
            self.estimate_period();
        }

        let since_beat = self.last_beat.map_or(f64::INFINITY, |t| now - t);
        let beat = match self.period {
            Some(period) => {
                let window = period * PHASE_TOLERANCE;
                if onset.detected && since_beat < window {
                    // Onset just after a flywheel beat: move the phase, no new beat
                    self.last_beat = Some(now);
                    return false;
                }
                // Onsets off the predicted beat are ignored
                (onset.detected && since_beat >= period - window)
                    || (!silent && since_beat >= period)
            }
            None => onset.detected && since_beat >= FREE_RUNNING_GAP,
        };

        if beat {
            self.last_beat = Some(now);
        }
        beat
    }

    /// Current beat period in seconds
    pub fn period(&self) -> Option<f64> {
        self.period
    }

    /// Tempo implied by the current period
    pub fn bpm(&self) -> Option<f64> {
        self.period.map(|p| 60.0 / p)
    }

    pub fn reset(&mut self) {
        self.odf.clear();
        self.period = None;
        self.last_estimate = None;
        self.last_beat = None;
    }

    fn estimate_period(&mut self) {
        let min_lag = ((60.0 / MAX_BPM) / self.block_period).floor().max(1.0) as usize;
        let max_lag = ((60.0 / MIN_BPM) / self.block_period).ceil() as usize;
        if self.odf.len() < max_lag * 2 {
            return;
        }

        let mean = self.odf.iter().sum::<f32>() / self.odf.len() as f32;
        let centered: Vec<f32> = self.odf.iter().map(|v| v - mean).collect();

        let mut best_lag = 0;
        let mut best_correlation = 0.0f32;
        for lag in min_lag..=max_lag {
            let correlation = correlation_at_lag(&centered, lag);
            if correlation > best_correlation * LAG_MARGIN {
                best_correlation = correlation;
                best_lag = lag;
            }
        }

        self.period = if best_lag > 0 && best_correlation >= MIN_CORRELATION {
            Some(best_lag as f64 * self.block_period)
        } else {
            None
        };
        tracing::trace!(period = ?self.period, correlation = best_correlation, "tempo estimate");
    }
}

/// Normalized correlation of a signal with itself delayed by `lag` frames
fn correlation_at_lag(signal: &[f32], lag: usize) -> f32 {
    if lag == 0 || lag >= signal.len() {
        return 0.0;
    }

    let mut correlation = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..(signal.len() - lag) {
        correlation += signal[i] * signal[i + lag];
        norm_a += signal[i] * signal[i];
        norm_b += signal[i + lag] * signal[i + lag];
    }

    let norm = (norm_a * norm_b).sqrt();
    if norm > 0.0 {
        correlation / norm
    } else {
        0.0
    }
}

/// BPM estimate from recent beat times
#[derive(Debug, Clone, Default)]
pub struct BpmEstimator {
    beat_times: VecDeque<f64>,
}

impl BpmEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a beat at `now` and drop beats older than the history window
    pub fn record_beat(&mut self, now: f64) {
        self.beat_times.push_back(now);
        self.prune(now);
    }

    /// Drop beats older than the history window
    pub fn prune(&mut self, now: f64) {
        while let Some(&first) = self.beat_times.front() {
            if now - first > BEAT_HISTORY_SECONDS {
                self.beat_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of beats in the history
    pub fn beat_count(&self) -> usize {
        self.beat_times.len()
    }

    /// Estimated BPM, or 0.0 while fewer than four beats are known.
    ///
    /// Estimates above 120 BPM are halved when the intervals are irregular
    /// or the current block is `quiet`, since sparse high-frequency content
    /// tends to be tracked at double time.
    pub fn bpm(&self, quiet: bool) -> f32 {
        if self.beat_times.len() < MIN_BEATS {
            return 0.0;
        }

        let skip = self.beat_times.len().saturating_sub(RECENT_BEATS + 1);
        let recent: Vec<f64> = self.beat_times.iter().skip(skip).copied().collect();
        let intervals: Vec<f32> = recent.windows(2).map(|w| (w[1] - w[0]) as f32).collect();

        let median = median(&intervals);
        if median <= 0.0 {
            return 0.0;
        }
        let mut bpm = 60.0 / median;

        if bpm > OCTAVE_GUARD_BPM && (std_dev(&intervals) > OCTAVE_SPREAD * median || quiet) {
            bpm /= 2.0;
        }
        bpm
    }

    pub fn reset(&mut self) {
        self.beat_times.clear();
    }
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(detected: bool) -> OnsetFrame {
        OnsetFrame {
            flux: if detected { 1.0 } else { 0.0 },
            detected,
        }
    }

    /// Feed a 120 BPM impulse train (every 50 blocks of 10 ms) for `blocks` blocks
    fn train(tracker: &mut TempoTracker, blocks: usize) -> usize {
        let mut beats = 0;
        for i in 0..blocks {
            if tracker.process(&frame(i % 50 == 0), false, i as f64 * 0.01) {
                beats += 1;
            }
        }
        beats
    }

    #[test]
    fn test_period_from_impulse_train() {
        let mut tracker = TempoTracker::new(0.01);
        let beats = train(&mut tracker, 700);
        let bpm = tracker.bpm().unwrap();
        assert!((bpm - 120.0).abs() < 1.0, "bpm {bpm}");
        assert_eq!(beats, 14);
    }

    #[test]
    fn test_off_beat_onsets_do_not_make_beats() {
        let mut tracker = TempoTracker::new(0.01);
        let mut beat_times = Vec::new();
        for i in 0..1200 {
            // Weak onsets 0.2 s after every beat
            let onset = match i % 50 {
                0 => frame(true),
                20 => OnsetFrame {
                    flux: 0.2,
                    detected: true,
                },
                _ => frame(false),
            };
            if tracker.process(&onset, false, i as f64 * 0.01) {
                beat_times.push(i);
            }
        }

        assert!((tracker.bpm().unwrap() - 120.0).abs() < 1.0);
        assert_eq!(beat_times.len(), 24);
        assert!(beat_times.iter().all(|i| i % 50 == 0), "{beat_times:?}");
    }

    #[test]
    fn test_late_onset_moves_phase() {
        let mut tracker = TempoTracker::new(0.01);
        train(&mut tracker, 700);

        // Flywheel beat at 7.0 s, the real hit lands 30 ms later
        let mut beats = Vec::new();
        for i in 700..760 {
            if tracker.process(&frame(i == 703), false, i as f64 * 0.01) {
                beats.push(i);
            }
        }
        assert_eq!(beats, vec![700, 753]);
    }

    #[test]
    fn test_free_running_gap_without_period() {
        let mut tracker = TempoTracker::new(0.01);
        assert!(tracker.process(&frame(true), false, 0.0));
        assert!(!tracker.process(&frame(true), false, 0.2));
        assert!(tracker.process(&frame(true), false, 0.35));
        assert_eq!(tracker.period(), None);
    }

    #[test]
    fn test_flywheel_continues_through_gap() {
        let mut tracker = TempoTracker::new(0.01);
        train(&mut tracker, 700);

        // Next impulse would have been at 7.0 s
        let mut beats = 0;
        for i in 700..740 {
            if tracker.process(&frame(false), false, i as f64 * 0.01) {
                beats += 1;
            }
        }
        assert_eq!(beats, 1);
    }

    #[test]
    fn test_flywheel_stops_on_silence() {
        let mut tracker = TempoTracker::new(0.01);
        train(&mut tracker, 700);

        for i in 700..850 {
            assert!(!tracker.process(&frame(false), true, i as f64 * 0.01));
        }
    }

    #[test]
    fn test_bpm_needs_four_beats() {
        let mut estimator = BpmEstimator::new();
        estimator.record_beat(0.0);
        estimator.record_beat(0.6);
        estimator.record_beat(1.2);
        assert_eq!(estimator.bpm(false), 0.0);
        estimator.record_beat(1.8);
        assert!((estimator.bpm(false) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_octave_guard_when_quiet() {
        let mut estimator = BpmEstimator::new();
        for i in 0..6 {
            estimator.record_beat(i as f64 * 0.4);
        }
        assert!((estimator.bpm(false) - 150.0).abs() < 0.01);
        assert!((estimator.bpm(true) - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_octave_guard_on_irregular_intervals() {
        let mut estimator = BpmEstimator::new();
        let mut t = 0.0;
        estimator.record_beat(t);
        for i in 0..7 {
            t += if i % 2 == 0 { 0.3 } else { 0.5 };
            estimator.record_beat(t);
        }
        // Median interval 0.3 s is 200 BPM, spread is wide, so halve
        assert!((estimator.bpm(false) - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_history_is_pruned() {
        let mut estimator = BpmEstimator::new();
        estimator.record_beat(0.0);
        estimator.record_beat(1.0);
        estimator.record_beat(70.0);
        assert_eq!(estimator.beat_count(), 1);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
