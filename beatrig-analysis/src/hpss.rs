//! Harmonic/percussive energy split by median filtering a short-time spectrum
//!
//! Sustained tones form horizontal ridges in a spectrogram (stable across
//! time), drum hits form vertical ridges (broadband, short). Median filtering
//! along each axis separates the two; soft masks assign every bin's energy to
//! one side or the other.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const N_FFT: usize = 256;
const HOP: usize = 64;
/// Median kernel along time (frames), for the harmonic estimate
const HARMONIC_KERNEL: usize = 9;
/// Median kernel along frequency (bins), for the percussive estimate
const PERCUSSIVE_KERNEL: usize = 17;
const MASK_EPS: f32 = 1e-12;

/// Energy of the harmonic and percussive parts of a block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HpssEnergy {
    pub harmonic: f32,
    pub percussive: f32,
}

/// Short-time decomposition into harmonic and percussive energy
pub struct Hpss {
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    /// Magnitude spectrogram, frame-major
    frames: Vec<Vec<f32>>,
    scratch: Vec<f32>,
}

impl Default for Hpss {
    fn default() -> Self {
        Self::new()
    }
}

impl Hpss {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(N_FFT);
        let window: Vec<f32> = (0..N_FFT)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / N_FFT as f32).cos()))
            .collect();

        Self {
            fft,
            window,
            fft_buffer: vec![Complex::new(0.0, 0.0); N_FFT],
            frames: Vec::new(),
            scratch: Vec::with_capacity(PERCUSSIVE_KERNEL),
        }
    }

    /// Split the energy of `samples` into harmonic and percussive parts
    pub fn energies(&mut self, samples: &[f32]) -> HpssEnergy {
        if samples.is_empty() {
            return HpssEnergy::default();
        }
        self.compute_stft(samples);

        let n_frames = self.frames.len();
        let n_bins = N_FFT / 2 + 1;
        let mut energy = HpssEnergy::default();

        for t in 0..n_frames {
            for k in 0..n_bins {
                let harmonic = self.median_along_time(t, k);
                let percussive = self.median_along_freq(t, k);
                let h2 = harmonic * harmonic;
                let p2 = percussive * percussive;
                let total = h2 + p2 + MASK_EPS;

                let mag = self.frames[t][k];
                let power = mag * mag;
                energy.harmonic += power * (h2 / total);
                energy.percussive += power * (p2 / total);
            }
        }

        energy
    }

    /// Centered STFT with zero padding of half a window on each side
    fn compute_stft(&mut self, samples: &[f32]) {
        let pad = N_FFT / 2;
        let n_frames = 1 + samples.len() / HOP;
        let n_bins = N_FFT / 2 + 1;

        self.frames.resize_with(n_frames, || vec![0.0; n_bins]);
        self.frames.truncate(n_frames);

        for (t, frame) in self.frames.iter_mut().enumerate() {
            let start = (t * HOP) as isize - pad as isize;
            for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut self.fft_buffer);
            for (mag, c) in frame.iter_mut().zip(self.fft_buffer.iter()) {
                *mag = c.norm();
            }
        }
    }

    fn median_along_time(&mut self, t: usize, k: usize) -> f32 {
        let half = HARMONIC_KERNEL / 2;
        let lo = t.saturating_sub(half);
        let hi = (t + half + 1).min(self.frames.len());
        self.scratch.clear();
        self.scratch.extend((lo..hi).map(|i| self.frames[i][k]));
        median(&mut self.scratch)
    }

    fn median_along_freq(&mut self, t: usize, k: usize) -> f32 {
        let half = PERCUSSIVE_KERNEL / 2;
        let row = &self.frames[t];
        let lo = k.saturating_sub(half);
        let hi = (k + half + 1).min(row.len());
        self.scratch.clear();
        self.scratch.extend_from_slice(&row[lo..hi]);
        median(&mut self.scratch)
    }
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}
