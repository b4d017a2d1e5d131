//! FFT magnitude spectrum of a single audio block

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Floor applied to power values before taking logarithms
const POWER_FLOOR: f32 = 1e-10;

/// Windowed FFT of one block, reused across blocks
pub struct BlockSpectrum {
    sample_rate: u32,
    fft_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    /// Pre-allocated FFT buffer to avoid allocation per block
    fft_buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl BlockSpectrum {
    /// Create a spectrum for blocks of `block_size` samples.
    ///
    /// The FFT size is the next power of two at or above the block size.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        let fft_size = block_size.max(64).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            sample_rate,
            fft_size,
            fft,
            window,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0.0; fft_size / 2 + 1],
        }
    }

    /// Analyze a block and return its magnitude spectrum (`fft_size / 2 + 1` bins)
    pub fn analyze(&mut self, samples: &[f32]) -> &[f32] {
        let sample_count = samples.len().min(self.fft_size);
        for (i, &sample) in samples.iter().enumerate().take(sample_count) {
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }
        for buf in self.fft_buffer.iter_mut().skip(sample_count) {
            *buf = Complex::new(0.0, 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        for (mag, c) in self.magnitudes.iter_mut().zip(self.fft_buffer.iter()) {
            *mag = c.norm();
        }
        &self.magnitudes
    }

    /// Magnitudes from the last call to [`analyze`](Self::analyze)
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Width of one frequency bin in Hz
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Root-mean-square amplitude of a block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    energy.sqrt()
}

/// Spectral flatness (Wiener entropy) of a magnitude spectrum.
///
/// Ratio of the geometric to the arithmetic mean of the power spectrum:
/// close to 1.0 for noise, close to 0.0 for tonal content.
pub fn flatness(magnitudes: &[f32]) -> f32 {
    if magnitudes.is_empty() {
        return 1.0;
    }
    let n = magnitudes.len() as f32;
    let mut log_sum = 0.0f32;
    let mut sum = 0.0f32;
    for &m in magnitudes {
        let power = (m * m).max(POWER_FLOOR);
        log_sum += power.ln();
        sum += power;
    }
    let geometric = (log_sum / n).exp();
    let arithmetic = sum / n;
    (geometric / arithmetic).clamp(0.0, 1.0)
}

/// Magnitude-weighted mean frequency in Hz
pub fn centroid(magnitudes: &[f32], bin_hz: f32) -> f32 {
    let total: f32 = magnitudes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = magnitudes
        .iter()
        .enumerate()
        .map(|(i, &m)| i as f32 * bin_hz * m)
        .sum();
    weighted / total
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Deterministic white noise (xorshift) in [-amplitude, amplitude]
    pub(crate) fn noise(len: usize, amplitude: f32, seed: u32) -> Vec<f32> {
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32 * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5; 512]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sine_peak_bin() {
        let mut spectrum = BlockSpectrum::new(44100, 512);
        let mags = spectrum.analyze(&sine(1000.0, 44100, 512, 0.5)).to_vec();
        let (peak, _) = mags
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc });
        let peak_hz = peak as f32 * spectrum.bin_hz();
        assert!((peak_hz - 1000.0).abs() < spectrum.bin_hz() * 1.5);
    }

    #[test]
    fn test_flatness_tone_vs_noise() {
        let mut spectrum = BlockSpectrum::new(44100, 512);
        let tone = flatness(spectrum.analyze(&sine(440.0, 44100, 512, 0.5)));
        let hiss = flatness(spectrum.analyze(&noise(512, 0.5, 7)));
        assert!(tone < 0.1, "tone flatness {tone}");
        assert!(hiss > tone * 5.0, "noise flatness {hiss}");
    }

    #[test]
    fn test_centroid_tracks_frequency() {
        let mut spectrum = BlockSpectrum::new(44100, 512);
        let bin_hz = spectrum.bin_hz();
        let low = centroid(spectrum.analyze(&sine(200.0, 44100, 512, 0.5)), bin_hz);
        let high = centroid(spectrum.analyze(&sine(8000.0, 44100, 512, 0.5)), bin_hz);
        assert!(low < 1000.0, "low centroid {low}");
        assert!(high > 6000.0, "high centroid {high}");
        assert_eq!(centroid(&[0.0; 16], bin_hz), 0.0);
    }
}
