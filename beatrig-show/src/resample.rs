//! Mono sample-rate conversion

use rubato::{FftFixedInOut, Resampler};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("cannot build resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

const CHUNK_SIZE: usize = 1024;

/// Resample a mono signal from `source_rate` to `target_rate`.
///
/// The tail is zero-padded to a full chunk and the output trimmed to the
/// proportional length.
pub fn resample_mono(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, ResampleError> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, CHUNK_SIZE, 1)?;
    let chunk_size = resampler.input_frames_next();
    let expected = samples.len() * target_rate as usize / source_rate as usize;
    let mut output = Vec::with_capacity(expected + resampler.output_frames_max());

    let mut chunks = samples.chunks_exact(chunk_size);
    for chunk in &mut chunks {
        let resampled = resampler.process(&[chunk], None)?;
        output.extend_from_slice(&resampled[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut padded = rest.to_vec();
        padded.resize(chunk_size, 0.0);
        let resampled = resampler.process(&[padded.as_slice()], None)?;
        let take = rest.len() * target_rate as usize / source_rate as usize;
        output.extend_from_slice(&resampled[0][..take.min(resampled[0].len())]);
    }

    Ok(output)
}
