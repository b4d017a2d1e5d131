//! Offline replay: play an audio file through the show as if it came from
//! the microphone

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use beatrig_show::{resample_mono, AudioSender, ResampleError};

use crate::input::Reblocker;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// A decoded mono track
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a file, downmix it and resample it to `target_rate`
pub fn decode_file(path: &Path, target_rate: u32) -> Result<DecodedAudio, ReplayError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ReplayError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(ReplayError::NoAudioTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ReplayError::Decode(e.to_string()))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading packets");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                continue;
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mono.extend(
            buffer
                .samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    let samples = resample_mono(&mono, source_rate, target_rate)?;
    tracing::info!(
        file = %path.display(),
        source_rate,
        seconds = samples.len() as f64 / target_rate as f64,
        "decoded replay file"
    );
    Ok(DecodedAudio {
        samples,
        sample_rate: target_rate,
    })
}

/// Feed decoded audio into the show at real-time pace.
///
/// Returns early when `keep_going` turns false.
pub fn feed_realtime(
    audio: &DecodedAudio,
    sender: AudioSender,
    block_size: usize,
    mut keep_going: impl FnMut() -> bool,
) {
    let mut reblocker = Reblocker::new(sender, 1, block_size, audio.sample_rate);
    let started = Instant::now();
    for chunk in audio.samples.chunks(block_size) {
        if !keep_going() {
            return;
        }
        reblocker.push_interleaved(chunk);
        let ahead = reblocker.elapsed() - started.elapsed().as_secs_f64();
        if ahead > 0.0 {
            thread::sleep(Duration::from_secs_f64(ahead));
        }
    }
    tracing::info!(seconds = reblocker.elapsed(), "replay finished");
}
