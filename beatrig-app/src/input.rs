//! Microphone input via cpal

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample};

use beatrig_show::{AudioBlock, AudioSender};

/// Downmixes interleaved audio and cuts it into fixed-size blocks.
///
/// Timestamps count the frames seen so far, so they stay monotonic even when
/// the queue drops blocks. Block buffers come from the queue's spare pool.
pub struct Reblocker {
    audio: AudioSender,
    channels: usize,
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    frames: u64,
}

impl Reblocker {
    pub fn new(audio: AudioSender, channels: usize, block_size: usize, sample_rate: u32) -> Self {
        Self {
            audio,
            channels: channels.max(1),
            block_size,
            sample_rate,
            pending: Vec::with_capacity(block_size),
            frames: 0,
        }
    }

    /// Feed interleaved samples; returns how many blocks were queued
    pub fn push_interleaved(&mut self, data: &[f32]) -> usize {
        let mut queued = 0;
        for frame in data.chunks_exact(self.channels) {
            self.pending.push(frame.iter().sum::<f32>() / self.channels as f32);
            if self.pending.len() == self.block_size {
                let timestamp = self.frames as f64 / self.sample_rate as f64;
                self.frames += self.block_size as u64;
                let spare = self.audio.spare_buffer(self.block_size);
                let samples = std::mem::replace(&mut self.pending, spare);
                if self.audio.push(AudioBlock { samples, timestamp }) {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Seconds of audio emitted as blocks so far
    pub fn elapsed(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// A running input stream; audio stops when dropped
pub struct MicInput {
    _stream: cpal::Stream,
    pub device_name: String,
}

/// Find the named input device, or the default one
fn find_device(name: Option<&str>) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .input_devices()
            .context("cannot list input devices")?
            .find(|d| d.name().map_or(false, |n| n == wanted))
            .ok_or_else(|| anyhow!("input device '{wanted}' not found")),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("no audio input device found")),
    }
}

/// Sample rate the device will deliver
pub fn device_sample_rate(name: Option<&str>) -> anyhow::Result<u32> {
    let device = find_device(name)?;
    let config = device
        .default_input_config()
        .context("failed to get input config")?;
    Ok(config.sample_rate().0)
}

/// Print the available input devices
pub fn list_devices() {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => {
            for device in devices {
                if let Ok(name) = device.name() {
                    println!("{name}");
                }
            }
        }
        Err(e) => eprintln!("cannot list input devices: {e}"),
    }
}

impl MicInput {
    /// Open the device and start streaming blocks into `audio`
    pub fn start(name: Option<&str>, block_size: usize, audio: AudioSender) -> anyhow::Result<Self> {
        let device = find_device(name)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_input_config()
            .context("failed to get input config")?;
        let sample_rate = supported.sample_rate().0;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let reblocker = Reblocker::new(audio, config.channels as usize, block_size, sample_rate);

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, reblocker),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, reblocker),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, reblocker),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, reblocker),
            other => return Err(anyhow!("unsupported sample format {other:?}")),
        }
        .context("failed to create input stream")?;
        stream.play().context("failed to start input stream")?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels = config.channels,
            "audio input started"
        );
        Ok(Self {
            _stream: stream,
            device_name,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reblocker: Reblocker,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut converted: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|&s| f32::from_sample(s)));
            reblocker.push_interleaved(&converted);
        },
        |err| tracing::warn!(error = %err, "audio input error"),
        None,
    )
}
