use crate::error::AudioError;
use std::time::Duration;

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BYTES_PER_SAMPLE: usize = 2;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);

#[cfg(feature = "microphone")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
#[cfg(feature = "microphone")]
use cpal::{SampleFormat, Stream};
#[cfg(feature = "microphone")]
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
#[cfg(feature = "microphone")]
use std::collections::VecDeque;
#[cfg(feature = "microphone")]
use std::thread::{self, JoinHandle};
#[cfg(feature = "microphone")]
use std::time::Instant;

// What the SDK expects to be fed: 16-bit little-endian mono PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub microphone_id: Option<String>,
    pub read_timeout: Duration,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            channels: CHANNELS,
            microphone_id: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

pub trait AudioSource: Send + Sync {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn AudioInput>, AudioError>;
}

// Dropping an input releases the device. `read` blocks until the buffer is
// full or the read timeout passes.
pub trait AudioInput: Send {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, AudioError>;
}

pub fn validate_audio_format(format: &AudioFormat) -> Result<(), AudioError> {
    if format.sample_rate_hz == 0 || format.sample_rate_hz > 48_000 {
        return Err(AudioError::UnsupportedFormat(format!(
            "sample rate {} Hz",
            format.sample_rate_hz
        )));
    }
    if format.channels != CHANNELS {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected {CHANNELS} channel, got {}",
            format.channels
        )));
    }
    Ok(())
}

// Capture only ever downsamples.
pub fn validate_device_rate(source_rate_hz: u32, target_rate_hz: u32) -> Result<(), AudioError> {
    if source_rate_hz < target_rate_hz {
        return Err(AudioError::UnsupportedFormat(format!(
            "device captures at {source_rate_hz} Hz, below the requested {target_rate_hz} Hz"
        )));
    }
    Ok(())
}

pub fn f32_to_pcm_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut output = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        let converted = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        output.extend_from_slice(&converted.to_le_bytes());
    }
    output
}

pub fn pcm_i16_le_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn downsample(input: &[f32], source_sample_rate_hz: u32, target_sample_rate_hz: u32) -> Vec<f32> {
    if source_sample_rate_hz == target_sample_rate_hz {
        return input.to_vec();
    }

    if source_sample_rate_hz < target_sample_rate_hz {
        return Vec::new();
    }

    let ratio = source_sample_rate_hz as f32 / target_sample_rate_hz as f32;
    let output_length = (input.len() as f32 / ratio).floor() as usize;
    let mut output = Vec::with_capacity(output_length);

    let mut position = 0usize;
    for index in 0..output_length {
        let next_position = (((index + 1) as f32 * ratio).floor() as usize).min(input.len());
        let mut sum = 0f32;
        let mut count = 0usize;
        for sample in &input[position..next_position] {
            sum += *sample;
            count += 1;
        }
        output.push(if count > 0 { sum / count as f32 } else { 0.0 });
        position = next_position;
    }

    output
}

pub fn interleaved_f32_to_mono(input: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return input.to_vec();
    }

    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let sum = frame.iter().copied().sum::<f32>();
        output.push(sum / channels as f32);
    }
    output
}

pub fn interleaved_i16_to_mono(input: &[i16], channels: usize) -> Vec<f32> {
    let scale = i16::MAX as f32;
    let channels = channels.max(1);
    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let sum = frame.iter().map(|sample| *sample as f32 / scale).sum::<f32>();
        output.push(sum / channels as f32);
    }
    output
}

pub fn interleaved_u16_to_mono(input: &[u16], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let sum = frame
            .iter()
            .map(|sample| (*sample as f32 / u16::MAX as f32) * 2.0 - 1.0)
            .sum::<f32>();
        output.push(sum / channels as f32);
    }
    output
}

#[cfg(feature = "microphone")]
const CHUNK_QUEUE_DEPTH: usize = 64;

#[cfg(feature = "microphone")]
#[derive(Debug, Clone, Default)]
pub struct CpalSource;

#[cfg(feature = "microphone")]
impl AudioSource for CpalSource {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn AudioInput>, AudioError> {
        validate_audio_format(format)?;

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHUNK_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let microphone_id = format.microphone_id.clone();
        let target_rate = format.sample_rate_hz;

        // cpal streams are not Send, so the stream lives and dies on this thread.
        let worker = thread::Builder::new()
            .name("speech-capture-mic".to_string())
            .spawn(move || {
                let stream = match build_input_stream(microphone_id.as_deref(), target_rate, chunk_tx) {
                    Ok(stream) => stream,
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|error| AudioError::StreamBuild(error.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalInput {
                chunks: chunk_rx,
                pending: VecDeque::new(),
                read_timeout: format.read_timeout,
                stop: Some(stop_tx),
                worker: Some(worker),
            })),
            Ok(Err(error)) => {
                let _ = worker.join();
                Err(error)
            }
            Err(_) => {
                let _ = worker.join();
                Err(AudioError::StreamClosed)
            }
        }
    }
}

#[cfg(feature = "microphone")]
struct CpalInput {
    chunks: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    read_timeout: Duration,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

#[cfg(feature = "microphone")]
impl AudioInput for CpalInput {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, AudioError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0usize;

        while filled < buffer.len() {
            if self.pending.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.chunks.recv_timeout(remaining) {
                    Ok(chunk) => self.pending.extend(chunk),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        if filled == 0 {
                            return Err(AudioError::StreamClosed);
                        }
                        break;
                    }
                }
            }

            let take = (buffer.len() - filled).min(self.pending.len());
            for (slot, byte) in buffer[filled..filled + take]
                .iter_mut()
                .zip(self.pending.drain(..take))
            {
                *slot = byte;
            }
            filled += take;
        }

        Ok(filled)
    }
}

#[cfg(feature = "microphone")]
impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("microphone thread panicked during release");
            }
        }
    }
}

#[cfg(feature = "microphone")]
fn build_input_stream(
    microphone_id: Option<&str>,
    target_rate: u32,
    chunk_tx: Sender<Vec<u8>>,
) -> Result<Stream, AudioError> {
    let host = cpal::default_host();
    let device = resolve_input_device(&host, microphone_id)?;
    let supported = device
        .default_input_config()
        .map_err(|error| AudioError::StreamBuild(error.to_string()))?;

    let sample_format = supported.sample_format();
    let stream_config = supported.config();
    let source_rate = stream_config.sample_rate.0;
    validate_device_rate(source_rate, target_rate)?;
    let channels = usize::from(stream_config.channels.max(1));

    let error_callback = move |error| {
        log::warn!("live input stream error: {error}");
    };

    let forward = move |mono: Vec<f32>| {
        let resampled = downsample(&mono, source_rate, target_rate);
        if !resampled.is_empty() {
            let _ = chunk_tx.try_send(f32_to_pcm_i16_le(&resampled));
        }
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| forward(interleaved_f32_to_mono(data, channels)),
            error_callback,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| forward(interleaved_i16_to_mono(data, channels)),
            error_callback,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| forward(interleaved_u16_to_mono(data, channels)),
            error_callback,
            None,
        ),
        other => {
            return Err(AudioError::UnsupportedFormat(format!(
                "input sample format {other:?}"
            )));
        }
    }
    .map_err(|error| AudioError::StreamBuild(error.to_string()))?;

    stream
        .play()
        .map_err(|error| AudioError::StreamBuild(error.to_string()))?;

    Ok(stream)
}

#[cfg(feature = "microphone")]
fn resolve_input_device(
    host: &cpal::Host,
    microphone_id: Option<&str>,
) -> Result<cpal::Device, AudioError> {
    if let Some(raw_id) = microphone_id {
        let trimmed = raw_id.trim();
        if !trimmed.is_empty() {
            let index = trimmed
                .parse::<usize>()
                .map_err(|_| AudioError::DeviceNotFound(trimmed.to_string()))?;
            let mut devices = host
                .input_devices()
                .map_err(|error| AudioError::DeviceEnumeration(error.to_string()))?;
            return devices
                .nth(index)
                .ok_or_else(|| AudioError::DeviceNotFound(trimmed.to_string()));
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    host.input_devices()
        .map_err(|error| AudioError::DeviceEnumeration(error.to_string()))?
        .next()
        .ok_or(AudioError::NoInputDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_target_audio_format() {
        assert!(validate_audio_format(&AudioFormat::default()).is_ok());
        let stereo = AudioFormat {
            channels: 2,
            ..AudioFormat::default()
        };
        assert!(validate_audio_format(&stereo).is_err());
        let silent = AudioFormat {
            sample_rate_hz: 0,
            ..AudioFormat::default()
        };
        assert!(validate_audio_format(&silent).is_err());
    }

    #[test]
    fn rejects_device_rate_below_requested_rate() {
        assert!(validate_device_rate(48_000, SAMPLE_RATE_HZ).is_ok());
        assert!(validate_device_rate(SAMPLE_RATE_HZ, SAMPLE_RATE_HZ).is_ok());
        match validate_device_rate(16_000, 44_100) {
            Err(AudioError::UnsupportedFormat(message)) => assert!(message.contains("44100")),
            other => panic!("expected unsupported format, got {other:?}"),
        }
    }

    #[test]
    fn converts_float_samples_to_little_endian_pcm() {
        let bytes = f32_to_pcm_i16_le(&[0.0, 1.0, -2.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(pcm_i16_le_to_samples(&bytes), vec![0, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn downsamples_from_48k_to_16k() {
        let input = vec![0.5_f32; 4_800];
        let output = downsample(&input, 48_000, SAMPLE_RATE_HZ);
        assert_eq!(output.len(), 1_600);
        assert!((output[0] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn returns_empty_when_source_rate_is_below_target() {
        let input = vec![0.5_f32; 2_400];
        let output = downsample(&input, 8_000, SAMPLE_RATE_HZ);
        assert!(output.is_empty());
    }

    #[test]
    fn averages_interleaved_channels_to_mono() {
        let stereo = vec![0.2_f32, 0.6_f32, -0.2_f32, 0.2_f32];
        assert_eq!(interleaved_f32_to_mono(&stereo, 2), vec![0.4_f32, 0.0_f32]);

        let pcm = vec![i16::MAX, i16::MAX, 0, 0];
        let mono = interleaved_i16_to_mono(&pcm, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 1.0).abs() < 1e-6);
        assert_eq!(mono[1], 0.0);
    }

    #[test]
    fn centres_unsigned_samples() {
        let mono = interleaved_u16_to_mono(&[0, u16::MAX], 1);
        assert!((mono[0] + 1.0).abs() < 1e-6);
        assert!((mono[1] - 1.0).abs() < 1e-6);
    }
}
