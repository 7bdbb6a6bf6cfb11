use crate::audio::{pcm_i16_le_to_samples, AudioFormat, AudioInput, AudioSource};
use crate::error::AudioError;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

// Recovers the guard from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveCapture {
    input: Box<dyn AudioInput>,
    tap: Option<WavTap>,
}

impl ActiveCapture {
    fn finish(self) {
        if let Some(tap) = self.tap {
            tap.finalize();
        }
        drop(self.input);
    }
}

// Reads run under the slot lock, so release waits for a read in flight.
#[derive(Default)]
pub struct CaptureSlot {
    active: Mutex<Option<ActiveCapture>>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn open_while(
        &self,
        recording: &AtomicBool,
        source: &dyn AudioSource,
        format: &AudioFormat,
        debug_wav_dir: Option<&Path>,
    ) -> Result<bool, AudioError> {
        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            previous.finish();
        }
        if !recording.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let input = source.open(format)?;
        let tap = debug_wav_dir.and_then(|dir| match WavTap::create(dir, format.sample_rate_hz) {
            Ok(tap) => Some(tap),
            Err(error) => {
                log::warn!("debug wav tap disabled: {error}");
                None
            }
        });
        *active = Some(ActiveCapture { input, tap });
        Ok(true)
    }

    pub fn read(&self, len: usize) -> Result<Vec<u8>, AudioError> {
        let mut active = lock(&self.active);
        let Some(capture) = active.as_mut() else {
            return Ok(Vec::new());
        };

        let mut buffer = vec![0u8; len];
        let read = capture.input.read(&mut buffer)?;
        buffer.truncate(read);

        if let Some(tap) = capture.tap.as_mut() {
            if let Err(error) = tap.write(&buffer) {
                log::warn!("debug wav tap stopped: {error}");
                capture.tap = None;
            }
        }
        Ok(buffer)
    }

    pub fn release(&self) -> bool {
        let previous = lock(&self.active).take();
        match previous {
            Some(capture) => {
                capture.finish();
                true
            }
            None => false,
        }
    }
}

struct WavTap {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavTap {
    fn create(dir: &Path, sample_rate_hz: u32) -> Result<Self, String> {
        fs::create_dir_all(dir).map_err(|error| error.to_string())?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis())
            .unwrap_or(0);
        let path = dir.join(format!("capture-{millis}.wav"));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|error| format!("failed to create wav file: {error}"))?;
        Ok(Self { path, writer })
    }

    fn write(&mut self, pcm: &[u8]) -> Result<(), String> {
        for sample in pcm_i16_le_to_samples(pcm) {
            self.writer
                .write_sample(sample)
                .map_err(|error| format!("failed to write wav sample: {error}"))?;
        }
        Ok(())
    }

    fn finalize(self) {
        let path = self.path;
        if let Err(error) = self.writer.finalize() {
            log::warn!("failed to finalize {}: {error}", path.display());
        } else {
            log::debug!("captured audio written to {}", path.display());
        }
    }
}
