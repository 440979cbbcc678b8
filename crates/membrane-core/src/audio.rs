//! Audio sinks: where rolling flushes and the final playback go.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{debug, error, warn};

use crate::error::{MembraneError, Result};

/// Receiver of finished audio clips.
///
/// `play` must return promptly; playback itself happens asynchronously and a
/// new clip replaces whatever is still sounding.
pub trait AudioSink {
    fn play(&mut self, samples: &[i16], sample_rate: u32) -> Result<()>;

    /// Block until everything handed to `play` has been heard.
    fn wait_idle(&self) {}
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn play(&mut self, samples: &[i16], sample_rate: u32) -> Result<()> {
        (**self).play(samples, sample_rate)
    }

    fn wait_idle(&self) {
        (**self).wait_idle()
    }
}

/// Discards audio, keeping only counts. Used for muted and headless runs.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    clips: usize,
    samples: usize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clips received.
    pub fn clips(&self) -> usize {
        self.clips
    }

    /// Total samples received across all clips.
    pub fn samples(&self) -> usize {
        self.samples
    }
}

impl AudioSink for NullSink {
    fn play(&mut self, samples: &[i16], _sample_rate: u32) -> Result<()> {
        self.clips += 1;
        self.samples += samples.len();
        Ok(())
    }
}

/// A mono clip being played back at the device rate.
#[derive(Debug)]
struct Clip {
    samples: Vec<i16>,
    source_rate: u32,
    /// Output frames emitted so far.
    frame: u64,
}

impl Clip {
    fn new(samples: Vec<i16>, source_rate: u32) -> Self {
        Self {
            samples,
            source_rate,
            frame: 0,
        }
    }

    /// Next output value in `[-1, 1]`, nearest-sample resampled to
    /// `device_rate`. `None` once the clip is exhausted.
    fn next_frame(&mut self, device_rate: u32) -> Option<f32> {
        let idx = (self.frame * self.source_rate as u64 / device_rate.max(1) as u64) as usize;
        let sample = *self.samples.get(idx)?;
        self.frame += 1;
        Some(sample as f32 / i16::MAX as f32)
    }
}

type SharedClip = Arc<Mutex<Option<Clip>>>;

/// Plays clips on the default output device.
///
/// Owns the cpal stream for its whole life; the stream idles on silence
/// between clips.
pub struct CpalSink {
    current: SharedClip,
    device_rate: u32,
    _stream: cpal::Stream,
}

impl CpalSink {
    /// Open the default output device and start its stream.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MembraneError::audio("no audio output device available"))?;
        let config = device
            .default_output_config()
            .map_err(|e| MembraneError::audio(format!("failed to get output config: {e}")))?;

        let device_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let current: SharedClip = Arc::new(Mutex::new(None));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config.into(), channels, device_rate, &current)?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config.into(), channels, device_rate, &current)?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config.into(), channels, device_rate, &current)?
            }
            other => {
                return Err(MembraneError::audio(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| MembraneError::audio(format!("failed to start audio stream: {e}")))?;

        debug!(device_rate, channels, "audio stream started");
        Ok(Self {
            current,
            device_rate,
            _stream: stream,
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// True while a clip is still sounding.
    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl AudioSink for CpalSink {
    fn play(&mut self, samples: &[i16], sample_rate: u32) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            debug!("replacing clip that is still playing");
        }
        *current = Some(Clip::new(samples.to_vec(), sample_rate));
        Ok(())
    }

    fn wait_idle(&self) {
        while self.is_playing() {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    device_rate: u32,
    current: &SharedClip,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let current = Arc::clone(current);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut slot = current.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks_mut(channels.max(1)) {
                    let value = match slot.as_mut().and_then(|c| c.next_frame(device_rate)) {
                        Some(v) => v,
                        None => {
                            *slot = None;
                            0.0
                        }
                    };
                    frame.fill(T::from_sample(value));
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| MembraneError::audio(format!("failed to build audio stream: {e}")))
}

/// Open the default device, or fall back to a [`NullSink`] when there is
/// none. The simulation itself does not depend on audio output.
pub fn default_sink() -> Box<dyn AudioSink> {
    match CpalSink::new() {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            warn!("audio output unavailable, continuing muted: {e}");
            Box::new(NullSink::new())
        }
    }
}
