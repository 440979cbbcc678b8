//! Accumulates retrieved batches into the rolling and playback buffers.

use tracing::debug;

use crate::audio::AudioSink;
use crate::error::Result;

/// Routes samples to a sink: one clip per second of audio while running,
/// then the whole recording once at the end.
pub struct AudioBufferAssembler<S: AudioSink> {
    sink: S,
    sample_rate: u32,
    rolling: Vec<i16>,
    playback: Vec<i16>,
    flushes: usize,
}

/// The complete recording, after it has been handed to the sink.
pub struct FinalPlayback<S> {
    pub samples: Vec<i16>,
    pub sink: S,
}

impl<S: AudioSink> AudioBufferAssembler<S> {
    pub fn new(sink: S, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            rolling: Vec::with_capacity(sample_rate as usize),
            playback: Vec::new(),
            flushes: 0,
        }
    }

    /// Reserve room for a run of `total` samples.
    pub fn with_capacity(sink: S, sample_rate: u32, total: usize) -> Self {
        let mut assembler = Self::new(sink, sample_rate);
        assembler.playback.reserve_exact(total);
        assembler
    }

    /// Record one sample, flushing the rolling buffer once it holds a full
    /// second.
    pub fn append(&mut self, sample: i16) -> Result<()> {
        self.playback.push(sample);
        self.rolling.push(sample);
        // The rolling buffer never holds more than one second.
        if self.rolling.len() >= self.sample_rate as usize {
            self.sink.play(&self.rolling, self.sample_rate)?;
            self.flushes += 1;
            debug!(
                flush = self.flushes,
                samples = self.rolling.len(),
                "rolling buffer flushed"
            );
            self.rolling.clear();
        }
        Ok(())
    }

    pub fn append_batch(&mut self, batch: &[i16]) -> Result<()> {
        batch.iter().try_for_each(|&s| self.append(s))
    }

    pub fn rolling_len(&self) -> usize {
        self.rolling.len()
    }

    pub fn playback_len(&self) -> usize {
        self.playback.len()
    }

    /// Number of rolling flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Hand the whole recording to the sink and give it back.
    ///
    /// Anything left in the rolling buffer is not flushed separately; it is
    /// part of the recording.
    pub fn finalize(mut self) -> Result<FinalPlayback<S>> {
        self.sink.play(&self.playback, self.sample_rate)?;
        debug!(samples = self.playback.len(), "final playback started");
        Ok(FinalPlayback {
            samples: self.playback,
            sink: self.sink,
        })
    }
}
