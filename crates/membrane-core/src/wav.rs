//! WAV export of the recorded listener signal.

use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Write `samples` as a mono 16-bit PCM WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[i16], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    info!(path = %path.display(), samples = samples.len(), "wrote WAV");
    Ok(())
}
