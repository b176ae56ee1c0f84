//! Per-window audio sub-clip extraction.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::TARGET_SAMPLE_RATE;

/// Receives the audio slice for each window and reports where it was recorded.
///
/// The segmenter writes a clip for every window it reaches, accepted or not, so
/// a sink implementation must not assume a record follows each call.
pub trait ClipSink {
    fn write_clip(&mut self, samples: &[f32], segment_start_ms: i64) -> Result<String>;
}

/// A [`ClipSink`] that writes 16-bit PCM mono WAV files named
/// `<segment_start_ms>.wav` under a per-source subdirectory of the dump
/// location.
pub struct WavClipSink {
    dir: PathBuf,
}

impl WavClipSink {
    /// Create the per-source subdirectory and absolutize it once, so recorded
    /// paths stay valid regardless of the working directory of later consumers.
    pub fn new(dump_dir: impl AsRef<Path>, source_id: &str) -> Result<Self> {
        let dir = dump_dir.as_ref().join(source_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create dump directory '{}'", dir.display()))?;
        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to absolutize dump directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }
}

impl ClipSink for WavClipSink {
    fn write_clip(&mut self, samples: &[f32], segment_start_ms: i64) -> Result<String> {
        let path = self.dir.join(format!("{segment_start_ms}.wav"));

        let spec = WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(&path, spec)
            .with_context(|| format!("failed to create clip '{}'", path.display()))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer
            .finalize()
            .with_context(|| format!("failed to finalize clip '{}'", path.display()))?;

        Ok(path.to_string_lossy().into_owned())
    }
}
