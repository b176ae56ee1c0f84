//! Whole-file audio decoding for segmentation.
//!
//! The segmenter needs random access to the full clip (windows are sliced by
//! millisecond offset), so unlike a streaming transcriber we decode the whole
//! file up front:
//! - probe the container and pick the first decodable audio track
//! - decode all packets, skipping corrupt frames and treating IO errors as end-of-stream
//! - downmix interleaved PCM to mono by channel averaging
//! - resample to 16 kHz when the source rate differs

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// The sample rate all windowing arithmetic assumes (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decode an audio file into mono `f32` samples at 16 kHz.
pub fn decode_to_mono_16k(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file '{}'", path.display()))?;

    let mss = MediaSourceStream::new(
        Box::new(file),
        MediaSourceStreamOptions {
            // Symphonia expects a power-of-two buffer > 32KiB for good probing behavior.
            buffer_len: 256 * 1024,
        },
    );

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("failed to probe '{}'", path.display()))?;

    let mut format = probed.format;

    // Track selection policy: first track that looks decodable (codec != NULL)
    // with a known sample rate.
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| anyhow!("no audio track found in '{}'", path.display()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!(e))
        .context("failed to create decoder for audio track")?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut mono = Vec::new();
    let mut src_rate = 0u32;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // Treat IO errors as end-of-stream.
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!(e)).context("failed reading packet"),
        };

        if packet.track_id() != track.id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                src_rate = decoded.spec().rate;
                append_mono(&decoded, &mut sample_buf, &mut mono)?;
            }
            // Corrupted frame; decoding can continue.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!(e)).context("decoder failure"),
        }
    }

    if mono.is_empty() || src_rate == TARGET_SAMPLE_RATE {
        return Ok(mono);
    }

    resample_to_target(mono, src_rate)
}

/// Copy one decoded buffer into `mono`, downmixing by equal-weight channel averaging.
fn append_mono(
    decoded: &AudioBufferRef<'_>,
    sample_buf: &mut Option<SampleBuffer<f32>>,
    mono: &mut Vec<f32>,
) -> Result<()> {
    if sample_buf.is_none() {
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;
        *sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
    }

    let buf = sample_buf
        .as_mut()
        .ok_or_else(|| anyhow!("sample buffer not initialized"))?;
    buf.copy_interleaved_ref(decoded.clone());

    let channels = decoded.spec().channels.count();
    if channels == 0 {
        bail!("decoded audio had zero channels");
    }

    let interleaved = buf.samples();
    if channels == 1 {
        mono.extend_from_slice(interleaved);
        return Ok(());
    }

    let frames = interleaved.len() / channels;
    mono.reserve(frames);
    for f in 0..frames {
        let base = f * channels;
        let mut acc = 0.0;
        for c in 0..channels {
            acc += interleaved[base + c];
        }
        mono.push(acc / channels as f32);
    }

    Ok(())
}

/// Resample a whole mono buffer from `src_rate` to the target rate.
fn resample_to_target(mut mono: Vec<f32>, src_rate: u32) -> Result<Vec<f32>> {
    // Source frames fed to rubato per `process()` call.
    let block = 2048usize;

    let mut resampler = SincFixedIn::<f32>::new(
        TARGET_SAMPLE_RATE as f64 / src_rate as f64,
        2.0,
        rubato::SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: rubato::SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
        block,
        1, // mono
    )
    .map_err(|e| anyhow!(e))
    .context("failed to init resampler")?;

    // rubato expects exact block sizes; pad the final partial block with zeros.
    let rem = mono.len() % block;
    if rem != 0 {
        mono.resize(mono.len() + (block - rem), 0.0);
    }

    let estimated =
        mono.len() as u64 * TARGET_SAMPLE_RATE as u64 / src_rate as u64 + block as u64;
    let mut out = Vec::with_capacity(estimated as usize);

    for chunk in mono.chunks(block) {
        let input = vec![chunk.to_vec()];
        let mut resampled = resampler
            .process(&input, None)
            .map_err(|e| anyhow!(e))
            .context("resampler process failed")?;

        if resampled.len() != 1 {
            bail!("expected mono output from resampler");
        }
        out.append(&mut resampled[0]);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_halves_the_length_from_32k() -> anyhow::Result<()> {
        let src = vec![0.25f32; 32_000];
        let out = resample_to_target(src, 32_000)?;

        // One second of 32 kHz audio becomes roughly one second of 16 kHz audio;
        // allow slack for the zero-padded final block and filter delay.
        assert!((out.len() as i64 - 16_000).unsigned_abs() < 2_048);
        Ok(())
    }

    #[test]
    fn decode_fails_for_a_missing_file() {
        assert!(decode_to_mono_16k("does/not/exist.wav").is_err());
    }
}
