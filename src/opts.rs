use std::path::PathBuf;

use anyhow::{Result, ensure};

use crate::caption::CaptionFormat;
use crate::lang;
use crate::segmenter::{SegmenterOpts, WINDOW_MS};

/// Options that control one preparation run.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (batch jobs, tests) can construct options programmatically
#[derive(Debug, Clone)]
pub struct Opts {
    /// Directory of input audio files; every file in it is one audio id.
    pub audio_dir: PathBuf,

    /// Directory of caption files, resolved per audio id via `caption_formats`.
    pub caption_dir: PathBuf,

    /// The JSON-lines output path. Must not already exist.
    pub output: PathBuf,

    /// Where per-window audio sub-clips are dumped (one subdirectory per audio id).
    pub dump_dir: PathBuf,

    /// Caption formats tried per audio id, in priority order.
    pub caption_formats: Vec<CaptionFormat>,

    /// Language code stamped on every record.
    pub language: String,

    /// Window duration in milliseconds.
    pub window_ms: i64,

    /// Timestamp token quantization in milliseconds; must be a multiple of 20.
    pub timestamp_resolution_ms: i64,

    /// Token budget for the prompt carried into each window.
    pub max_prompt_tokens: usize,

    /// Token budget for a window's own text.
    pub max_segment_tokens: usize,

    /// Run length at which consecutive identical-text utterances are treated as
    /// a decoder hallucination loop.
    pub rep_threshold: usize,

    /// Keep every Nth silence-only record; 1 keeps everything.
    pub silence_subsampling_factor: usize,

    /// Optional Hugging Face `tokenizer.json` used as the token-length oracle.
    /// Without it, a byte/word approximation is used.
    pub tokenizer_file: Option<PathBuf>,

    /// Worker threads for per-file processing. 1 is sequential; 0 means one
    /// worker per CPU.
    pub jobs: usize,

    /// When a file's captions are missing/unparsable or its audio fails to
    /// decode: skip the file (true) or abort the run (false).
    pub skip_failed: bool,
}

impl Opts {
    pub fn new(
        audio_dir: impl Into<PathBuf>,
        caption_dir: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        dump_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            caption_dir: caption_dir.into(),
            output: output.into(),
            dump_dir: dump_dir.into(),
            caption_formats: vec![CaptionFormat::Srt, CaptionFormat::Vtt],
            language: "de".to_string(),
            window_ms: WINDOW_MS,
            timestamp_resolution_ms: 20,
            max_prompt_tokens: 267,
            max_segment_tokens: 219,
            rep_threshold: 3,
            silence_subsampling_factor: 1,
            tokenizer_file: None,
            jobs: 1,
            skip_failed: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(self.window_ms > 0, "window duration must be positive");
        ensure!(
            self.timestamp_resolution_ms > 0 && self.timestamp_resolution_ms % 20 == 0,
            "timestamp resolution must be a positive multiple of 20 ms, got {}",
            self.timestamp_resolution_ms
        );
        ensure!(
            lang::is_supported(&self.language),
            "unsupported language: '{}'",
            self.language
        );
        ensure!(
            !self.caption_formats.is_empty(),
            "at least one caption format must be configured"
        );
        Ok(())
    }

    pub(crate) fn segmenter_opts(&self) -> SegmenterOpts {
        SegmenterOpts {
            window_ms: self.window_ms,
            timestamp_resolution_ms: self.timestamp_resolution_ms,
            max_prompt_tokens: self.max_prompt_tokens,
            max_segment_tokens: self.max_segment_tokens,
            language: self.language.clone(),
            rep_threshold: self.rep_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> Opts {
        Opts::new("audio", "captions", "data.json", "dump")
    }

    #[test]
    fn defaults_validate() -> anyhow::Result<()> {
        opts().validate()
    }

    #[test]
    fn odd_timestamp_resolution_is_rejected() {
        let mut bad = opts();
        bad.timestamp_resolution_ms = 30;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn unknown_language_is_rejected() {
        let mut bad = opts();
        bad.language = "german".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn empty_format_list_is_rejected() {
        let mut bad = opts();
        bad.caption_formats.clear();
        assert!(bad.validate().is_err());
    }
}
