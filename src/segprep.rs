//! High-level API for running a preparation batch.
//!
//! We expose a single entry point (`Segprep`) that wires up caption discovery →
//! sanitization → audio decode → segmentation → the JSON-lines sink, plus the
//! optional silence-subsampling post-pass.
//!
//! The intent is:
//! - We validate options and claim the output path once, up front (fail fast).
//! - We load the token-length oracle once (a tokenizer file can be expensive).
//! - Per-file processing is independent and can fan out over worker threads,
//!   but all records flow through the single writer: one file's records are
//!   appended as one contiguous block, with no cross-file ordering guarantee.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tracing::{debug, info, warn};

use crate::audio;
use crate::caption;
use crate::clip::WavClipSink;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::sanitize;
use crate::segmenter::{SegmentOutcome, Segmenter};
use crate::subsample;
use crate::tokens::{ApproxTokenCounter, HfTokenCounter, TokenCounter};
use crate::utterance::{Record, Utterance};
use crate::writer::RecordWriter;

/// Totals from one preparation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub records_written: usize,
    pub windows_discarded: usize,
}

/// The main high-level entry point.
///
/// `Segprep` owns the long-lived resources of a run:
/// - the record writer (claiming the output path is the fail-fast guard)
/// - the boxed token-length oracle
///
/// Typical usage: construct once, then call `run` (or `run_plain`) exactly
/// once; both consume the instance since the output sink is single-use.
pub struct Segprep {
    opts: Opts,
    writer: RecordWriter,
    counter: Box<dyn TokenCounter>,
}

impl Segprep {
    pub fn new(opts: Opts) -> Result<Self> {
        opts.validate()?;

        // Claiming the output path here makes "output already exists" an error
        // at startup rather than after hours of decoding.
        let writer = RecordWriter::create(&opts.output)?;

        let counter: Box<dyn TokenCounter> = match &opts.tokenizer_file {
            Some(path) => Box::new(HfTokenCounter::from_file(path)?),
            None => Box::new(ApproxTokenCounter),
        };

        std::fs::create_dir_all(&opts.dump_dir)?;

        Ok(Self {
            opts,
            writer,
            counter,
        })
    }

    /// Process every audio file in the configured directory, then run the
    /// silence subsampler when configured.
    pub fn run(self) -> Result<RunStats> {
        self.run_with_progress(|_| {})
    }

    /// Like [`Segprep::run`], with a callback invoked after each finished file
    /// (progress bars, counters).
    pub fn run_with_progress(mut self, mut on_file: impl FnMut(&Path)) -> Result<RunStats> {
        let files = self.list_audio_files()?;
        info!(files = files.len(), "starting preparation run");

        let mut stats = RunStats::default();

        let jobs = if self.opts.jobs == 0 {
            num_cpus::get()
        } else {
            self.opts.jobs
        };

        if jobs <= 1 {
            for path in &files {
                let outcome = prepare_file(&self.opts, self.counter.as_ref(), path);
                self.tally(outcome, path, &mut stats)?;
                on_file(path);
            }
        } else {
            self.run_parallel(jobs, &files, &mut stats, &mut on_file)?;
        }

        self.writer.flush()?;

        if self.opts.silence_subsampling_factor > 1 {
            subsample::subsample_silence(&self.opts.output, self.opts.silence_subsampling_factor)?;
        }

        info!(
            files = stats.files_processed,
            skipped = stats.files_skipped,
            records = stats.records_written,
            discarded_windows = stats.windows_discarded,
            "preparation run finished"
        );
        Ok(stats)
    }

    /// The untimed pipeline for pre-segmented corpora: read `audio_path<TAB>text`
    /// lines, drop lines over the segment token budget, and append the rest as
    /// prompt-less records.
    pub fn run_plain(mut self, data_file: impl AsRef<Path>) -> Result<RunStats> {
        let data_file = data_file.as_ref();
        let raw = std::fs::read_to_string(data_file)?;

        let mut stats = RunStats::default();
        for (line_no, line) in raw.lines().enumerate() {
            let Some((audio_path, text)) = line.split_once('\t') else {
                return Err(Error::msg(format!(
                    "line {} of '{}': expected 'audio_path<TAB>text'",
                    line_no + 1,
                    data_file.display()
                )));
            };

            let tokens = self.counter.encode_length(text)?;
            if tokens > self.opts.max_segment_tokens {
                warn!(audio_path, tokens, "skipping line over the token budget");
                stats.windows_discarded += 1;
                continue;
            }

            self.writer.append(&Record {
                audio_path: audio_path.to_string(),
                text: text.to_string(),
                language: self.opts.language.clone(),
                prompt: String::new(),
            })?;
            stats.records_written += 1;
        }

        stats.files_processed = 1;
        self.writer.flush()?;

        info!(
            records = stats.records_written,
            dropped = stats.windows_discarded,
            "plain run finished"
        );
        Ok(stats)
    }

    fn list_audio_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.opts.audio_dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        // Deterministic processing order regardless of directory enumeration.
        files.sort();
        Ok(files)
    }

    /// Fold one file's outcome into the stats, applying the abort-vs-skip policy.
    fn tally(
        &mut self,
        outcome: Result<SegmentOutcome>,
        path: &Path,
        stats: &mut RunStats,
    ) -> Result<()> {
        match outcome {
            Ok(outcome) => {
                for record in &outcome.records {
                    self.writer.append(record)?;
                }
                stats.records_written += outcome.records.len();
                stats.windows_discarded += outcome.windows_discarded;
                stats.files_processed += 1;
                Ok(())
            }
            Err(err) if self.opts.skip_failed => {
                warn!(path = %path.display(), %err, "skipping audio file");
                stats.files_skipped += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn run_parallel(
        &mut self,
        jobs: usize,
        files: &[PathBuf],
        stats: &mut RunStats,
        on_file: &mut impl FnMut(&Path),
    ) -> Result<()> {
        let jobs = jobs.min(files.len()).max(1);

        // Workers pull the next file index and send whole-file outcomes; this
        // thread is the single writer.
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::sync_channel::<(usize, Result<SegmentOutcome>)>(jobs);

        let opts = &self.opts;
        let counter = self.counter.as_ref();
        let writer = &mut self.writer;

        std::thread::scope(|scope| {
            for _ in 0..jobs {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        if i >= files.len() {
                            break;
                        }
                        let outcome = prepare_file(opts, counter, &files[i]);
                        if tx.send((i, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            // Drain every outcome even after a fatal error: workers block on the
            // bounded channel otherwise, and the scope would never join.
            let mut first_err: Option<Error> = None;
            for (i, outcome) in rx {
                match outcome {
                    Ok(outcome) if first_err.is_none() => {
                        let mut appended = true;
                        for record in &outcome.records {
                            if let Err(err) = writer.append(record) {
                                first_err = Some(err.into());
                                appended = false;
                                break;
                            }
                        }
                        if appended {
                            stats.records_written += outcome.records.len();
                            stats.windows_discarded += outcome.windows_discarded;
                            stats.files_processed += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(err) if opts.skip_failed => {
                        warn!(path = %files[i].display(), %err, "skipping audio file");
                        stats.files_skipped += 1;
                    }
                    Err(err) => {
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                    }
                }
                on_file(&files[i]);
            }

            match first_err {
                None => Ok(()),
                Some(err) => Err(err),
            }
        })
    }
}

/// Process one audio file end to end: captions → sanitize-if-invalid → decode →
/// segment. Pure with respect to the output sink, so it can run on any worker.
fn prepare_file(opts: &Opts, counter: &dyn TokenCounter, audio_path: &Path) -> Result<SegmentOutcome> {
    let speech_id = audio_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| Error::msg(format!("audio path '{}' has no stem", audio_path.display())))?;

    let utterances = load_captions(opts, &speech_id)?;

    // Global sanitization only when the timeline is actually broken; valid
    // input passes through untouched.
    let utterances: Vec<Utterance> = if sanitize::is_valid(&utterances, 0, opts.rep_threshold) {
        utterances
    } else {
        debug!(%speech_id, "caption timeline invalid; sanitizing");
        sanitize::sanitize(&utterances, opts.rep_threshold)
    };

    let samples = audio::decode_to_mono_16k(audio_path)?;

    let segmenter = Segmenter::new(opts.segmenter_opts(), counter)?;
    let mut clips = WavClipSink::new(&opts.dump_dir, &speech_id)?;
    let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

    debug!(
        %speech_id,
        records = outcome.records.len(),
        discarded = outcome.windows_discarded,
        "finished audio file"
    );
    Ok(outcome)
}

/// Resolve and parse the caption file for an audio id, trying each configured
/// format in priority order.
///
/// A missing file or a parse failure falls through to the next format; only
/// exhausting all formats is an error, typed so callers can tell "nothing
/// found" from "found but unparsable".
fn load_captions(opts: &Opts, speech_id: &str) -> Result<Vec<Utterance>> {
    let mut any_found = false;

    for format in &opts.caption_formats {
        let path = opts.caption_dir.join(format.file_name(speech_id));
        if !path.exists() {
            continue;
        }
        any_found = true;

        let raw = std::fs::read_to_string(&path)?;
        match caption::parse_captions(&raw) {
            Ok(utterances) => return Ok(utterances),
            Err(err) => {
                debug!(path = %path.display(), %err, "caption file failed to parse; trying next format");
            }
        }
    }

    if any_found {
        Err(Error::CaptionUnparsable(speech_id.to_string()))
    } else {
        Err(Error::CaptionMissing(speech_id.to_string()))
    }
}
