use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use segprep::caption::CaptionFormat;
use segprep::opts::Opts;
use segprep::segprep::{RunStats, Segprep};
use segprep::subsample;

fn main() -> Result<()> {
    segprep::logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Segment(args) => run_segment(args),
        Command::Plain(args) => run_plain(args),
        Command::Subsample(args) => {
            subsample::subsample_silence(&args.output, args.factor)?;
            Ok(())
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "segprep")]
#[command(about = "Prepare fixed-window, timestamp-annotated ASR training records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment audio + caption pairs into timestamped training records.
    Segment(SegmentArgs),

    /// Convert a pre-segmented `audio_path<TAB>text` file into records.
    Plain(PlainArgs),

    /// Re-run silence subsampling on an existing output file.
    Subsample(SubsampleArgs),
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Directory of input audio files.
    #[arg(short = 'a', long = "audio-dir")]
    audio_dir: PathBuf,

    /// Directory of caption files.
    #[arg(short = 'c', long = "caption-dir")]
    caption_dir: PathBuf,

    /// JSON-lines output path (must not already exist).
    #[arg(short = 'o', long = "output", default_value = "data.json")]
    output: PathBuf,

    /// Directory for per-window audio sub-clips.
    #[arg(short = 'd', long = "dump-dir", default_value = "dump")]
    dump_dir: PathBuf,

    /// Caption formats tried per audio id, in priority order.
    #[arg(
        long = "formats",
        value_enum,
        value_delimiter = ',',
        default_values_t = [CaptionFormat::Srt, CaptionFormat::Vtt]
    )]
    formats: Vec<CaptionFormat>,

    /// Language code stamped on every record.
    #[arg(short = 'l', long = "language", default_value = "de")]
    language: String,

    /// Timestamp token quantization in milliseconds (multiple of 20).
    #[arg(long = "timestamp-resolution", default_value_t = 20)]
    timestamp_resolution_ms: i64,

    /// Token budget for the prompt carried into each window.
    #[arg(long = "max-prompt-tokens", default_value_t = 267)]
    max_prompt_tokens: usize,

    /// Token budget for a window's own text.
    #[arg(long = "max-segment-tokens", default_value_t = 219)]
    max_segment_tokens: usize,

    /// Consecutive identical-text run length treated as a hallucination loop.
    #[arg(long = "rep-threshold", default_value_t = 3)]
    rep_threshold: usize,

    /// Keep every Nth silence-only record (1 keeps everything).
    #[arg(long = "subsample-silence", default_value_t = 1)]
    silence_subsampling_factor: usize,

    /// Hugging Face tokenizer.json used to count tokens (approximate counting
    /// without it).
    #[arg(long = "tokenizer")]
    tokenizer_file: Option<PathBuf>,

    /// Worker threads (0 = one per CPU).
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    jobs: usize,

    /// Skip files whose captions or audio fail instead of aborting the run.
    #[arg(long = "skip-failed", default_value_t = false)]
    skip_failed: bool,
}

#[derive(Args, Debug)]
struct PlainArgs {
    /// UTF-8 file of `audio_path<TAB>text` lines.
    #[arg(short = 'f', long = "data-file")]
    data_file: PathBuf,

    /// JSON-lines output path (must not already exist).
    #[arg(short = 'o', long = "output", default_value = "data.json")]
    output: PathBuf,

    /// Language code stamped on every record.
    #[arg(short = 'l', long = "language", default_value = "de")]
    language: String,

    /// Token budget above which a line is dropped.
    #[arg(long = "max-segment-tokens", default_value_t = 219)]
    max_segment_tokens: usize,

    /// Hugging Face tokenizer.json used to count tokens.
    #[arg(long = "tokenizer")]
    tokenizer_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SubsampleArgs {
    /// Existing JSON-lines output file to rewrite.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Keep every Nth silence-only record.
    #[arg(short = 'n', long = "factor")]
    factor: usize,
}

fn run_segment(args: SegmentArgs) -> Result<()> {
    let total_files = std::fs::read_dir(&args.audio_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .count();

    let opts = Opts {
        caption_formats: args.formats,
        language: args.language,
        timestamp_resolution_ms: args.timestamp_resolution_ms,
        max_prompt_tokens: args.max_prompt_tokens,
        max_segment_tokens: args.max_segment_tokens,
        rep_threshold: args.rep_threshold,
        silence_subsampling_factor: args.silence_subsampling_factor,
        tokenizer_file: args.tokenizer_file,
        jobs: args.jobs,
        skip_failed: args.skip_failed,
        ..Opts::new(args.audio_dir, args.caption_dir, args.output, args.dump_dir)
    };

    let prep = Segprep::new(opts)?;

    let bar = ProgressBar::new(total_files as u64);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} {msg}",
    )?);

    let stats = prep.run_with_progress(|path| {
        if let Some(name) = path.file_name() {
            bar.set_message(name.to_string_lossy().into_owned());
        }
        bar.inc(1);
    })?;
    bar.finish_and_clear();

    print_summary(&stats);
    Ok(())
}

fn run_plain(args: PlainArgs) -> Result<()> {
    let opts = Opts {
        language: args.language,
        max_segment_tokens: args.max_segment_tokens,
        tokenizer_file: args.tokenizer_file,
        ..Opts::new(".", ".", args.output, std::env::temp_dir())
    };

    let prep = Segprep::new(opts)?;
    let stats = prep.run_plain(&args.data_file)?;

    print_summary(&stats);
    Ok(())
}

fn print_summary(stats: &RunStats) {
    println!(
        "processed {} file(s), skipped {}, wrote {} record(s), discarded {} window(s)",
        stats.files_processed, stats.files_skipped, stats.records_written, stats.windows_discarded
    );
}
