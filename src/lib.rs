//! `segprep` — turn long-form audio plus loosely time-aligned captions into
//! fixed-duration, timestamp-annotated training records for speech-recognition
//! models.
//!
//! This crate provides:
//! - Caption parsing (SRT/VTT-style cue files) and timing repair
//! - A fixed-window segmentation engine with per-window token budgets
//! - Bounded prompt context carried across windows
//! - Audio decoding/resampling and per-window sub-clip extraction
//! - A JSON-lines record sink with an optional silence-subsampling post-pass
//!
//! The library is designed to be driven by CLI tools and batch jobs, with an
//! emphasis on deterministic integer-millisecond time arithmetic and
//! predictable skip behavior on noisy caption data.

// High-level API (most consumers should start here).
pub mod opts;
pub mod segprep;

// Caption parsing and timing repair.
pub mod caption;
pub mod sanitize;

// The windowing core.
pub mod prompt;
pub mod segmenter;

// Collaborators: audio decode, sub-clip extraction, token-length oracle.
pub mod audio;
pub mod clip;
pub mod tokens;

// Output sink and post-passes.
pub mod subsample;
pub mod writer;

// Shared value types and language tables.
pub mod lang;
pub mod utterance;

// Crate-wide error type.
pub mod error;
pub use error::{Error, Result};

// Logging configuration (binaries only).
#[cfg(feature = "logging")]
pub mod logging;
