use serde::{Deserialize, Serialize};

/// One caption cue: a span of the source timeline and the text spoken in it.
///
/// Invariant after sanitization (see `sanitize`):
/// - `start_ms <= end_ms`
/// - utterances are sorted ascending by `start_ms`
/// - no two consecutive utterances overlap
///
/// Freshly parsed utterances carry whatever timing the caption file claimed,
/// which for machine-aligned captions can violate all three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Utterance {
    pub fn new(text: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
        }
    }
}

/// One training record: a window's audio clip plus its timestamp-annotated text.
///
/// `text` interleaves timestamp tokens and caption text; an empty `text` marks a
/// silence-only window (these are what the silence subsampler thins out).
/// Records are created once per accepted window and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub audio_path: String,
    pub text: String,
    pub language: String,
    pub prompt: String,
}

/// A fragment of a previous window's emitted text plus its token cost.
///
/// Nodes live in the [`PromptBuffer`](crate::prompt::PromptBuffer) until evicted
/// to satisfy the prompt token budget; eviction is permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptNode {
    pub text: String,
    pub token_count: usize,
}
