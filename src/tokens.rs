//! The token-length oracle injected into the segmenter.
//!
//! Token budgets are enforced against the model's own tokenization, so the
//! segmenter never tokenizes text itself; it asks a [`TokenCounter`]. The
//! counter is stateless per call and safe to share across worker threads.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tokenizers::Tokenizer;

/// Counts how many model tokens a piece of text encodes to.
pub trait TokenCounter: Send + Sync {
    fn encode_length(&self, text: &str) -> Result<usize>;
}

/// A [`TokenCounter`] backed by a Hugging Face `tokenizer.json` file.
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|err| anyhow!("{err}"))
            .with_context(|| format!("failed to load tokenizer from '{}'", path.display()))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn encode_length(&self, text: &str) -> Result<usize> {
        // No special tokens: we count only the text itself; timestamp markers
        // are budgeted separately by the segmenter.
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|err| anyhow!("{err}"))?;
        Ok(encoding.get_ids().len())
    }
}

/// A tokenizer-free estimate for runs without a `tokenizer.json`.
///
/// Roughly one token per four bytes, and at least one per whitespace-separated
/// word. Coarse, but good enough for budget enforcement and tests.
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn encode_length(&self, text: &str) -> Result<usize> {
        let words = text.split_whitespace().count();
        let by_bytes = text.len().div_ceil(4);
        Ok(words.max(by_bytes))
    }
}
