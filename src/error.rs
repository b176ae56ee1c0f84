use std::error::Error as StdError;

use thiserror::Error;

/// Segprep's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Segprep's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
///
/// The caption variants are typed (rather than folded into `Message`) so batch drivers can
/// match on them and decide whether a missing or unparsable transcript aborts the run or
/// merely skips that audio id.
#[derive(Debug, Error)]
pub enum Error {
    /// No caption file was found for an audio id in any configured format.
    #[error("no caption file found for '{0}'")]
    CaptionMissing(String),

    /// Caption files were found for an audio id, but none of them parsed.
    #[error("no caption file for '{0}' could be parsed")]
    CaptionUnparsable(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Whether this error concerns a single audio id (and can be skipped in a batch)
    /// rather than the run as a whole.
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::CaptionMissing(_) | Self::CaptionUnparsable(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
