//! Silence subsampling post-pass.
//!
//! Windows with no utterances still produce records (empty `text`) so the model
//! sees silence during training, but long-form audio yields far more of them
//! than is useful. This pass rewrites the output keeping all non-silence
//! records plus every Nth silence record.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::writer::{self, RecordWriter};

/// Rewrite `output` keeping every non-silence record and every `factor`-th
/// silence record (a record is silence iff its `text` is empty).
///
/// Non-silence records come first in the rewritten file, followed by the kept
/// silence records; a factor of 1 or less is a no-op.
pub fn subsample_silence(output: impl AsRef<Path>, factor: usize) -> Result<()> {
    if factor <= 1 {
        return Ok(());
    }

    let output = output.as_ref();
    let records = writer::read_records(output)?;
    let total = records.len();

    let (silence, speech): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|record| record.text.is_empty());

    let mut kept = speech;
    kept.extend(silence.into_iter().step_by(factor));

    let mut w = RecordWriter::create_truncated(output)?;
    for record in &kept {
        w.append(record)?;
    }
    w.flush()?;

    info!(
        before = total,
        after = kept.len(),
        factor,
        "subsampled silence records"
    );
    Ok(())
}
