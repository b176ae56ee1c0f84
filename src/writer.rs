//! The JSON-lines record sink.
//!
//! One JSON object per line, appended in the order records are produced.
//! Non-ASCII text is written verbatim (serde_json does not escape it), which
//! keeps the training data readable and byte-for-byte stable.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::utterance::Record;

/// An append-only writer of training records.
///
/// Construction is the fail-fast guard against mixing runs: `create` refuses a
/// path that already exists. Partial output is not resumable; an interrupted
/// run must restart against a fresh output path.
#[derive(Debug)]
pub struct RecordWriter {
    w: BufWriter<File>,
    path: PathBuf,
}

impl RecordWriter {
    /// Open a fresh output file. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| {
                format!(
                    "output file '{}' must not already exist",
                    path.display()
                )
            })?;

        Ok(Self {
            w: BufWriter::new(file),
            path,
        })
    }

    /// Open `path` truncated, replacing whatever was there.
    ///
    /// Only the silence subsampler rewrites an existing output; everything else
    /// goes through [`RecordWriter::create`].
    pub(crate) fn create_truncated(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("failed to rewrite output file '{}'", path.display()))?;

        Ok(Self {
            w: BufWriter::new(file),
            path,
        })
    }

    /// Append one record as a single JSON line.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.w, record)
            .with_context(|| format!("failed to serialize record to '{}'", self.path.display()))?;
        self.w.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read all records back from a JSON-lines file.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line).with_context(|| {
            format!("invalid record on line {} of '{}'", line_no + 1, path.display())
        })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> Record {
        Record {
            audio_path: "/tmp/clip/0.wav".to_string(),
            text: text.to_string(),
            language: "en".to_string(),
            prompt: String::new(),
        }
    }

    #[test]
    fn create_refuses_an_existing_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.json");
        std::fs::write(&path, "old run\n")?;

        let err = RecordWriter::create(&path).unwrap_err();
        assert!(err.to_string().contains("must not already exist"));
        Ok(())
    }

    #[test]
    fn appended_records_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.json");

        let mut writer = RecordWriter::create(&path)?;
        writer.append(&record("<|0.00|> hello<|1.00|>"))?;
        writer.append(&record(""))?;
        writer.flush()?;

        let records = read_records(&path)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "<|0.00|> hello<|1.00|>");
        assert_eq!(records[1].text, "");
        Ok(())
    }

    #[test]
    fn non_ascii_text_is_written_verbatim() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.json");

        let mut writer = RecordWriter::create(&path)?;
        writer.append(&record("Grüße, 世界"))?;
        writer.flush()?;

        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.contains("Grüße, 世界"));
        assert!(!raw.contains("\\u"));
        Ok(())
    }

    #[test]
    fn field_order_matches_the_output_contract() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.json");

        let mut writer = RecordWriter::create(&path)?;
        writer.append(&record("hi"))?;
        writer.flush()?;

        let raw = std::fs::read_to_string(&path)?;
        let audio = raw.find("\"audio_path\"").expect("audio_path present");
        let text = raw.find("\"text\"").expect("text present");
        let language = raw.find("\"language\"").expect("language present");
        let prompt = raw.find("\"prompt\"").expect("prompt present");
        assert!(audio < text && text < language && language < prompt);
        Ok(())
    }
}
