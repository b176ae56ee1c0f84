//! Caption-file parsing.
//!
//! Both supported formats are line-oriented: a `start --> end` timing line per
//! cue, cue text on the following lines until a blank line or the next timing
//! line. They differ only in the file name they resolve for an audio id and in
//! which millisecond separator (`,` vs `.`) their tooling conventionally emits;
//! we accept both separators everywhere, so one parser serves both formats.

use anyhow::{Context, Result, bail};

use crate::utterance::Utterance;

/// A caption file format tried when resolving the transcript for an audio id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum CaptionFormat {
    /// SubRip (`{id}.srt`).
    Srt,
    /// WebVTT (`{id}.vtt`).
    Vtt,
}

impl CaptionFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }

    /// The caption file name this format resolves for an audio id.
    pub fn file_name(&self, id: &str) -> String {
        format!("{id}.{}", self.extension())
    }
}

impl std::fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parse the raw text of one caption file into utterances in file order.
///
/// Cues are anchored on timing lines; anything before the first timing line
/// (WebVTT headers, SRT cue numbers) is ignored. Multi-line cue text is joined
/// with single spaces and trimmed. Cues whose trimmed text is empty are dropped:
/// with time-aligned data, silent spans are reconstructed later purely from
/// timing gaps, so empty cues carry no information.
///
/// A malformed timing line fails the whole file so the caller can fall through
/// to the next configured format.
pub fn parse_captions(raw: &str) -> Result<Vec<Utterance>> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut utterances = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if !line.contains(" --> ") {
            i += 1;
            continue;
        }

        let (start_ms, end_ms) =
            parse_timing_line(line).with_context(|| format!("bad timing line {}", i + 1))?;

        // Collect cue text until a blank line or the next timing line.
        let mut parts: Vec<&str> = Vec::new();
        i += 1;
        while i < lines.len() {
            let text_line = lines[i].trim();
            if text_line.is_empty() || text_line.contains(" --> ") {
                break;
            }
            parts.push(text_line);
            i += 1;
        }

        let text = parts.join(" ").trim().to_string();
        if !text.is_empty() {
            utterances.push(Utterance::new(text, start_ms, end_ms));
        }
    }

    Ok(utterances)
}

fn parse_timing_line(line: &str) -> Result<(i64, i64)> {
    let mut halves = line.split(" --> ");
    let (Some(start), Some(end), None) = (halves.next(), halves.next(), halves.next()) else {
        bail!("expected exactly one '-->' separator in '{line}'");
    };

    Ok((str_to_milliseconds(start)?, str_to_milliseconds(end)?))
}

/// Convert a `HH:MM:SS,mmm` or `HH:MM:SS.mmm` time string to milliseconds.
pub fn str_to_milliseconds(s: &str) -> Result<i64> {
    let s = s.trim();
    let Some((clock, millis)) = s.split_once(',').or_else(|| s.split_once('.')) else {
        bail!("invalid time '{s}': expected 00:00:00,000 or 00:00:00.000");
    };

    let fields: Vec<&str> = clock.split(':').collect();
    let [hours, minutes, seconds] = fields.as_slice() else {
        bail!("invalid time '{s}': expected three ':'-separated clock fields");
    };

    let hours: i64 = parse_field(hours, s)?;
    let minutes: i64 = parse_field(minutes, s)?;
    let seconds: i64 = parse_field(seconds, s)?;
    let millis: i64 = parse_field(millis, s)?;

    Ok((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
}

fn parse_field(field: &str, whole: &str) -> Result<i64> {
    field
        .parse()
        .with_context(|| format!("invalid time '{whole}': non-numeric field '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_millisecond_separators_parse() -> anyhow::Result<()> {
        assert_eq!(str_to_milliseconds("00:01:02,500")?, 62_500);
        assert_eq!(str_to_milliseconds("00:01:02.500")?, 62_500);
        assert_eq!(str_to_milliseconds("01:00:00,000")?, 3_600_000);
        Ok(())
    }

    #[test]
    fn bad_time_strings_are_rejected() {
        assert!(str_to_milliseconds("00:01:02").is_err());
        assert!(str_to_milliseconds("00:01:02,abc").is_err());
        assert!(str_to_milliseconds("01:02,500").is_err());
    }

    #[test]
    fn parses_srt_cues_in_file_order() -> anyhow::Result<()> {
        let raw = "1\n00:00:01,000 --> 00:00:03,000\nhello there\n\n2\n00:00:04,000 --> 00:00:06,000\ngeneral kenobi\n";
        let utterances = parse_captions(raw)?;
        assert_eq!(
            utterances,
            vec![
                Utterance::new("hello there", 1_000, 3_000),
                Utterance::new("general kenobi", 4_000, 6_000),
            ]
        );
        Ok(())
    }

    #[test]
    fn parses_vtt_and_ignores_the_header() -> anyhow::Result<()> {
        let raw = "WEBVTT\n\n00:00:00.500 --> 00:00:02.000\nfirst\nline two\n\n00:00:02.500 --> 00:00:04.000\nsecond\n";
        let utterances = parse_captions(raw)?;
        assert_eq!(
            utterances,
            vec![
                Utterance::new("first line two", 500, 2_000),
                Utterance::new("second", 2_500, 4_000),
            ]
        );
        Ok(())
    }

    #[test]
    fn empty_cues_are_dropped() -> anyhow::Result<()> {
        let raw = "00:00:01,000 --> 00:00:02,000\n\n00:00:03,000 --> 00:00:04,000\nkept\n";
        let utterances = parse_captions(raw)?;
        assert_eq!(utterances, vec![Utterance::new("kept", 3_000, 4_000)]);
        Ok(())
    }

    #[test]
    fn final_cue_without_trailing_blank_line_is_kept() -> anyhow::Result<()> {
        let raw = "00:00:01,000 --> 00:00:02,000\nlast words";
        let utterances = parse_captions(raw)?;
        assert_eq!(utterances, vec![Utterance::new("last words", 1_000, 2_000)]);
        Ok(())
    }

    #[test]
    fn malformed_timing_line_fails_the_file() {
        let raw = "00:00:01,000 --> oops\ntext\n";
        assert!(parse_captions(raw).is_err());
    }
}
