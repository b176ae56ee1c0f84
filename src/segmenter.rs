//! Fixed-window segmentation over a sanitized caption timeline.
//!
//! This is the core of the crate: a stateful pass that slides a fixed-duration
//! window across the utterance list and emits one training record per accepted
//! window. Several numeric invariants interact here:
//! - the window duration ceiling (an utterance longer than one window is skipped)
//! - the per-window token budget (over-budget windows are discarded)
//! - timestamp quantization (start/end markers snap to the configured resolution)
//! - the prompt token budget (prior-window context is trimmed head-first)
//!
//! All time arithmetic is integer milliseconds; only a token's displayed value
//! is converted to seconds, at the quantization boundary.

use anyhow::{Result, ensure};
use tracing::{debug, warn};

use crate::audio::TARGET_SAMPLE_RATE;
use crate::clip::ClipSink;
use crate::lang;
use crate::prompt::PromptBuffer;
use crate::sanitize::is_valid;
use crate::tokens::TokenCounter;
use crate::utterance::{PromptNode, Record, Utterance};

/// Default window duration: every training record covers 30 s of the timeline.
pub const WINDOW_MS: i64 = 30_000;

/// Parameters of the windowing pass.
#[derive(Debug, Clone)]
pub struct SegmenterOpts {
    /// Window duration `D` in milliseconds.
    pub window_ms: i64,
    /// Timestamp token quantization in milliseconds; must be a multiple of 20.
    pub timestamp_resolution_ms: i64,
    /// Token budget for the prompt carried into each window.
    pub max_prompt_tokens: usize,
    /// Token budget for a window's own text.
    pub max_segment_tokens: usize,
    /// Language code stamped on every record; also controls the leading space.
    pub language: String,
    /// Run length at which consecutive identical-text utterances are invalid.
    pub rep_threshold: usize,
}

impl Default for SegmenterOpts {
    fn default() -> Self {
        Self {
            window_ms: WINDOW_MS,
            timestamp_resolution_ms: 20,
            // 223 prompt tokens plus some extra for the timestamp markers.
            max_prompt_tokens: 267,
            max_segment_tokens: 219,
            language: "de".to_string(),
            rep_threshold: 3,
        }
    }
}

/// What one segmentation pass over a single audio file produced.
#[derive(Debug, Default)]
pub struct SegmentOutcome {
    pub records: Vec<Record>,
    /// Windows skipped for any reason: oversized utterance, invalid content,
    /// or token-budget overflow.
    pub windows_discarded: usize,
}

/// The windowing engine. Construct once per configuration; `process` is pure
/// per call (each audio file gets its own cursor and prompt buffer).
pub struct Segmenter<'a> {
    opts: SegmenterOpts,
    counter: &'a dyn TokenCounter,
}

impl<'a> Segmenter<'a> {
    pub fn new(opts: SegmenterOpts, counter: &'a dyn TokenCounter) -> Result<Self> {
        ensure!(opts.window_ms > 0, "window duration must be positive");
        ensure!(
            opts.timestamp_resolution_ms > 0 && opts.timestamp_resolution_ms % 20 == 0,
            "timestamp resolution must be a positive multiple of 20 ms, got {}",
            opts.timestamp_resolution_ms
        );
        ensure!(
            lang::is_supported(&opts.language),
            "unsupported language: '{}'",
            opts.language
        );

        Ok(Self { opts, counter })
    }

    /// Slide the window over `utterances` (already sanitized, sorted by start)
    /// against the decoded 16 kHz mono `samples`, writing one sub-clip per
    /// visited window through `clips` and returning the accepted records.
    pub fn process(
        &self,
        utterances: &[Utterance],
        samples: &[f32],
        clips: &mut dyn ClipSink,
    ) -> Result<SegmentOutcome> {
        let window_ms = self.opts.window_ms;

        let mut outcome = SegmentOutcome::default();
        let mut prompt_buffer = PromptBuffer::new();
        let mut segment_start = 0i64;
        let mut segment_end = window_ms;
        let mut idx = 0usize;

        while idx < utterances.len() {
            let next = &utterances[idx];

            // An utterance longer than the window can never fit in any single
            // window; skip the time it occupies without producing a record.
            if next.start_ms < segment_end && next.start_ms + window_ms < next.end_ms {
                warn!(
                    start_ms = next.start_ms,
                    end_ms = next.end_ms,
                    "skipping utterance longer than the window"
                );
                outcome.windows_discarded += 1;
                segment_start = next.end_ms;
                segment_end = segment_start + window_ms;
                idx += 1;
                continue;
            }

            // The sub-clip is written before validity or budget checks, so the
            // dump directory mirrors every window the pass visited.
            let clip_path =
                clips.write_clip(window_slice(samples, segment_start, window_ms), segment_start)?;

            let prompt = prompt_buffer.read_and_trim(self.opts.max_prompt_tokens);

            // Greedily collect every utterance starting inside this window.
            let collect_from = idx;
            while idx < utterances.len() && utterances[idx].start_ms < segment_end {
                idx += 1;
            }
            let segment_utterances = &utterances[collect_from..idx];

            if !is_valid(segment_utterances, segment_start, self.opts.rep_threshold) {
                warn!(
                    segment_start,
                    segment_end, "skipping window with invalid utterances"
                );
                outcome.windows_discarded += 1;
                // Context from before the gap would be misleading after it.
                prompt_buffer.clear();
                let last_end = segment_utterances
                    .last()
                    .map(|u| u.end_ms)
                    .unwrap_or(segment_end);
                segment_start = segment_end.max(last_end);
                segment_end = segment_start + window_ms;
                continue;
            }

            let mut text = String::new();
            let mut tokens_used = 0usize;
            for utterance in segment_utterances {
                let start_token = self.time_token(utterance.start_ms, segment_start)?;

                if utterance.end_ms <= segment_end {
                    let end_token = self.time_token(utterance.end_ms, segment_start)?;
                    let spaced = self.add_leading_space(&utterance.text);
                    let fragment = format!("{start_token}{spaced}{end_token}");
                    let cost = self.counter.encode_length(&spaced)? + 2;

                    text.push_str(&fragment);
                    tokens_used += cost;
                    prompt_buffer.push(PromptNode {
                        text: fragment,
                        token_count: cost,
                    });
                } else {
                    // The utterance continues past the window: emit only its
                    // start token. The dangling marker is a deliberate signal
                    // for "continues beyond this window"; the same utterance
                    // re-anchors the next window with a fresh start token.
                    text.push_str(&start_token);
                    tokens_used += 1;
                    prompt_buffer.push(PromptNode {
                        text: start_token,
                        token_count: 1,
                    });
                }
            }

            if tokens_used > self.opts.max_segment_tokens {
                warn!(
                    segment_start,
                    segment_end,
                    tokens = tokens_used,
                    "skipping window over the token budget"
                );
                outcome.windows_discarded += 1;
            } else {
                debug!(segment_start, segment_end, tokens = tokens_used, "accepted window");
                outcome.records.push(Record {
                    audio_path: clip_path,
                    text,
                    language: self.opts.language.clone(),
                    prompt,
                });
            }

            // Advance to the next window.
            match segment_utterances.last() {
                // A silent window: step forward one full duration.
                None => segment_start += window_ms,
                // Tight packing: the next window starts where the last
                // utterance ended.
                Some(last) if last.end_ms <= segment_end => segment_start = last.end_ms,
                // The last utterance spilled past the window; rewind the cursor
                // so it is re-collected as the anchor of the next window.
                Some(last) => {
                    segment_start = last.start_ms;
                    idx -= 1;
                }
            }
            segment_end = segment_start + window_ms;
        }

        Ok(outcome)
    }

    /// Format a quantized timestamp token for a time inside the current window.
    ///
    /// `time_token(1200, 1000)` with a 20 ms resolution yields `"<|0.20|>"`.
    fn time_token(&self, time_ms: i64, segment_start: i64) -> Result<String> {
        ensure!(
            time_ms >= segment_start && time_ms <= segment_start + self.opts.window_ms,
            "time {time_ms}ms is outside the window starting at {segment_start}ms"
        );

        let in_segment = time_ms - segment_start;
        let resolution = self.opts.timestamp_resolution_ms;
        // Round half up in integer milliseconds; only the displayed value
        // becomes seconds.
        let quantized = (in_segment + resolution / 2) / resolution * resolution;

        Ok(format!("<|{:.2}|>", quantized as f64 / 1000.0))
    }

    fn add_leading_space(&self, text: &str) -> String {
        if lang::uses_word_spaces(&self.opts.language) {
            format!(" {text}")
        } else {
            text.to_string()
        }
    }
}

/// Slice the samples covering `[segment_start_ms, segment_start_ms + window_ms)`,
/// clamped to the available audio.
fn window_slice(samples: &[f32], segment_start_ms: i64, window_ms: i64) -> &[f32] {
    let rate = TARGET_SAMPLE_RATE as i64;
    let start = (segment_start_ms.max(0) * rate / 1000) as usize;
    let len = (window_ms * rate / 1000) as usize;

    let start = start.min(samples.len());
    let end = (start + len).min(samples.len());
    &samples[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::ApproxTokenCounter;

    /// A [`ClipSink`] that records slice lengths instead of touching the disk.
    struct CaptureClipSink {
        clips: Vec<(i64, usize)>,
    }

    impl CaptureClipSink {
        fn new() -> Self {
            Self { clips: Vec::new() }
        }
    }

    impl ClipSink for CaptureClipSink {
        fn write_clip(&mut self, samples: &[f32], segment_start_ms: i64) -> Result<String> {
            self.clips.push((segment_start_ms, samples.len()));
            Ok(format!("/dump/{segment_start_ms}.wav"))
        }
    }

    fn u(text: &str, start_ms: i64, end_ms: i64) -> Utterance {
        Utterance::new(text, start_ms, end_ms)
    }

    fn opts(language: &str) -> SegmenterOpts {
        SegmenterOpts {
            language: language.to_string(),
            ..SegmenterOpts::default()
        }
    }

    fn samples_ms(ms: i64) -> Vec<f32> {
        vec![0.0; (ms * TARGET_SAMPLE_RATE as i64 / 1000) as usize]
    }

    #[test]
    fn rejects_a_resolution_that_is_not_a_multiple_of_20() {
        let counter = ApproxTokenCounter;
        let bad = SegmenterOpts {
            timestamp_resolution_ms: 25,
            ..opts("en")
        };
        assert!(Segmenter::new(bad, &counter).is_err());
    }

    #[test]
    fn rejects_an_unknown_language() {
        let counter = ApproxTokenCounter;
        assert!(Segmenter::new(opts("klingon"), &counter).is_err());
    }

    #[test]
    fn time_token_quantizes_relative_to_the_window() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;

        assert_eq!(segmenter.time_token(1_200, 1_000)?, "<|0.20|>");
        assert_eq!(segmenter.time_token(0, 0)?, "<|0.00|>");
        assert_eq!(segmenter.time_token(29_990, 0)?, "<|30.00|>");
        // Half-resolution instants round up.
        assert_eq!(segmenter.time_token(1_010, 1_000)?, "<|0.02|>");
        Ok(())
    }

    #[test]
    fn time_token_rejects_times_outside_the_window() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        assert!(segmenter.time_token(500, 1_000).is_err());
        assert!(segmenter.time_token(40_000, 1_000).is_err());
        Ok(())
    }

    #[test]
    fn two_fitting_utterances_yield_one_record() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        let utterances = vec![u("hello there", 1_000, 3_000), u("general kenobi", 4_000, 6_000)];
        let samples = samples_ms(10_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.windows_discarded, 0);
        let record = &outcome.records[0];
        assert_eq!(
            record.text,
            "<|1.00|> hello there<|3.00|><|4.00|> general kenobi<|6.00|>"
        );
        assert_eq!(record.prompt, "");
        assert_eq!(record.audio_path, "/dump/0.wav");
        Ok(())
    }

    #[test]
    fn spaceless_language_omits_the_leading_space() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("ja"), &counter)?;
        let utterances = vec![u("こんにちは", 0, 2_000)];
        let samples = samples_ms(5_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;
        assert_eq!(outcome.records[0].text, "<|0.00|>こんにちは<|2.00|>");
        Ok(())
    }

    #[test]
    fn oversized_utterance_is_skipped_without_a_record() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        // 45 s long: cannot fit in any 30 s window.
        let utterances = vec![u("marathon", 1_000, 46_000), u("after", 47_000, 48_000)];
        let samples = samples_ms(60_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.windows_discarded, 1);
        // The next window starts at the oversized utterance's end.
        assert_eq!(clips.clips[0].0, 46_000);
        assert_eq!(
            outcome.records[0].text,
            "<|1.00|> after<|2.00|>"
        );
        Ok(())
    }

    #[test]
    fn boundary_spanning_utterance_leaves_a_dangling_start_token() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        // The second utterance starts inside the first window but ends past it.
        let utterances = vec![u("first", 0, 2_000), u("spans", 25_000, 35_000)];
        let samples = samples_ms(60_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        assert_eq!(outcome.records.len(), 2);
        // First window: the spanning utterance contributes only a start token.
        assert_eq!(
            outcome.records[0].text,
            "<|0.00|> first<|2.00|><|25.00|>"
        );
        // It re-anchors the next window (which starts at its own start) and is
        // emitted again, in full, with a fresh start token.
        assert_eq!(clips.clips[1].0, 25_000);
        assert_eq!(
            outcome.records[1].text,
            "<|0.00|> spans<|10.00|>"
        );
        Ok(())
    }

    #[test]
    fn prompt_carries_prior_window_text() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        let utterances = vec![u("early words", 1_000, 2_000), u("later words", 31_000, 32_000)];
        let samples = samples_ms(60_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].prompt, "");
        assert_eq!(outcome.records[1].prompt, "<|1.00|> early words<|2.00|>");
        Ok(())
    }

    #[test]
    fn invalid_window_is_discarded_and_resets_the_prompt() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        // The second window collects an overlapping pair and is discarded.
        let utterances = vec![
            u("fine", 1_000, 2_000),
            u("overlap a", 30_000, 31_500),
            u("overlap b", 31_000, 31_900),
            u("clean again", 40_000, 42_000),
        ];
        let samples = samples_ms(60_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        assert_eq!(outcome.windows_discarded, 1);
        let texts: Vec<&str> = outcome.records.iter().map(|r| r.text.as_str()).collect();
        assert!(texts.iter().all(|t| !t.contains("overlap")));
        // The prompt was cleared by the discarded window, so the next accepted
        // record carries no context.
        let last = outcome.records.last().expect("a record after the gap");
        assert!(last.text.contains("clean again"));
        assert_eq!(last.prompt, "");
        Ok(())
    }

    #[test]
    fn over_budget_window_is_discarded_but_clips_are_still_written() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let tight = SegmenterOpts {
            max_segment_tokens: 3,
            ..opts("en")
        };
        let segmenter = Segmenter::new(tight, &counter)?;
        let utterances = vec![u("far too many words to fit in three tokens", 0, 2_000)];
        let samples = samples_ms(5_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.windows_discarded, 1);
        assert_eq!(clips.clips.len(), 1);
        Ok(())
    }

    #[test]
    fn gap_between_utterances_produces_silence_records() -> anyhow::Result<()> {
        let counter = ApproxTokenCounter;
        let segmenter = Segmenter::new(opts("en"), &counter)?;
        // Nothing between 2 s and 80 s: after the first window the pass steps
        // through silent windows until the next utterance is in range.
        let utterances = vec![u("start", 1_000, 2_000), u("end", 80_000, 81_000)];
        let samples = samples_ms(90_000);
        let mut clips = CaptureClipSink::new();

        let outcome = segmenter.process(&utterances, &samples, &mut clips)?;

        let silence: Vec<&Record> =
            outcome.records.iter().filter(|r| r.text.is_empty()).collect();
        assert!(!silence.is_empty());
        assert!(outcome.records.iter().any(|r| r.text.contains("start")));
        assert!(outcome.records.iter().any(|r| r.text.contains("end")));
        Ok(())
    }

    #[test]
    fn window_slice_clamps_to_available_audio() {
        let samples = vec![0.0f32; 16_000]; // 1 s
        assert_eq!(window_slice(&samples, 0, 30_000).len(), 16_000);
        assert_eq!(window_slice(&samples, 500, 30_000).len(), 8_000);
        assert_eq!(window_slice(&samples, 60_000, 30_000).len(), 0);
    }
}
