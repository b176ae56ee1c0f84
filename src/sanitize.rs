//! Utterance validity checking and best-effort timing repair.
//!
//! Machine-aligned captions (forced alignment, VAD-gated decoders) regularly
//! produce overlapping cues, inverted ranges, and hallucinated repetition
//! loops. The repair pass here fixes what it can and leaves the rest to be
//! skipped per-window by the segmenter's validity check; it never errors.

use tracing::debug;

use crate::utterance::Utterance;

// Sentinel ranges appended around the working list so every real element has a
// neighbor on both sides during timing repair. Both are removed afterwards.
const HEAD_SENTINEL: (i64, i64) = (-100, -99);
const TAIL_SENTINEL: (i64, i64) = (9_999_999_999_999, 99_999_999_999_999);

/// The validity predicate shared by the global sanitize decision and the
/// per-window acceptance check.
///
/// `utterances` is valid with respect to `segment_start_ms` iff:
/// - every start is at or after `segment_start_ms`
/// - every start is at or before its end
/// - no utterance's end exceeds the next utterance's start
/// - no run of `rep_threshold` or more consecutive identical-text utterances exists
///
/// An empty slice is valid.
pub fn is_valid(utterances: &[Utterance], segment_start_ms: i64, rep_threshold: usize) -> bool {
    for utterance in utterances {
        if utterance.start_ms < segment_start_ms {
            return false;
        }
        if utterance.start_ms > utterance.end_ms {
            return false;
        }
    }

    let mut repeat_count = 1;
    for pair in utterances.windows(2) {
        if pair[0].end_ms > pair[1].start_ms {
            return false;
        }

        if pair[0].text == pair[1].text {
            repeat_count += 1;
            if repeat_count >= rep_threshold {
                return false;
            }
        } else {
            repeat_count = 1;
        }
    }

    true
}

/// Repair a noisy utterance list: collapse repetition loops, drop empty cues,
/// then fix degenerate timing by merging into neighbors.
///
/// Best-effort: the output is not guaranteed valid on pathological input (the
/// per-window validity check catches leftovers), but running `sanitize` on
/// already-valid input returns it unchanged.
pub fn sanitize(utterances: &[Utterance], rep_threshold: usize) -> Vec<Utterance> {
    if utterances.is_empty() {
        return Vec::new();
    }

    let mut working = drop_repeated_runs(utterances, rep_threshold);
    working.retain(|u| !u.text.trim().is_empty());

    let repaired = repair_timing(working);
    debug!(
        before = utterances.len(),
        after = repaired.len(),
        "sanitized utterance list"
    );
    repaired
}

/// Delete maximal runs of `threshold` or more consecutive identical-text
/// utterances in full.
///
/// Over-threshold runs are looping artifacts from the upstream decoder, so the
/// whole run is untrustworthy, not just the copies past the first. Runs below
/// the threshold are legitimate repetition and kept verbatim.
fn drop_repeated_runs(utterances: &[Utterance], threshold: usize) -> Vec<Utterance> {
    let mut kept = Vec::with_capacity(utterances.len());

    let mut run_start = 0;
    for i in 1..=utterances.len() {
        if i == utterances.len() || utterances[i].text != utterances[run_start].text {
            if i - run_start < threshold {
                kept.extend_from_slice(&utterances[run_start..i]);
            }
            run_start = i;
        }
    }

    kept
}

/// Sort by start time and merge degenerate utterances (`start >= end`) into a
/// neighbor: into the previous kept utterance when their ranges intersect,
/// otherwise forward into the next element of the working array.
fn repair_timing(mut working: Vec<Utterance>) -> Vec<Utterance> {
    // Sentinels guarantee a previous and a next element for every real cue.
    working.insert(
        0,
        Utterance::new("", HEAD_SENTINEL.0, HEAD_SENTINEL.1),
    );
    working.push(Utterance::new("", TAIL_SENTINEL.0, TAIL_SENTINEL.1));
    working.sort_by_key(|u| u.start_ms);

    let mut repaired: Vec<Utterance> = Vec::with_capacity(working.len());

    let mut i = 0;
    while i < working.len() {
        let current = working[i].clone();

        if current.start_ms < current.end_ms {
            repaired.push(current);
            i += 1;
            continue;
        }

        // Degenerate timing: fold the cue into whichever neighbor it belongs to.
        let merged_backward = match repaired.last_mut() {
            Some(prev) if ranges_intersect(prev, &current) => {
                prev.text = format!("{} {}", prev.text, current.text);
                prev.start_ms = prev.start_ms.min(current.start_ms);
                prev.end_ms = prev.end_ms.max(current.end_ms);
                true
            }
            _ => false,
        };

        if !merged_backward {
            if let Some(next) = working.get_mut(i + 1) {
                next.text = format!("{} {}", current.text, next.text);
                next.start_ms = next.start_ms.min(current.start_ms);
                next.end_ms = next.end_ms.max(current.end_ms);
            }
        }

        i += 1;
    }

    // Remove the sentinels (along with anything that was folded into them; text
    // absorbed by a sentinel had no sensible home on the timeline anyway).
    repaired.pop();
    if !repaired.is_empty() {
        repaired.remove(0);
    }
    repaired
}

fn ranges_intersect(prev: &Utterance, current: &Utterance) -> bool {
    let range = prev.start_ms..=prev.end_ms;
    range.contains(&current.start_ms) || range.contains(&current.end_ms)
}
