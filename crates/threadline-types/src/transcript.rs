//! [`Transcript`] and [`QualityAssessment`] data types.

use serde::{Deserialize, Serialize};

/// One timed segment of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Segment text.
    pub text: String,
    /// Start time in seconds.
    pub start_s: f64,
    /// End time in seconds.
    pub end_s: f64,
    /// Transcriber-reported confidence, `0.0..=1.0` when known.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Output of the `Transcribe` stage.
///
/// Lifecycle: created by the transcriber, immutable once
/// returned, discarded after stage completion unless persisted by the
/// memory step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Timed segments, in order.
    pub segments: Vec<TranscriptSegment>,
    /// BCP-47 language tag, when known.
    pub language: Option<String>,
    /// Source media URL this transcript was produced from.
    pub source_url: String,
    /// Total media duration in seconds.
    pub duration_s: f64,
}

impl Transcript {
    /// Concatenate all segment text with single spaces, the form the
    /// quality filter and lightweight-finalize summary operate on.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True when the transcript has no meaningful content -- the
    /// post-transcription early-exit checkpoint B condition.
    pub fn is_degenerate(&self) -> bool {
        self.full_text().split_whitespace().count() < 3
    }
}

/// Output of the deterministic quality filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Total word count.
    pub word_count: usize,
    /// Total sentence count.
    pub sentence_count: usize,
    /// `word_count / max(1, sentence_count)`.
    pub avg_sentence_length: f64,
    /// Lexical diversity + sentence-length consistency, weighted 0.5/0.5.
    pub coherence_score: f64,
    /// Top-5 content-word frequency mass ratio.
    pub topic_clarity_score: f64,
    /// Fraction of sentences with length in `[5, 40]` words.
    pub language_quality_score: f64,
    /// Weighted composite of the above plus normalized word/sentence counts.
    pub overall_score: f64,
    /// Whether the transcript should proceed to full analysis.
    pub should_process_fully: bool,
    /// Concatenated failing-threshold labels, present when bypassing.
    #[serde(default)]
    pub bypass_reason: Option<String>,
    /// How many of the four threshold checks passed (`0..=4`).
    pub metrics_passed: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.into(),
            start_s: start,
            end_s: end,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn full_text_joins_segments_with_spaces() {
        let t = Transcript {
            segments: vec![seg("hello", 0.0, 1.0), seg("world", 1.0, 2.0)],
            language: Some("en".into()),
            source_url: "https://example.com/v/1".into(),
            duration_s: 2.0,
        };
        assert_eq!(t.full_text(), "hello world");
    }

    #[test]
    fn degenerate_transcript_detected() {
        let t = Transcript {
            segments: vec![seg("um", 0.0, 1.0)],
            language: None,
            source_url: "u".into(),
            duration_s: 1.0,
        };
        assert!(t.is_degenerate());
    }

    #[test]
    fn non_degenerate_transcript_not_flagged() {
        let t = Transcript {
            segments: vec![seg("this is a reasonably long segment of speech", 0.0, 5.0)],
            language: None,
            source_url: "u".into(),
            duration_s: 5.0,
        };
        assert!(!t.is_degenerate());
    }
}
