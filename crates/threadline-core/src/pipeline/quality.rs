//! The deterministic quality filter: a pure function scoring a
//! transcript's likelihood of yielding value downstream, driving the
//! bypass-to-lightweight-path decision. No I/O, no randomness, no clock.

use threadline_types::config::QualityConfig;
use threadline_types::transcript::QualityAssessment;

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "vs", "etc", "inc", "ltd", "st", "e.g", "i.e",
];

fn is_sentence_boundary(prev_word: &str) -> bool {
    let trimmed = prev_word.trim_end_matches(['.', '!', '?']).to_lowercase();
    !ABBREVIATIONS.contains(&trimmed.as_str())
}

/// Split `text` into sentences on `.`/`!`/`?` boundaries, treating a small
/// list of abbreviations as non-terminal.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let tokens: Vec<&str> = text.split_whitespace().collect();

    for (i, tok) in tokens.iter().enumerate() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(tok);

        let ends_sentence = tok.ends_with(['.', '!', '?']);
        if ends_sentence && (i == tokens.len() - 1 || is_sentence_boundary(tok)) {
            sentences.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

fn strip_punctuation(word: &str) -> String {
    word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase()
}

fn words_in(sentence: &str) -> Vec<String> {
    sentence
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|w| !w.is_empty())
        .collect()
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn norm(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    clamp01((value - lo) / (hi - lo))
}

fn stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// A short list of function words excluded when computing topic clarity, so
// the top-5 content words reflect subject matter rather than grammar.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "for", "is", "are", "was",
    "were", "it", "that", "this", "with", "as", "at", "by", "be", "we", "you", "i", "they",
];

fn topic_clarity(words: &[String]) -> f64 {
    use std::collections::HashMap;
    let mut freq: HashMap<&str, usize> = HashMap::new();
    let mut content_total = 0usize;
    for w in words {
        if STOPWORDS.contains(&w.as_str()) || w.is_empty() {
            continue;
        }
        *freq.entry(w.as_str()).or_insert(0) += 1;
        content_total += 1;
    }
    if content_total == 0 {
        return 0.0;
    }
    let mut counts: Vec<usize> = freq.into_values().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let top5: usize = counts.into_iter().take(5).sum();
    clamp01(top5 as f64 / content_total as f64)
}

/// Score `text` against `config`'s thresholds. Pure, referentially
/// transparent, and CPU-bound only -- callers running this over very long
/// transcripts should yield cooperatively between chunks, which
/// this function does not itself need to do given typical transcript sizes.
pub fn assess(text: &str, config: &QualityConfig) -> QualityAssessment {
    let sentences = split_sentences(text);
    let sentence_word_lists: Vec<Vec<String>> = sentences.iter().map(|s| words_in(s)).collect();
    let all_words: Vec<String> = sentence_word_lists.iter().flatten().cloned().collect();

    let word_count = all_words.len();
    let sentence_count = sentences.len();
    let avg_sentence_length = word_count as f64 / sentence_count.max(1) as f64;

    let unique_words = {
        use std::collections::HashSet;
        all_words.iter().collect::<HashSet<_>>().len()
    };
    let lexical_diversity = if word_count == 0 {
        0.0
    } else {
        clamp01(unique_words as f64 / word_count as f64)
    };

    let sentence_lengths: Vec<f64> = sentence_word_lists.iter().map(|w| w.len() as f64).collect();
    let length_mean = mean(&sentence_lengths);
    let length_consistency = if length_mean == 0.0 {
        0.0
    } else {
        clamp01(1.0 - clamp01(stdev(&sentence_lengths) / length_mean))
    };

    let coherence_score = clamp01(0.5 * lexical_diversity + 0.5 * length_consistency);
    let topic_clarity_score = topic_clarity(&all_words);

    let in_range_count = sentence_word_lists
        .iter()
        .filter(|w| (5..=40).contains(&w.len()))
        .count();
    let language_quality_score = if sentence_count == 0 {
        0.0
    } else {
        clamp01(in_range_count as f64 / sentence_count as f64)
    };

    let overall_score = clamp01(
        0.25 * norm(word_count as f64, 0.0, 2000.0)
            + 0.15 * norm(sentence_count as f64, 0.0, 40.0)
            + 0.25 * coherence_score
            + 0.2 * topic_clarity_score
            + 0.15 * language_quality_score,
    );

    let mut failing = Vec::new();
    let mut metrics_passed = 0u8;
    if word_count >= config.min_word_count {
        metrics_passed += 1;
    } else {
        failing.push("words");
    }
    if sentence_count >= config.min_sentence_count {
        metrics_passed += 1;
    } else {
        failing.push("sentences");
    }
    if coherence_score >= config.min_coherence {
        metrics_passed += 1;
    } else {
        failing.push("coherence");
    }
    if overall_score >= config.min_overall {
        metrics_passed += 1;
    } else {
        failing.push("overall score");
    }

    let should_process_fully = metrics_passed >= 3;
    let bypass_reason = if should_process_fully {
        None
    } else {
        Some(format!("failed thresholds: {}", failing.join(", ")))
    };

    QualityAssessment {
        word_count,
        sentence_count,
        avg_sentence_length,
        coherence_score,
        topic_clarity_score,
        language_quality_score,
        overall_score,
        should_process_fully,
        bypass_reason,
        metrics_passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_scores_stay_in_unit_range() {
        let text = "This is a perfectly reasonable sentence. It has decent structure and variety. \
                     Another sentence follows with different words entirely. And a fourth one for good measure.";
        let assessment = assess(text, &QualityConfig::default());
        assert!((0.0..=1.0).contains(&assessment.coherence_score));
        assert!((0.0..=1.0).contains(&assessment.topic_clarity_score));
        assert!((0.0..=1.0).contains(&assessment.language_quality_score));
        assert!((0.0..=1.0).contains(&assessment.overall_score));
    }

    #[test]
    fn deterministic_given_identical_input() {
        let text = "Repeat this transcript exactly. Twice over for the determinism check.";
        let config = QualityConfig::default();
        let a = assess(text, &config);
        let b = assess(text, &config);
        assert_eq!(a.word_count, b.word_count);
        assert_eq!(a.overall_score, b.overall_score);
        assert_eq!(a.should_process_fully, b.should_process_fully);
    }

    #[test]
    fn low_quality_transcript_bypasses() {
        let text = "Um. Yeah. Not sure. Ok.";
        let assessment = assess(text, &QualityConfig::default());
        assert!(!assessment.should_process_fully);
        let reason = assessment.bypass_reason.unwrap();
        assert!(reason.contains("words"));
        assert!(reason.contains("sentences"));
    }

    #[test]
    fn rich_transcript_passes() {
        let sentence = "This is a reasonably long and coherent sentence about a specific topic. ";
        let text = sentence.repeat(90);
        let assessment = assess(&text, &QualityConfig::default());
        assert!(assessment.word_count > 500);
        assert!(assessment.sentence_count > 10);
        assert!(assessment.metrics_passed >= 3);
    }

    #[test]
    fn abbreviation_does_not_split_sentence() {
        let text = "Dr. Smith gave a talk. It was well received.";
        let sentences = split_sentences(text);
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("Dr. Smith"));
    }

    #[test]
    fn empty_transcript_yields_zero_scores_not_panic() {
        let assessment = assess("", &QualityConfig::default());
        assert_eq!(assessment.word_count, 0);
        assert_eq!(assessment.overall_score, 0.0);
        assert!(!assessment.should_process_fully);
    }
}
