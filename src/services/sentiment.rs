// =============================================================================
// Keyword sentiment scorer
// =============================================================================
//
// Out of scope per spec.md §1: "the thin sentiment-keyword scorer". This is
// the smallest concrete thing MarketOverviewService's aggregation (§4.5) has
// to aggregate over — a lexicon lookup, not an NLP model.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
}

/// Bucket threshold shared by per-article and market-level classification (§4.5 step 3/6).
pub const NEUTRAL_THRESHOLD: f64 = 0.1;

pub fn label_for_score(score: f64) -> SentimentLabel {
    if score > NEUTRAL_THRESHOLD {
        SentimentLabel::Positive
    } else if score < -NEUTRAL_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "surge", "surges", "surged", "rally", "rallies", "gain", "gains", "gained", "beat", "beats",
    "soar", "soars", "soared", "upgrade", "upgraded", "record", "growth", "profit", "profitable",
    "bullish", "outperform", "strong", "rise", "rises", "rising", "optimis",
];

const NEGATIVE_WORDS: &[&str] = &[
    "plunge", "plunges", "plunged", "slump", "slumps", "slumped", "loss", "losses", "miss",
    "misses", "downgrade", "downgraded", "bearish", "underperform", "weak", "fall", "falls",
    "falling", "recession", "lawsuit", "investigation", "fraud", "crash", "crashed", "layoff",
];

/// Score one piece of text by counting lexicon hits. Confidence grows with
/// the number of matched keywords relative to word count, capped at 0.9.
pub fn score_text(text: &str) -> SentimentScore {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let word_count = words.len().max(1) as f64;

    let mut positive_hits = 0u32;
    let mut negative_hits = 0u32;
    for word in &words {
        if POSITIVE_WORDS.iter().any(|kw| word.contains(kw)) {
            positive_hits += 1;
        }
        if NEGATIVE_WORDS.iter().any(|kw| word.contains(kw)) {
            negative_hits += 1;
        }
    }

    let total_hits = positive_hits + negative_hits;
    let score = if total_hits == 0 {
        0.0
    } else {
        (positive_hits as f64 - negative_hits as f64) / total_hits as f64
    };
    let confidence = (total_hits as f64 / word_count * 3.0).min(0.9);

    SentimentScore { label: label_for_score(score), score, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_keywords_score_positive() {
        let s = score_text("Shares surge after company beats earnings estimates");
        assert_eq!(s.label, SentimentLabel::Positive);
        assert!(s.score > 0.0);
    }

    #[test]
    fn negative_keywords_score_negative() {
        let s = score_text("Stock plunges amid fraud investigation and lawsuit");
        assert_eq!(s.label, SentimentLabel::Negative);
        assert!(s.score < 0.0);
    }

    #[test]
    fn neutral_text_has_zero_score() {
        let s = score_text("The company released its quarterly report today");
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert_eq!(s.score, 0.0);
    }
}
