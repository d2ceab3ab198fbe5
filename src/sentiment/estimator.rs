//! Rule-based sentiment estimation from unit text.
//!
//! Used when the model's sentiment field is missing or cannot be converted.
//! Scans for weighted indicator phrases; a negation word directly before a
//! phrase flips its polarity.

/// Positive indicator phrases and their weights.
const POSITIVE: &[(&str, f64)] = &[
    ("love", 1.0),
    ("amazing", 1.0),
    ("excellent", 1.0),
    ("fantastic", 1.0),
    ("brilliant", 0.9),
    ("great", 0.8),
    ("excited", 0.8),
    ("happy", 0.8),
    ("enjoy", 0.7),
    ("enjoyed", 0.7),
    ("impressive", 0.7),
    ("success", 0.7),
    ("looking forward", 0.6),
    ("well done", 0.6),
    ("good", 0.5),
    ("helpful", 0.5),
    ("opportunity", 0.5),
    ("interesting", 0.4),
    ("agree", 0.4),
];

/// Negative indicator phrases and their weights.
const NEGATIVE: &[(&str, f64)] = &[
    ("hate", 1.0),
    ("terrible", 1.0),
    ("awful", 1.0),
    ("disaster", 1.0),
    ("fed up", 0.7),
    ("worried", 0.7),
    ("afraid", 0.7),
    ("failure", 0.7),
    ("failed", 0.7),
    ("frustrating", 0.7),
    ("sad", 0.7),
    ("bad", 0.6),
    ("problem", 0.5),
    ("wrong", 0.5),
    ("concern", 0.5),
    ("concerned", 0.5),
    ("difficult", 0.4),
    ("risk", 0.4),
    ("disagree", 0.4),
];

const NEGATIONS: &[&str] = &["not", "never", "no", "dont", "don't", "isnt", "isn't", "wasnt", "wasn't"];

/// Keeps a single strong phrase from saturating the score.
const DAMPING: f64 = 1.0;

/// Result of a rule-based estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Score on the bipolar [-1, 1] scale.
    pub score: f64,
    /// Number of indicator phrases found.
    pub hits: usize,
}

/// Weighted phrase-based sentiment estimator.
#[derive(Debug, Clone, Default)]
pub struct SentimentEstimator;

impl SentimentEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Estimate sentiment of `text`. Always returns a finite score in [-1, 1].
    pub fn estimate(&self, text: &str) -> Estimate {
        let words: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let mut positive = 0.0;
        let mut negative = 0.0;
        let mut hits = 0;

        for (table, sign) in [(POSITIVE, 1.0), (NEGATIVE, -1.0)] {
            for (phrase, weight) in table {
                let phrase_words: Vec<&str> = phrase.split(' ').collect();
                for start in find_phrase(&words, &phrase_words) {
                    let negated = start > 0 && NEGATIONS.contains(&words[start - 1].as_str());
                    let contribution = if negated { -sign * weight } else { sign * weight };
                    if contribution > 0.0 {
                        positive += contribution;
                    } else {
                        negative -= contribution;
                    }
                    hits += 1;
                }
            }
        }

        if hits == 0 {
            return Estimate { score: 0.0, hits };
        }

        let score = (positive - negative) / (positive + negative + DAMPING);
        Estimate {
            score: score.clamp(-1.0, 1.0),
            hits,
        }
    }
}

/// Start positions of every occurrence of `phrase` in `words`.
fn find_phrase(words: &[String], phrase: &[&str]) -> Vec<usize> {
    if phrase.is_empty() || words.len() < phrase.len() {
        return Vec::new();
    }
    (0..=words.len() - phrase.len())
        .filter(|&i| phrase.iter().enumerate().all(|(j, p)| words[i + j] == *p))
        .collect()
}
