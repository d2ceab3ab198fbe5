//! Conversion of raw sentiment values into canonical scores.

use super::estimator::SentimentEstimator;
use super::raw::{label_of, RawSentiment};
use crate::config::SentimentScale;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Where a normalized score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentSource {
    /// A number already within the scale, passed through unchanged.
    Numeric,
    /// Converted from text or an out-of-range number.
    Converted,
    /// Estimated from the unit text by the rule-based estimator.
    Estimated,
    /// Nothing usable; neutral default.
    Default,
}

/// A normalized sentiment score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Score within the configured scale.
    pub score: f64,
    /// Qualitative label, if one was given or derived.
    pub label: Option<String>,
    pub source: SentimentSource,
    /// True when the model's value could not be used.
    pub fallback_used: bool,
}

impl SentimentScore {
    /// Neutral score for the given scale.
    pub fn neutral(scale: SentimentScale) -> Self {
        Self {
            score: scale.neutral(),
            label: Some("neutral".to_string()),
            source: SentimentSource::Default,
            fallback_used: true,
        }
    }
}

impl SentimentScale {
    /// Inclusive bounds of the scale.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            SentimentScale::Bipolar => (-1.0, 1.0),
            SentimentScale::Unit => (0.0, 1.0),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let (lo, hi) = self.bounds();
        value >= lo && value <= hi
    }

    pub fn neutral(&self) -> f64 {
        match self {
            SentimentScale::Bipolar => 0.0,
            SentimentScale::Unit => 0.5,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        value.clamp(lo, hi)
    }

    /// Map a value from the bipolar [-1, 1] scale onto this one.
    pub fn from_bipolar(&self, value: f64) -> f64 {
        match self {
            SentimentScale::Bipolar => value.clamp(-1.0, 1.0),
            SentimentScale::Unit => ((value.clamp(-1.0, 1.0) + 1.0) / 2.0).clamp(0.0, 1.0),
        }
    }
}

/// How a text label's constant is interpreted.
#[derive(Debug, Clone, Copy)]
enum LabelKind {
    /// Intensity in [0, 1], identical on both scales.
    Magnitude,
    /// Polarity on the bipolar scale.
    Polarity,
}

/// Textual labels and their constants. Longer labels first so that
/// "very high" wins over "high" when scanning.
const LABELS: &[(&str, f64, LabelKind)] = &[
    ("very positive", 0.9, LabelKind::Polarity),
    ("very negative", -0.9, LabelKind::Polarity),
    ("very high", 0.9, LabelKind::Magnitude),
    ("very low", 0.1, LabelKind::Magnitude),
    ("positive", 0.6, LabelKind::Polarity),
    ("negative", -0.6, LabelKind::Polarity),
    ("neutral", 0.0, LabelKind::Polarity),
    ("mixed", 0.0, LabelKind::Polarity),
    ("moderate", 0.5, LabelKind::Magnitude),
    ("medium", 0.5, LabelKind::Magnitude),
    ("high", 0.8, LabelKind::Magnitude),
    ("low", 0.2, LabelKind::Magnitude),
];

/// Internal conversion failure; resolved by falling back, never returned.
#[derive(Error, Debug)]
enum SentimentParseError {
    #[error("unrecognized sentiment {0:?}")]
    Unrecognized(String),
    #[error("non-finite sentiment value")]
    NonFinite,
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([+-]?\d+(?:\.\d+)?)\s*%$").expect("valid regex"))
}

fn fraction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-]?\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)$").expect("valid regex")
    })
}

/// Converts any raw sentiment into a valid [`SentimentScore`].
#[derive(Debug, Clone, Default)]
pub struct SentimentNormalizer {
    scale: SentimentScale,
    estimator: SentimentEstimator,
}

impl SentimentNormalizer {
    pub fn new(scale: SentimentScale) -> Self {
        Self {
            scale,
            estimator: SentimentEstimator::new(),
        }
    }

    /// Normalize the sentiment field of a response.
    ///
    /// Inside an object, each score key is tried in turn and the label last,
    /// so an unusable score does not hide a usable label.
    pub fn normalize_value(&self, value: Option<&Value>, unit_text: &str) -> SentimentScore {
        let converted = RawSentiment::candidates(value)
            .iter()
            .find_map(|raw| self.convert(raw));

        match converted {
            Some(mut score) => {
                if let Some(label) = label_of(value) {
                    score.label = Some(label);
                }
                score
            }
            None => {
                debug!("No usable sentiment, estimating from text");
                self.estimate(unit_text)
            }
        }
    }

    /// Normalize a classified raw value. Never fails.
    pub fn normalize(&self, raw: &RawSentiment, unit_text: &str) -> SentimentScore {
        self.convert(raw).unwrap_or_else(|| {
            debug!("Estimating sentiment from text");
            self.estimate(unit_text)
        })
    }

    fn convert(&self, raw: &RawSentiment) -> Option<SentimentScore> {
        let converted = match raw {
            RawSentiment::Number(value) => self.convert_number(*value),
            RawSentiment::Text(text) => self.convert_text(text).map(|score| {
                debug!("Converted sentiment {:?} -> {:.3}", text, score.score);
                score
            }),
            RawSentiment::Missing => {
                debug!("Sentiment missing");
                return None;
            }
            RawSentiment::Malformed(original) => {
                debug!("Malformed sentiment {:?}", original);
                return None;
            }
        };

        match converted {
            Ok(mut score) => {
                score.score = self.scale.clamp(score.score);
                Some(score)
            }
            Err(e) => {
                debug!("Sentiment conversion failed ({})", e);
                None
            }
        }
    }

    fn convert_number(&self, value: f64) -> Result<SentimentScore, SentimentParseError> {
        if !value.is_finite() {
            return Err(SentimentParseError::NonFinite);
        }
        if self.scale.contains(value) {
            return Ok(SentimentScore {
                score: value,
                label: None,
                source: SentimentSource::Numeric,
                fallback_used: false,
            });
        }

        // Out of range: most likely a 0-10 or 0-100 score.
        let (lo, _) = self.scale.bounds();
        let rescaled = if value.abs() <= 10.0 && (value >= 0.0 || lo < 0.0) {
            value / 10.0
        } else if value.abs() <= 100.0 && (value >= 0.0 || lo < 0.0) {
            value / 100.0
        } else {
            self.scale.clamp(value)
        };
        debug!("Rescaled sentiment {} -> {:.3}", value, rescaled);

        Ok(SentimentScore {
            score: rescaled,
            label: None,
            source: SentimentSource::Converted,
            fallback_used: false,
        })
    }

    fn convert_text(&self, text: &str) -> Result<SentimentScore, SentimentParseError> {
        let normalized = text.trim().trim_end_matches('.').to_lowercase();
        let label_text = normalized.replace(['_', '-'], " ");

        let converted = |score: f64| SentimentScore {
            score,
            label: Some(text.to_string()),
            source: SentimentSource::Converted,
            fallback_used: false,
        };

        if let Some(value) = self.lookup_label(&label_text, true) {
            return Ok(converted(value));
        }

        if let Some(caps) = percent_regex().captures(&normalized) {
            let value: f64 = caps[1]
                .parse()
                .map_err(|_| SentimentParseError::Unrecognized(text.to_string()))?;
            return Ok(converted(value / 100.0));
        }

        if let Some(caps) = fraction_regex().captures(&normalized) {
            let numerator: f64 = caps[1]
                .parse()
                .map_err(|_| SentimentParseError::Unrecognized(text.to_string()))?;
            let denominator: f64 = caps[2]
                .parse()
                .map_err(|_| SentimentParseError::Unrecognized(text.to_string()))?;
            if denominator > 0.0 {
                return Ok(converted(numerator / denominator));
            }
            return Err(SentimentParseError::Unrecognized(text.to_string()));
        }

        if let Ok(value) = normalized.parse::<f64>() {
            return self.convert_number(value).map(|mut score| {
                score.source = SentimentSource::Converted;
                score
            });
        }

        // Labels embedded in longer text, e.g. "slightly positive overall".
        if let Some(value) = self.lookup_label(&label_text, false) {
            return Ok(converted(value));
        }

        Err(SentimentParseError::Unrecognized(text.to_string()))
    }

    fn lookup_label(&self, normalized: &str, exact: bool) -> Option<f64> {
        let padded = format!(" {} ", normalized);
        LABELS.iter().find_map(|(label, value, kind)| {
            let matched = if exact {
                normalized == *label
            } else {
                padded.contains(&format!(" {} ", label))
            };
            matched.then(|| match kind {
                LabelKind::Magnitude => *value,
                LabelKind::Polarity => self.scale.from_bipolar(*value),
            })
        })
    }

    fn estimate(&self, unit_text: &str) -> SentimentScore {
        let estimate = self.estimator.estimate(unit_text);
        if estimate.hits == 0 {
            return SentimentScore::neutral(self.scale);
        }

        let label = if estimate.score > 0.2 {
            "positive"
        } else if estimate.score < -0.2 {
            "negative"
        } else {
            "neutral"
        };

        SentimentScore {
            score: self.scale.from_bipolar(estimate.score),
            label: Some(label.to_string()),
            source: SentimentSource::Estimated,
            fallback_used: true,
        }
    }
}
