//! Raw sentiment values as they come back from the model.

use serde_json::Value;

/// Keys that may carry the numeric score inside a sentiment object.
const SCORE_KEYS: &[&str] = &["score", "polarity", "value", "overall", "sentiment"];

/// The sentiment field of a response, classified before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSentiment {
    /// A JSON number.
    Number(f64),
    /// A textual value such as "high", "80%" or "8/10".
    Text(String),
    /// Absent, null or blank.
    Missing,
    /// Present but of a shape that cannot carry a score.
    Malformed(String),
}

impl RawSentiment {
    /// Classify an optional JSON value.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => RawSentiment::Missing,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) => RawSentiment::Number(v),
                None => RawSentiment::Malformed(n.to_string()),
            },
            Some(Value::String(s)) if s.trim().is_empty() => RawSentiment::Missing,
            Some(Value::String(s)) => RawSentiment::Text(s.trim().to_string()),
            Some(Value::Object(_)) => RawSentiment::candidates(value)
                .into_iter()
                .next()
                .unwrap_or(RawSentiment::Missing),
            Some(other) => RawSentiment::Malformed(other.to_string()),
        }
    }

    /// Every classified value that may carry the score, in the order it
    /// should be tried. An object yields its score keys first and its label
    /// last; any other value yields itself.
    pub fn candidates(value: Option<&Value>) -> Vec<Self> {
        let map = match value {
            Some(Value::Object(map)) => map,
            other => return vec![RawSentiment::from_value(other)],
        };

        let found: Vec<Self> = SCORE_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .filter(|inner| !inner.is_object())
            .chain(map.get("label").filter(|label| label.is_string()))
            .map(|inner| RawSentiment::from_value(Some(inner)))
            .collect();

        if found.is_empty() {
            vec![RawSentiment::Malformed(Value::Object(map.clone()).to_string())]
        } else {
            found
        }
    }
}

/// Qualitative label carried alongside the score, if any.
pub fn label_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(map) => map
            .get("label")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
