//! Sentiment normalization.
//!
//! Model responses carry sentiment as a number, a label, a fraction, an
//! object, or nothing at all. [`SentimentNormalizer`] turns any of these into
//! a [`SentimentScore`] on the configured scale and falls back to a
//! rule-based estimate over the unit text when the value is unusable.

mod estimator;
mod normalizer;
mod raw;

pub use estimator::{Estimate, SentimentEstimator};
pub use normalizer::{SentimentNormalizer, SentimentScore, SentimentSource};
pub use raw::{label_of, RawSentiment};
