//! Data models for knowledge extraction.

use crate::sentiment::SentimentScore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// A named thing mentioned in a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// A notable verbatim statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub speaker: Option<String>,
}

/// A directed relation between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub relation: String,
    pub target: String,
}

/// Parsed model output before sentiment normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtraction {
    pub entities: Vec<Entity>,
    pub quotes: Vec<Quote>,
    pub insights: Vec<String>,
    pub relationships: Vec<Relationship>,
    /// The sentiment field exactly as returned, if present.
    pub sentiment: Option<Value>,
}

/// Knowledge extracted from one meaningful unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub quotes: Vec<Quote>,
    pub insights: Vec<String>,
    pub relationships: Vec<Relationship>,
    pub sentiment: SentimentScore,
}

/// Coarse classification of a unit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    Transport,
    MalformedResponse,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::EmptyInput => write!(f, "empty_input"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::MalformedResponse => write!(f, "malformed_response"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Failure to extract knowledge from a single unit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Unit text is empty")]
    EmptyInput,

    #[error("Reasoning service error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unit timed out after {0:?}")]
    Timeout(Duration),

    #[error("Batch deadline reached before the unit completed")]
    BatchDeadline,

    #[error("Unit processing panicked: {0}")]
    Internal(String),

    /// A failure carried over from a finished run's checkpoint.
    #[error("{message}")]
    Restored { kind: ErrorKind, message: String },
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::EmptyInput => ErrorKind::EmptyInput,
            ExtractionError::Transport(_) => ErrorKind::Transport,
            ExtractionError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ExtractionError::Timeout(_) | ExtractionError::BatchDeadline => ErrorKind::Timeout,
            ExtractionError::Internal(_) => ErrorKind::Internal,
            ExtractionError::Restored { kind, .. } => *kind,
        }
    }

    pub fn from_record(record: &ErrorRecord) -> Self {
        ExtractionError::Restored {
            kind: record.error_kind,
            message: record.message.clone(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

/// The result of attempting one unit.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub unit_index: usize,
    pub result: std::result::Result<ExtractionResult, ExtractionError>,
    /// Wall-clock time spent on the unit.
    pub elapsed: Duration,
    /// The degraded extraction path was used.
    pub fallback_used: bool,
    /// Restored from a checkpoint rather than processed in this run.
    pub restored: bool,
}

impl UnitOutcome {
    pub fn success(unit_index: usize, result: ExtractionResult, elapsed: Duration) -> Self {
        Self {
            unit_index,
            result: Ok(result),
            elapsed,
            fallback_used: false,
            restored: false,
        }
    }

    pub fn failure(unit_index: usize, error: ExtractionError, elapsed: Duration) -> Self {
        Self {
            unit_index,
            result: Err(error),
            elapsed,
            fallback_used: false,
            restored: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        self.result.as_ref().err()
    }

    /// Error record for a failed outcome.
    pub fn error_record(&self) -> Option<ErrorRecord> {
        self.error().map(|e| ErrorRecord {
            unit_index: self.unit_index,
            error_kind: e.kind(),
            message: e.to_string(),
            is_timeout: e.is_timeout(),
        })
    }
}

/// One failed unit, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub unit_index: usize,
    pub error_kind: ErrorKind,
    pub message: String,
    pub is_timeout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ExtractionError::BatchDeadline.kind(), ErrorKind::Timeout);
        assert!(ExtractionError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!ExtractionError::Transport("down".into()).is_timeout());
    }

    #[test]
    fn test_restored_error_keeps_kind_and_message() {
        let record = ErrorRecord {
            unit_index: 2,
            error_kind: ErrorKind::Timeout,
            message: "Unit timed out after 300s".into(),
            is_timeout: true,
        };
        let error = ExtractionError::from_record(&record);
        assert!(error.is_timeout());
        assert_eq!(error.to_string(), record.message);
    }

    #[test]
    fn test_error_record() {
        let outcome = UnitOutcome::failure(
            7,
            ExtractionError::MalformedResponse("no json".into()),
            Duration::from_millis(20),
        );
        let record = outcome.error_record().unwrap();
        assert_eq!(record.unit_index, 7);
        assert_eq!(record.error_kind, ErrorKind::MalformedResponse);
        assert!(!record.is_timeout);
        assert!(record.message.contains("no json"));
    }

    #[test]
    fn test_entity_serializes_type_key() {
        let entity = Entity {
            text: "Tokio".into(),
            entity_type: "library".into(),
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "library");
    }
}
