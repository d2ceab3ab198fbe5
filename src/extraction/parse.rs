//! Lenient parsing of model responses.
//!
//! Models wrap JSON in prose or markdown fences and omit fields. Items with
//! missing required fields are dropped; a facet of the wrong type makes the
//! whole response malformed.

use super::models::{Entity, ExtractionError, Quote, RawExtraction, Relationship};
use serde_json::{Map, Value};

const FACETS: &[&str] = &["entities", "quotes", "insights", "relationships", "sentiment"];

/// Locate and decode the JSON object in a response.
pub(crate) fn parse_object(response: &str) -> Result<Map<String, Value>, ExtractionError> {
    let start = response.find('{');
    let end = response.rfind('}');

    let json_str = match (start, end) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => {
            return Err(ExtractionError::MalformedResponse(format!(
                "No JSON object in response: {}",
                preview(response)
            )))
        }
    };

    match serde_json::from_str::<Value>(json_str) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ExtractionError::MalformedResponse(
            "Response is not a JSON object".to_string(),
        )),
        Err(e) => Err(ExtractionError::MalformedResponse(format!(
            "Invalid JSON: {}. Response was: {}",
            e,
            preview(response)
        ))),
    }
}

/// Parse a combined extraction response carrying all five facets.
pub(crate) fn parse_combined(response: &str) -> Result<RawExtraction, ExtractionError> {
    let map = parse_object(response)?;

    if !FACETS.iter().any(|f| map.contains_key(*f)) {
        return Err(ExtractionError::MalformedResponse(
            "Response has none of the expected facets".to_string(),
        ));
    }

    Ok(RawExtraction {
        entities: entities(&map)?,
        quotes: quotes(&map)?,
        insights: insights(&map)?,
        relationships: relationships(&map)?,
        sentiment: map.get("sentiment").filter(|v| !v.is_null()).cloned(),
    })
}

/// Parse a fallback response carrying entities and insights only.
pub(crate) fn parse_fallback(response: &str) -> Result<RawExtraction, ExtractionError> {
    let map = parse_object(response)?;

    if !map.contains_key("entities") && !map.contains_key("insights") {
        return Err(ExtractionError::MalformedResponse(
            "Fallback response has neither entities nor insights".to_string(),
        ));
    }

    Ok(RawExtraction {
        entities: entities(&map)?,
        insights: insights(&map)?,
        ..RawExtraction::default()
    })
}

fn array<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a [Value], ExtractionError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(ExtractionError::MalformedResponse(format!(
            "\"{}\" should be an array, got {}",
            key,
            type_name(other)
        ))),
    }
}

fn text_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn entities(map: &Map<String, Value>) -> Result<Vec<Entity>, ExtractionError> {
    Ok(array(map, "entities")?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(Entity {
                text: s.trim().to_string(),
                entity_type: "unknown".to_string(),
            }),
            Value::Object(_) => Some(Entity {
                text: text_field(item, &["text", "name"])?,
                entity_type: text_field(item, &["type", "entity_type"])
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            _ => None,
        })
        .collect())
}

fn quotes(map: &Map<String, Value>) -> Result<Vec<Quote>, ExtractionError> {
    Ok(array(map, "quotes")?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(Quote {
                text: s.trim().to_string(),
                speaker: None,
            }),
            Value::Object(_) => Some(Quote {
                text: text_field(item, &["text", "quote"])?,
                speaker: text_field(item, &["speaker"]),
            }),
            _ => None,
        })
        .collect())
}

fn insights(map: &Map<String, Value>) -> Result<Vec<String>, ExtractionError> {
    Ok(array(map, "insights")?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(_) => text_field(item, &["text", "insight"]),
            _ => None,
        })
        .collect())
}

fn relationships(map: &Map<String, Value>) -> Result<Vec<Relationship>, ExtractionError> {
    Ok(array(map, "relationships")?
        .iter()
        .filter_map(|item| {
            Some(Relationship {
                source: text_field(item, &["source"])?,
                relation: text_field(item, &["relation", "type", "predicate"])?,
                target: text_field(item, &["target"])?,
            })
        })
        .collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(response: &str) -> String {
    response.chars().take(200).collect()
}
