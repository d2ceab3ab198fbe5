//! Degraded extraction used when the combined response cannot be parsed.
//!
//! Asks a lighter question (entities and insights only) with a shorter prompt.
//! Quotes and relationships are left empty and sentiment is estimated locally.

use super::client::{ResponseMode, PLAIN_TEXT_INSTRUCTION};
use super::models::{ExtractionError, RawExtraction};
use super::parse::parse_fallback;
use crate::config::Prompts;
use crate::reasoning::{CompletionRequest, ReasoningService};
use crate::units::MeaningfulUnit;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Lighter single-request extractor.
#[derive(Clone)]
pub struct FallbackExtractor {
    service: Arc<dyn ReasoningService>,
    model: String,
    mode: ResponseMode,
    prompts: Prompts,
}

impl FallbackExtractor {
    /// Create an extractor. Like the main client, the response mode is fixed
    /// here from the service's capabilities.
    pub fn new(service: Arc<dyn ReasoningService>, model: impl Into<String>) -> Self {
        let mode = ResponseMode::for_capabilities(service.capabilities(), true);
        Self {
            service,
            model: model.into(),
            mode,
            prompts: Prompts::default(),
        }
    }

    /// Opt out of structured responses even when the service supports them.
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.mode = ResponseMode::for_capabilities(self.service.capabilities(), enabled);
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    #[instrument(skip_all, fields(unit = unit.index))]
    pub async fn extract(&self, unit: &MeaningfulUnit) -> Result<RawExtraction, ExtractionError> {
        if unit.text.trim().is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let mut vars = HashMap::new();
        vars.insert("speaker".to_string(), unit.speaker_label().to_string());
        vars.insert("text".to_string(), unit.text.clone());

        let mut system = self.prompts.fallback.system.clone();
        if self.mode == ResponseMode::PlainText {
            system.push_str(PLAIN_TEXT_INSTRUCTION);
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            system,
            prompt: self.prompts.render_with_custom(&self.prompts.fallback.user, &vars),
            structured_output: self.mode == ResponseMode::JsonObject,
            temperature: 0.0,
        };

        let completion = self
            .service
            .complete(request)
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let content = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ExtractionError::MalformedResponse("Fallback returned no content".to_string())
            })?;

        let raw = parse_fallback(&content)?;
        debug!(
            "Fallback extracted {} entities, {} insights",
            raw.entities.len(),
            raw.insights.len()
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::testing::{Reply, ScriptedReasoner};
    use std::time::Duration;

    #[tokio::test]
    async fn test_fallback_extracts_entities_and_insights() {
        let service = Arc::new(ScriptedReasoner::new(|_| {
            (
                Duration::ZERO,
                Reply::Content(r#"{"entities": [{"text": "Ferris", "type": "mascot"}], "insights": ["Crabs are fun"]}"#.into()),
            )
        }));
        let extractor = FallbackExtractor::new(service.clone(), "small-model");

        let unit = MeaningfulUnit::new(0, "Ferris is the Rust mascot.", None, 0.0, 5.0);
        let raw = extractor.extract(&unit).await.unwrap();

        assert_eq!(raw.entities[0].text, "Ferris");
        assert_eq!(raw.insights, vec!["Crabs are fun"]);
        assert!(raw.quotes.is_empty());
        assert!(raw.relationships.is_empty());
        assert!(raw.sentiment.is_none());
        assert_eq!(service.calls()[0].model, "small-model");
        assert!(service.calls()[0].structured_output);
    }

    #[tokio::test]
    async fn test_fallback_without_json_mode_asks_for_bare_json() {
        let service = Arc::new(
            ScriptedReasoner::new(|_| {
                (
                    Duration::ZERO,
                    Reply::Content(r#"Sure: {"entities": [], "insights": ["Short"]}"#.into()),
                )
            })
            .without_structured_output(),
        );
        let extractor = FallbackExtractor::new(service.clone(), "small-model");
        assert_eq!(extractor.mode(), ResponseMode::PlainText);

        let unit = MeaningfulUnit::new(0, "Short unit.", None, 0.0, 5.0);
        let raw = extractor.extract(&unit).await.unwrap();
        assert_eq!(raw.insights, vec!["Short"]);

        let calls = service.calls();
        assert!(!calls[0].structured_output);
        assert!(calls[0].system.ends_with(PLAIN_TEXT_INSTRUCTION));

        let forced = FallbackExtractor::new(Arc::new(ScriptedReasoner::always_ok()), "m")
            .with_structured_output(false);
        assert_eq!(forced.mode(), ResponseMode::PlainText);
    }
}
