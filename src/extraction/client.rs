//! Combined extraction client.
//!
//! Issues one reasoning request per unit asking for all five facets at once.

use super::context::ExtractionContext;
use super::models::{ExtractionError, RawExtraction};
use super::parse::parse_combined;
use crate::config::Prompts;
use crate::reasoning::{Capabilities, CompletionRequest, ReasoningService};
use crate::units::{format_timestamp, MeaningfulUnit};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Appended to the system prompt when the service cannot be asked for JSON.
pub(super) const PLAIN_TEXT_INSTRUCTION: &str =
    "\n\nRespond with only the JSON object. No commentary, no markdown.";

/// How responses are requested from the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// The service returns a JSON object directly.
    JsonObject,
    /// JSON is requested in the prompt and located in free text.
    PlainText,
}

impl ResponseMode {
    /// Pick the mode for a service. `prefer_structured = false` forces plain text.
    pub fn for_capabilities(capabilities: Capabilities, prefer_structured: bool) -> Self {
        if capabilities.structured_output && prefer_structured {
            ResponseMode::JsonObject
        } else {
            ResponseMode::PlainText
        }
    }
}

/// Client that extracts entities, quotes, insights, relationships and
/// sentiment from a unit in a single request.
#[derive(Clone)]
pub struct ExtractionClient {
    service: Arc<dyn ReasoningService>,
    model: String,
    temperature: f32,
    mode: ResponseMode,
    prompts: Prompts,
}

impl ExtractionClient {
    /// Create a client. The response mode is fixed here from the service's
    /// capabilities.
    pub fn new(service: Arc<dyn ReasoningService>, model: impl Into<String>) -> Self {
        let mode = ResponseMode::for_capabilities(service.capabilities(), true);
        Self {
            service,
            model: model.into(),
            temperature: 0.2,
            mode,
            prompts: Prompts::default(),
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Opt out of structured responses even when the service supports them.
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.mode = ResponseMode::for_capabilities(self.service.capabilities(), enabled);
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Extract knowledge from one unit. Makes at most one request and never
    /// retries.
    #[instrument(skip_all, fields(unit = unit.index))]
    pub async fn extract(
        &self,
        unit: &MeaningfulUnit,
        context: &ExtractionContext,
    ) -> Result<RawExtraction, ExtractionError> {
        if unit.text.trim().is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let request = self.build_request(unit, context);
        debug!("Requesting combined extraction ({:?})", self.mode);

        let completion = self
            .service
            .complete(request)
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let content = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ExtractionError::MalformedResponse("Service returned no content".to_string())
            })?;

        let raw = parse_combined(&content)?;
        debug!(
            "Extracted {} entities, {} quotes, {} insights, {} relationships",
            raw.entities.len(),
            raw.quotes.len(),
            raw.insights.len(),
            raw.relationships.len()
        );
        Ok(raw)
    }

    fn build_request(&self, unit: &MeaningfulUnit, context: &ExtractionContext) -> CompletionRequest {
        let mut vars = HashMap::new();
        vars.insert("podcast".to_string(), context.podcast_name().to_string());
        vars.insert("episode_title".to_string(), context.episode_title.clone());
        vars.insert("speaker".to_string(), unit.speaker_label().to_string());
        vars.insert("start".to_string(), format_timestamp(unit.start_seconds));
        vars.insert("end".to_string(), format_timestamp(unit.end_seconds));
        vars.insert("context".to_string(), context.render());
        vars.insert("text".to_string(), unit.text.clone());

        let prompt = self
            .prompts
            .render_with_custom(&self.prompts.extraction.user, &vars);

        let mut system = self.prompts.extraction.system.clone();
        if self.mode == ResponseMode::PlainText {
            system.push_str(PLAIN_TEXT_INSTRUCTION);
        }

        CompletionRequest {
            model: self.model.clone(),
            system,
            prompt,
            structured_output: self.mode == ResponseMode::JsonObject,
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::testing::{combined_json, Reply, ScriptedReasoner};
    use crate::reasoning::ServiceError;
    use serde_json::json;
    use std::time::Duration;

    fn unit(text: &str) -> MeaningfulUnit {
        MeaningfulUnit::new(3, text, Some("Ana".to_string()), 61.0, 75.5)
    }

    #[tokio::test]
    async fn test_extract_combined() {
        let service = Arc::new(ScriptedReasoner::always_ok());
        let client = ExtractionClient::new(service.clone(), "gpt-4o-mini");

        let raw = client
            .extract(&unit("Rust is great."), &ExtractionContext::new("Pilot", None))
            .await
            .unwrap();

        assert_eq!(raw.entities[0].text, "Rust");
        assert_eq!(raw.sentiment, Some(json!(0.5)));

        let calls = service.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].structured_output);
        assert!(calls[0].prompt.contains("Speaker: Ana"));
        assert!(calls[0].prompt.contains("Episode: Pilot"));
        assert!(calls[0].prompt.contains("Rust is great."));
    }

    #[tokio::test]
    async fn test_empty_text_makes_no_request() {
        let service = Arc::new(ScriptedReasoner::always_ok());
        let client = ExtractionClient::new(service.clone(), "gpt-4o-mini");

        let err = client
            .extract(&unit("   "), &ExtractionContext::default())
            .await
            .unwrap_err();

        assert_eq!(err, ExtractionError::EmptyInput);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mode_follows_capabilities() {
        let service = Arc::new(ScriptedReasoner::always_ok().without_structured_output());
        let client = ExtractionClient::new(service.clone(), "m");
        assert_eq!(client.mode(), ResponseMode::PlainText);

        client
            .extract(&unit("Hello"), &ExtractionContext::default())
            .await
            .unwrap();
        let calls = service.calls();
        assert!(!calls[0].structured_output);
        assert!(calls[0].system.ends_with(PLAIN_TEXT_INSTRUCTION));

        let forced = ExtractionClient::new(Arc::new(ScriptedReasoner::always_ok()), "m")
            .with_structured_output(false);
        assert_eq!(forced.mode(), ResponseMode::PlainText);
    }

    #[tokio::test]
    async fn test_service_failure_is_transport() {
        let service = Arc::new(ScriptedReasoner::new(|_| {
            (
                Duration::ZERO,
                Reply::Fail(ServiceError::Unavailable("connection refused".into())),
            )
        }));
        let client = ExtractionClient::new(service, "m");

        let err = client
            .extract(&unit("Hello"), &ExtractionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Transport(_)));
    }

    #[tokio::test]
    async fn test_empty_or_garbled_content_is_malformed() {
        let empty = ExtractionClient::new(
            Arc::new(ScriptedReasoner::new(|_| (Duration::ZERO, Reply::Empty))),
            "m",
        );
        let err = empty
            .extract(&unit("Hello"), &ExtractionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));

        let garbled = ExtractionClient::new(
            Arc::new(ScriptedReasoner::new(|_| {
                (Duration::ZERO, Reply::Content("Sure! Here are the entities: Rust".into()))
            })),
            "m",
        );
        let err = garbled
            .extract(&unit("Hello"), &ExtractionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_plain_text_response_with_prose() {
        let service = Arc::new(
            ScriptedReasoner::new(|_| {
                let body = combined_json("Tokio", json!("positive"));
                (Duration::ZERO, Reply::Content(format!("Here you go:\n{}\nThanks", body)))
            })
            .without_structured_output(),
        );
        let client = ExtractionClient::new(service, "m");

        let raw = client
            .extract(&unit("Hello"), &ExtractionContext::default())
            .await
            .unwrap();
        assert_eq!(raw.entities[0].text, "Tokio");
        assert_eq!(raw.sentiment, Some(json!("positive")));
    }
}
