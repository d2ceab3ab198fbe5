//! OpenAI chat completions as a reasoning service.

use super::{Capabilities, Completion, CompletionRequest, ReasoningService, ServiceError};
use crate::error::Result;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Reasoning service backed by the OpenAI chat completions API.
pub struct OpenAiReasoner {
    client: async_openai::Client<OpenAIConfig>,
    structured_output: bool,
}

impl OpenAiReasoner {
    /// Create a reasoner whose HTTP requests time out after `request_timeout`.
    ///
    /// One `reqwest::Client` owns the connection pool shared by every
    /// concurrent unit. `OPENAI_BASE_URL` points it at a compatible server.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(request_timeout).build()?;

        let mut config = OpenAIConfig::default();
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            if !base.is_empty() {
                config = config.with_api_base(base);
            }
        }

        Ok(Self {
            client: async_openai::Client::with_config(config).with_http_client(http_client),
            structured_output: true,
        })
    }

    /// Disable JSON mode for models that do not support it.
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }
}

fn map_openai_error(err: OpenAIError) -> ServiceError {
    match err {
        OpenAIError::ApiError(api) => ServiceError::Rejected(api.message),
        OpenAIError::InvalidArgument(msg) => ServiceError::InvalidRequest(msg),
        other => ServiceError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ReasoningService for OpenAiReasoner {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            structured_output: self.structured_output,
        }
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ServiceError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()
                .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt)
                .build()
                .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?
                .into(),
        ];

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&request.model)
            .messages(messages)
            .temperature(request.temperature);

        if request.structured_output && self.structured_output {
            builder.response_format(ResponseFormat::JsonObject);
        }

        let chat_request = builder
            .build()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);

        debug!(
            "Completion received ({} chars)",
            content.as_ref().map(|c| c.len()).unwrap_or(0)
        );

        Ok(Completion { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_fixed_at_construction() {
        let reasoner = OpenAiReasoner::new(Duration::from_secs(5)).unwrap();
        assert!(reasoner.capabilities().structured_output);

        let reasoner = reasoner.with_structured_output(false);
        assert!(!reasoner.capabilities().structured_output);
    }

    #[test]
    fn test_error_mapping() {
        let err = map_openai_error(OpenAIError::InvalidArgument("bad".to_string()));
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }
}
