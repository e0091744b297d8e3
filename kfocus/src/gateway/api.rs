use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        CreateEmbeddingRequestArgs, EmbeddingInput, ImageDetail, ImageUrlArgs, ResponseFormat,
    },
    Client,
};
use futures::StreamExt;
use serde_json::Value;

use crate::error::{KfError, Result};
use crate::models::{MessageRole, ResolvedModel};

use super::ChatTurn;

/// Thin OpenAI-compatible client bound to one resolved model. Providers
/// differ only in base URL and key; the request shape is uniform.
#[derive(Clone)]
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
}

impl ChatClient {
    pub fn new(resolved: &ResolvedModel, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_base(resolved.base_url.clone())
            .with_api_key(resolved.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| KfError::Model(format!("Failed to create HTTP client: {error}")))?;

        // Bound async-openai's internal backoff by our timeout; its default
        // max_elapsed_time keeps retrying 500s for up to 15 minutes.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            model: resolved.model_identifier.clone(),
            max_retries,
        })
    }

    pub async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let response = self
            .send_with_retry(|| self.build_request(turns, false))
            .await?;
        Self::extract_content(response)
    }

    pub async fn complete_json(&self, turns: &[ChatTurn]) -> Result<Value> {
        let response = self
            .send_with_retry(|| self.build_request(turns, true))
            .await?;
        let content = Self::extract_content(response)?;
        serde_json::from_str(strip_code_fences(&content)).map_err(|e| {
            KfError::Model(format!(
                "Failed to parse JSON response ({} chars): {e}",
                content.len()
            ))
        })
    }

    /// Lazy delta sequence; a provider error becomes one terminal `Err`.
    pub async fn stream(
        &self,
        turns: &[ChatTurn],
    ) -> Result<impl futures::Stream<Item = Result<String>> + Send + Unpin> {
        let request = self.build_request(turns, false)?;
        let mut upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(Self::map_openai_error)?;

        let stream = async_stream::stream! {
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(delta) = choice.delta.content {
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                        }
                    }
                    Err(error) => {
                        yield Err(Self::map_openai_error(error));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|error| KfError::Validation(format!("Invalid embedding request: {error}")))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(Self::map_openai_error)?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    pub async fn describe_image(&self, base64_image: &str, prompt: &str) -> Result<String> {
        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(prompt)
            .build()
            .map_err(|error| KfError::Validation(format!("Invalid caption prompt: {error}")))?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(format!("data:image/png;base64,{base64_image}"))
                    .detail(ImageDetail::Auto)
                    .build()
                    .map_err(|error| KfError::Validation(format!("Invalid image url: {error}")))?,
            )
            .build()
            .map_err(|error| KfError::Validation(format!("Invalid image part: {error}")))?;

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(vec![
                text_part.into(),
                image_part.into(),
            ]))
            .build()
            .map_err(|error| KfError::Validation(format!("Invalid vision message: {error}")))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(vec![message.into()])
            .build()
            .map_err(|error| KfError::Validation(format!("Invalid vision request: {error}")))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(Self::map_openai_error)?;
        Self::extract_content(response)
    }

    pub(crate) fn inner(&self) -> &Client<OpenAIConfig> {
        &self.client
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<CreateChatCompletionResponse>
    where
        F: Fn() -> Result<CreateChatCompletionRequest>,
    {
        let mut last_error: Option<KfError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request = build()?;
            match self.client.chat().create(request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if let Some(rate_limit_error) = Self::rate_limit_error(&error) {
                        return Err(rate_limit_error);
                    }
                    if let Some(auth_error) = Self::auth_error(&error) {
                        return Err(auth_error);
                    }

                    let retryable = Self::is_retryable(&error);
                    let mapped = Self::map_openai_error(error);

                    if retryable && attempt < self.max_retries {
                        last_error = Some(mapped);
                        continue;
                    }
                    return Err(mapped);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| KfError::Model("Chat completion failed after retries".into())))
    }

    fn build_request(
        &self,
        turns: &[ChatTurn],
        json_mode: bool,
    ) -> Result<CreateChatCompletionRequest> {
        if turns.iter().all(|t| t.content.trim().is_empty()) {
            return Err(KfError::Validation("Prompt cannot be empty".into()));
        }

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(turns.len());
        for turn in turns {
            let message = match turn.role {
                MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|error| KfError::Validation(format!("Invalid system turn: {error}")))?
                    .into(),
                MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|error| KfError::Validation(format!("Invalid user turn: {error}")))?
                    .into(),
                MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|error| {
                        KfError::Validation(format!("Invalid assistant turn: {error}"))
                    })?
                    .into(),
            };
            messages.push(message);
        }

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.model.clone()).messages(messages);
        if json_mode {
            request.response_format(ResponseFormat::JsonObject);
        }

        request
            .build()
            .map_err(|error| KfError::Validation(format!("Invalid chat request: {error}")))
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| KfError::Model("Response contained no choices".into()))?
            .message
            .content
            .unwrap_or_default();

        if message.trim().is_empty() {
            return Err(KfError::Model("Response contained empty content".into()));
        }
        Ok(message)
    }

    fn is_retryable(error: &OpenAIError) -> bool {
        match error {
            OpenAIError::ApiError(api_error) => {
                api_error.r#type.is_none() && api_error.code.is_none()
            }
            OpenAIError::Reqwest(reqwest_error) => reqwest_error
                .status()
                .map(|status| status.is_server_error())
                .unwrap_or(true),
            _ => false,
        }
    }

    fn rate_limit_error(error: &OpenAIError) -> Option<KfError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) =>
            {
                Some(KfError::RateLimit { retry_after: None })
            }
            OpenAIError::ApiError(api_error) if Self::is_rate_limit_api_error(api_error) => {
                Some(KfError::RateLimit { retry_after: None })
            }
            _ => None,
        }
    }

    /// Auth/network failures against the provider defer the pipelines the
    /// same way a missing assignment does.
    fn auth_error(error: &OpenAIError) -> Option<KfError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
                    || reqwest_error.status() == Some(reqwest::StatusCode::FORBIDDEN) =>
            {
                Some(KfError::ModelUnavailable {
                    missing: vec![format!("authentication failed: {reqwest_error}")],
                })
            }
            OpenAIError::ApiError(api_error) if Self::is_auth_api_error(api_error) => {
                Some(KfError::ModelUnavailable {
                    missing: vec![format!("authentication failed: {api_error}")],
                })
            }
            _ => None,
        }
    }

    fn is_rate_limit_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("rate limit")
            || message.contains("too many requests")
            || error_type.contains("rate_limit")
            || code.contains("rate_limit")
            || code == "insufficient_quota"
    }

    fn is_auth_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("unauthorized")
            || message.contains("forbidden")
            || message.contains("authentication")
            || message.contains("invalid api key")
            || code.contains("invalid_api_key")
            || code.contains("authentication")
            || error_type.contains("authentication")
    }

    fn map_openai_error(error: OpenAIError) -> KfError {
        match error {
            OpenAIError::Reqwest(reqwest_error) => {
                KfError::Model(format!("Provider request failed: {reqwest_error}"))
            }
            OpenAIError::ApiError(api_error) => {
                KfError::Model(format!("Provider API error: {api_error}"))
            }
            OpenAIError::JSONDeserialize(err) => {
                KfError::Model(format!("Failed to parse provider response: {err}"))
            }
            OpenAIError::InvalidArgument(message) => KfError::Validation(message),
            other => KfError::Model(other.to_string()),
        }
    }
}

/// Models occasionally wrap JSON output in a markdown fence despite the
/// response-format hint.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved() -> ResolvedModel {
        ResolvedModel {
            model_identifier: "test-model".into(),
            base_url: "http://localhost:1234/v1".into(),
            api_key: None,
            use_proxy: false,
            max_context_length: Some(8192),
            max_output_tokens: Some(1024),
        }
    }

    #[test]
    fn build_request_rejects_empty_prompt() {
        let client = ChatClient::new(&resolved(), 30, 0).expect("client");
        let error = client
            .build_request(&[ChatTurn::user("   ")], false)
            .unwrap_err();
        assert!(matches!(error, KfError::Validation(_)));
    }

    #[test]
    fn json_mode_sets_response_format() {
        let client = ChatClient::new(&resolved(), 30, 0).expect("client");
        let request = client
            .build_request(&[ChatTurn::user("hello")], true)
            .expect("request");
        assert!(matches!(
            request.response_format,
            Some(ResponseFormat::JsonObject)
        ));
    }

    #[test]
    fn plain_mode_leaves_response_format_unset() {
        let client = ChatClient::new(&resolved(), 30, 0).expect("client");
        let request = client
            .build_request(
                &[ChatTurn::system("be terse"), ChatTurn::user("hello")],
                false,
            )
            .expect("request");
        assert!(request.response_format.is_none());
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
    }
}
