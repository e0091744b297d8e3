mod api;
mod discovery;
mod probe;

pub use api::ChatClient;
pub use discovery::discover_models;
pub use probe::run_capability_probes;

use std::sync::Arc;

use futures::Stream;
use serde::de::DeserializeOwned;

use crate::db::MetaStore;
use crate::error::{KfError, Result};
use crate::models::{Capability, MessageRole, ResolvedModel};

/// How many times a structured-output call is re-asked when the model
/// returns something that does not parse against the expected shape.
const STRUCTURED_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Uniform interface to chat / embedding / vision / structured-output
/// calls. Every call resolves its capability through the active
/// CapabilityAssignment at call time, so an assignment change takes effect
/// on the next request without a restart.
#[derive(Clone)]
pub struct ModelGateway {
    store: Arc<dyn MetaStore>,
    dimensions: usize,
    timeout_secs: u64,
    max_retries: u32,
}

impl ModelGateway {
    pub fn new(store: Arc<dyn MetaStore>, dimensions: usize) -> Self {
        Self {
            store,
            dimensions,
            timeout_secs: std::env::var("MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            max_retries: 3,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn resolve(&self, capability: Capability) -> Result<ResolvedModel> {
        self.store
            .resolve_capability(capability)
            .await?
            .ok_or_else(|| KfError::model_missing(capability.to_string()))
    }

    /// Names of the capabilities in `required` that cannot be resolved.
    pub async fn missing_capabilities(&self, required: &[Capability]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for capability in required {
            if self.store.resolve_capability(*capability).await?.is_none() {
                missing.push(capability.to_string());
            }
        }
        Ok(missing)
    }

    /// Gate for pipelines: `ModelUnavailable` listing everything missing.
    pub async fn require_capabilities(&self, required: &[Capability]) -> Result<()> {
        let missing = self.missing_capabilities(required).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(KfError::ModelUnavailable { missing })
        }
    }

    fn client(&self, resolved: &ResolvedModel) -> Result<ChatClient> {
        ChatClient::new(resolved, self.timeout_secs, self.max_retries)
    }

    pub async fn chat(&self, turns: &[ChatTurn]) -> Result<String> {
        let resolved = self.resolve(Capability::Text).await?;
        self.client(&resolved)?.complete(turns).await
    }

    /// Structured output: JSON-object response format, parsed into `T`.
    /// A response that fails to parse is re-asked, up to three attempts.
    pub async fn chat_structured<T: DeserializeOwned>(&self, turns: &[ChatTurn]) -> Result<T> {
        let resolved = self.resolve(Capability::StructuredOutput).await?;
        let client = self.client(&resolved)?;

        let mut last_error: Option<KfError> = None;
        for attempt in 1..=STRUCTURED_ATTEMPTS {
            match client.complete_json(turns).await {
                Ok(value) => match serde_json::from_value::<T>(value) {
                    Ok(parsed) => return Ok(parsed),
                    Err(error) => {
                        tracing::warn!(
                            attempt,
                            error = %error,
                            "Structured output failed validation, re-asking"
                        );
                        last_error =
                            Some(KfError::Model(format!("Structured output invalid: {error}")));
                    }
                },
                Err(error) => {
                    if error.is_model_unavailable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| KfError::Model("Structured output failed after retries".into())))
    }

    /// Finite, non-restartable delta stream. A provider error surfaces as
    /// one terminal `Err` item, then the stream ends.
    pub async fn stream_chat(
        &self,
        turns: &[ChatTurn],
    ) -> Result<impl Stream<Item = Result<String>> + Send + Unpin> {
        let resolved = self.resolve(Capability::Text).await?;
        self.client(&resolved)?.stream(turns).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| KfError::Vectorization("Embedding response was empty".into()))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let resolved = self.resolve(Capability::Embedding).await?;
        let vectors = self.client(&resolved)?.embed(texts).await?;

        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(KfError::Vectorization(format!(
                    "Provider returned dimension {}, process requires {}",
                    vector.len(),
                    self.dimensions
                )));
            }
        }
        Ok(vectors)
    }

    /// Caption an image (base64 PNG/JPEG) through the VISION capability.
    pub async fn describe_image(&self, base64_image: &str, prompt: &str) -> Result<String> {
        let resolved = self.resolve(Capability::Vision).await?;
        self.client(&resolved)?
            .describe_image(base64_image, prompt)
            .await
    }
}
