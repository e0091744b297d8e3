use std::time::Duration;

use serde_json::Value;

use crate::error::{KfError, Result};
use crate::models::{DiscoveredModel, ModelProvider, ProviderKind};

const DISCOVERY_TIMEOUT_SECS: u64 = 15;

/// List the models a provider exposes, normalized into one shape.
/// Provider wire formats differ only in the auth header and the JSON path
/// to the list; everything else is mapped field by field.
pub async fn discover_models(provider: &ModelProvider) -> Result<Vec<DiscoveredModel>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DISCOVERY_TIMEOUT_SECS))
        .build()?;

    let base_url = provider
        .base_url
        .clone()
        .unwrap_or_else(|| provider.kind.default_base_url().to_string());
    let base_url = base_url.trim_end_matches('/');
    let api_key = provider.api_key.as_deref().unwrap_or_default();

    let body: Value = match provider.kind {
        ProviderKind::Ollama => {
            // Native listing lives beside the OpenAI-compatible surface.
            let root = base_url.trim_end_matches("/v1");
            client
                .get(format!("{root}/api/tags"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?
        }
        ProviderKind::Anthropic => {
            client
                .get(format!("{base_url}/models"))
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?
        }
        ProviderKind::Google => {
            client
                .get(format!("{base_url}/models"))
                .query(&[("key", api_key)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?
        }
        ProviderKind::OpenAi
        | ProviderKind::OpenRouter
        | ProviderKind::LmStudio
        | ProviderKind::Grok
        | ProviderKind::Groq => {
            let mut request = client.get(format!("{base_url}/models"));
            if !api_key.is_empty() {
                request = request.bearer_auth(api_key);
            }
            request
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?
        }
    };

    normalize(provider.kind, &body)
}

fn normalize(kind: ProviderKind, body: &Value) -> Result<Vec<DiscoveredModel>> {
    let entries = match kind {
        ProviderKind::Ollama => body.get("models").and_then(Value::as_array),
        ProviderKind::Google => body.get("models").and_then(Value::as_array),
        _ => body.get("data").and_then(Value::as_array),
    }
    .ok_or_else(|| {
        KfError::Model(format!("Unexpected models payload from {kind} provider"))
    })?;

    let mut models = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(model) = normalize_entry(kind, entry) {
            models.push(model);
        }
    }
    models.sort_by(|a, b| a.model_identifier.cmp(&b.model_identifier));
    Ok(models)
}

fn normalize_entry(kind: ProviderKind, entry: &Value) -> Option<DiscoveredModel> {
    match kind {
        ProviderKind::Ollama => {
            let name = entry.get("name")?.as_str()?.to_string();
            Some(DiscoveredModel {
                display_name: name.clone(),
                model_identifier: name,
                max_context_length: None,
                max_output_tokens: None,
            })
        }
        ProviderKind::Google => {
            let name = entry.get("name")?.as_str()?;
            let identifier = name.strip_prefix("models/").unwrap_or(name).to_string();
            Some(DiscoveredModel {
                display_name: entry
                    .get("displayName")
                    .and_then(Value::as_str)
                    .unwrap_or(&identifier)
                    .to_string(),
                model_identifier: identifier,
                max_context_length: entry
                    .get("inputTokenLimit")
                    .and_then(Value::as_u64)
                    .map(|v| v as u32),
                max_output_tokens: entry
                    .get("outputTokenLimit")
                    .and_then(Value::as_u64)
                    .map(|v| v as u32),
            })
        }
        ProviderKind::Anthropic => {
            let id = entry.get("id")?.as_str()?.to_string();
            Some(DiscoveredModel {
                display_name: entry
                    .get("display_name")
                    .and_then(Value::as_str)
                    .unwrap_or(&id)
                    .to_string(),
                model_identifier: id,
                max_context_length: None,
                max_output_tokens: None,
            })
        }
        ProviderKind::OpenRouter => {
            let id = entry.get("id")?.as_str()?.to_string();
            Some(DiscoveredModel {
                display_name: entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(&id)
                    .to_string(),
                model_identifier: id,
                max_context_length: entry
                    .get("context_length")
                    .and_then(Value::as_u64)
                    .map(|v| v as u32),
                max_output_tokens: entry
                    .pointer("/top_provider/max_completion_tokens")
                    .and_then(Value::as_u64)
                    .map(|v| v as u32),
            })
        }
        ProviderKind::OpenAi | ProviderKind::LmStudio | ProviderKind::Grok | ProviderKind::Groq => {
            let id = entry.get("id")?.as_str()?.to_string();
            Some(DiscoveredModel {
                display_name: id.clone(),
                model_identifier: id,
                max_context_length: entry
                    .get("context_window")
                    .and_then(Value::as_u64)
                    .map(|v| v as u32),
                max_output_tokens: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openai_shape_normalizes_data_ids() {
        let body = json!({ "data": [ { "id": "gpt-4o-mini" }, { "id": "gpt-4o" } ] });
        let models = normalize(ProviderKind::OpenAi, &body).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].model_identifier, "gpt-4o");
        assert_eq!(models[0].display_name, "gpt-4o");
    }

    #[test]
    fn ollama_shape_reads_models_names() {
        let body = json!({ "models": [ { "name": "llama3.2:3b" }, { "name": "qwen2.5:7b" } ] });
        let models = normalize(ProviderKind::Ollama, &body).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].model_identifier, "llama3.2:3b");
    }

    #[test]
    fn google_shape_strips_models_prefix_and_reads_limits() {
        let body = json!({
            "models": [{
                "name": "models/gemini-2.0-flash",
                "displayName": "Gemini 2.0 Flash",
                "inputTokenLimit": 1000000,
                "outputTokenLimit": 8192
            }]
        });
        let models = normalize(ProviderKind::Google, &body).unwrap();
        assert_eq!(models[0].model_identifier, "gemini-2.0-flash");
        assert_eq!(models[0].display_name, "Gemini 2.0 Flash");
        assert_eq!(models[0].max_context_length, Some(1_000_000));
        assert_eq!(models[0].max_output_tokens, Some(8192));
    }

    #[test]
    fn openrouter_shape_reads_context_and_completion_limits() {
        let body = json!({
            "data": [{
                "id": "meta-llama/llama-3-70b",
                "name": "Llama 3 70B",
                "context_length": 8192,
                "top_provider": { "max_completion_tokens": 4096 }
            }]
        });
        let models = normalize(ProviderKind::OpenRouter, &body).unwrap();
        assert_eq!(models[0].display_name, "Llama 3 70B");
        assert_eq!(models[0].max_context_length, Some(8192));
        assert_eq!(models[0].max_output_tokens, Some(4096));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let body = json!({ "unexpected": true });
        assert!(normalize(ProviderKind::OpenAi, &body).is_err());
    }

    #[test]
    fn entries_missing_ids_are_skipped() {
        let body = json!({ "data": [ { "id": "good" }, { "object": "model" } ] });
        let models = normalize(ProviderKind::Groq, &body).unwrap();
        assert_eq!(models.len(), 1);
    }
}
