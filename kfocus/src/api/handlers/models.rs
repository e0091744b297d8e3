use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{KfError, Result};
use crate::gateway::{discover_models, run_capability_probes};
use crate::models::Capability;

pub async fn list_providers(State(state): State<AppState>) -> Result<Json<Value>> {
    let providers = state.store.list_providers().await?;
    Ok(Json(json!({ "success": true, "providers": providers })))
}

#[derive(Debug, Deserialize)]
pub struct AddProviderRequest {
    pub kind: String,
    pub display_name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

pub async fn add_provider(
    State(state): State<AppState>,
    Json(request): Json<AddProviderRequest>,
) -> Result<Json<Value>> {
    let provider = state
        .store
        .add_provider(
            &request.kind,
            &request.display_name,
            request.base_url.as_deref(),
            request.api_key.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "success": true, "provider": provider })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProviderRequest {
    pub display_name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub use_proxy: Option<bool>,
    pub is_active: Option<bool>,
}

pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProviderRequest>,
) -> Result<Json<Value>> {
    let provider = state
        .store
        .update_provider(
            id,
            request.display_name.as_deref(),
            request.base_url.as_deref(),
            request.api_key.as_deref(),
            request.use_proxy,
            request.is_active,
        )
        .await?;
    Ok(Json(json!({ "success": true, "provider": provider })))
}

/// Query the provider's live model list and upsert the results as
/// configurations.
pub async fn discover_provider_models(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let provider = state
        .store
        .get_provider(id)
        .await?
        .ok_or_else(|| KfError::NotFound(format!("Provider {id} not found")))?;

    let discovered = discover_models(&provider).await?;
    let mut configurations = Vec::with_capacity(discovered.len());
    for model in &discovered {
        configurations.push(
            state
                .store
                .upsert_configuration(
                    provider.id,
                    &model.model_identifier,
                    &model.display_name,
                    model.max_context_length,
                    model.max_output_tokens,
                )
                .await?,
        );
    }

    Ok(Json(json!({
        "success": true,
        "discovered": discovered.len(),
        "configurations": configurations,
    })))
}

pub async fn list_configurations(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let configurations = state.store.list_configurations(id).await?;
    Ok(Json(json!({ "success": true, "configurations": configurations })))
}

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    pub capabilities: Option<Vec<Capability>>,
}

/// Run the capability test matrix against one configuration. Read-only:
/// confirmed capabilities are recorded only via the explicit
/// `add_capability` endpoint.
pub async fn probe_configuration(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ProbeRequest>,
) -> Result<Json<Value>> {
    let configuration = state
        .store
        .get_configuration(id)
        .await?
        .ok_or_else(|| KfError::NotFound(format!("Configuration {id} not found")))?;
    let provider = state
        .store
        .get_provider(configuration.provider_id)
        .await?
        .ok_or_else(|| {
            KfError::NotFound(format!("Provider {} not found", configuration.provider_id))
        })?;

    let resolved = crate::models::ResolvedModel {
        model_identifier: configuration.model_identifier.clone(),
        base_url: provider
            .base_url
            .clone()
            .unwrap_or_else(|| provider.kind.default_base_url().to_string()),
        api_key: provider.api_key.clone(),
        use_proxy: provider.use_proxy,
        max_context_length: configuration.max_context_length,
        max_output_tokens: configuration.max_output_tokens,
    };

    let capabilities = request
        .capabilities
        .unwrap_or_else(|| Capability::ALL.to_vec());
    let report = run_capability_probes(&resolved, &capabilities, 60).await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

#[derive(Debug, Deserialize)]
pub struct AddCapabilityRequest {
    pub capability: Capability,
}

pub async fn add_capability(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AddCapabilityRequest>,
) -> Result<Json<Value>> {
    state.store.add_capability(id, request.capability).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct AssignCapabilityRequest {
    pub configuration_id: i64,
}

pub async fn assign_capability(
    State(state): State<AppState>,
    Path(capability): Path<String>,
    Json(request): Json<AssignCapabilityRequest>,
) -> Result<Json<Value>> {
    let capability: Capability = capability.parse().map_err(KfError::Validation)?;
    let assignment = state
        .store
        .assign_capability(capability, request.configuration_id)
        .await?;
    Ok(Json(json!({ "success": true, "assignment": assignment })))
}

pub async fn clear_assignment(
    State(state): State<AppState>,
    Path(capability): Path<String>,
) -> Result<Json<Value>> {
    let capability: Capability = capability.parse().map_err(KfError::Validation)?;
    let cleared = state.store.clear_capability_assignment(capability).await?;
    Ok(Json(json!({ "success": cleared })))
}
