use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::config::{CONVERTIBLE_EXTENSIONS, PLAIN_TEXT_EXTENSIONS};
use crate::db::MonitoredDirectory;
use crate::error::{KfError, Result};

const CONFIG_ALL_TIMEOUT: Duration = Duration::from_secs(5);
const CONFIG_ALL_KEY: &str = "config_all";
const HIERARCHY_KEY: &str = "folders_hierarchy";

/// Aggregate configuration for the host shell. Hard 5 s budget; on
/// timeout the last cached payload is served if one exists.
pub async fn config_all(State(state): State<AppState>) -> Result<Json<Value>> {
    if let Some(cached) = state.config_cache.get(&CONFIG_ALL_KEY.to_string()) {
        return Ok(Json(cached));
    }

    match tokio::time::timeout(CONFIG_ALL_TIMEOUT, build_config_all(&state)).await {
        Ok(Ok(payload)) => {
            state
                .config_cache
                .insert(CONFIG_ALL_KEY.to_string(), payload.clone());
            Ok(Json(payload))
        }
        Ok(Err(error)) => Err(error),
        Err(_) => match state.config_cache.get_stale(&CONFIG_ALL_KEY.to_string()) {
            Some(stale) => {
                tracing::warn!("config/all timed out, serving cached payload");
                Ok(Json(stale))
            }
            None => Err(KfError::Timeout(
                "config/all exceeded its 5s budget with no cache available".into(),
            )),
        },
    }
}

async fn build_config_all(state: &AppState) -> Result<Value> {
    let directories = state.store.list_directories().await?;
    let bundle_extensions = state.store.list_bundle_extensions(None).await?;
    let categories = state.store.list_categories().await?;
    let filter_rules = state.store.list_filter_rules(false).await?;
    let extension_map = extension_category_map(state).await?;
    let full_disk_access = if cfg!(target_os = "macos") {
        state
            .store
            .get_config_value("full_disk_access")
            .await?
            .map(|v| v == "true")
            .unwrap_or(false)
    } else {
        true
    };

    let mut parsable: Vec<&str> = Vec::new();
    parsable.extend_from_slice(CONVERTIBLE_EXTENSIONS);
    parsable.extend_from_slice(PLAIN_TEXT_EXTENSIONS);

    Ok(json!({
        "monitored_folders": directories
            .iter()
            .map(directory_json)
            .collect::<Vec<_>>(),
        "categories": categories,
        "filter_rules": filter_rules,
        "file_extension_map": extension_map,
        "parsable_extensions": parsable,
        "bundle_extensions": bundle_extensions
            .iter()
            .map(|b| json!({ "id": b.id, "extension": b.extension, "os": b.os }))
            .collect::<Vec<_>>(),
        "full_disk_access": full_disk_access,
    }))
}

/// Extension → category lookup, flattened for fast classification on the
/// watcher side. The legacy `file_extension_map` config key overlays the
/// table so hand-edited entries keep working.
async fn extension_category_map(state: &AppState) -> Result<Value> {
    let categories = state.store.list_categories().await?;
    let names: std::collections::HashMap<i64, &str> = categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    let mut map = serde_json::Map::new();
    for mapping in state.store.list_extension_mappings().await? {
        map.insert(
            mapping.extension.clone(),
            json!({
                "category_id": mapping.category_id,
                "category_name": names.get(&mapping.category_id).copied().unwrap_or("other"),
                "priority": mapping.priority,
            }),
        );
    }

    if let Some(Value::Object(overlay)) = state
        .store
        .get_config_value("file_extension_map")
        .await?
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
    {
        map.extend(overlay);
    }

    Ok(Value::Object(map))
}

pub async fn get_system_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let value = state
        .store
        .get_config_value(&key)
        .await?
        .ok_or_else(|| KfError::NotFound(format!("Config key {key} not found")))?;
    Ok(Json(json!({ "success": true, "key": key, "value": value })))
}

#[derive(Debug, Deserialize)]
pub struct PutConfigRequest {
    pub value: String,
}

pub async fn put_system_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<PutConfigRequest>,
) -> Result<Json<Value>> {
    state.store.set_config_value(&key, &request.value).await?;
    state.config_cache.invalidate(&CONFIG_ALL_KEY.to_string());
    Ok(Json(json!({ "success": true, "key": key })))
}

fn directory_json(directory: &MonitoredDirectory) -> Value {
    json!({
        "id": directory.id,
        "path": directory.path,
        "alias": directory.alias,
        "is_blacklist": directory.is_blacklist,
        "parent_id": directory.parent_id,
    })
}

pub async fn list_directories(State(state): State<AppState>) -> Result<Json<Value>> {
    let directories = state.store.list_directories().await?;
    Ok(Json(json!({
        "success": true,
        "directories": directories.iter().map(directory_json).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct AddDirectoryRequest {
    pub path: String,
    pub alias: Option<String>,
    #[serde(default)]
    pub is_blacklist: bool,
    pub parent_id: Option<i64>,
}

pub async fn add_directory(
    State(state): State<AppState>,
    Json(request): Json<AddDirectoryRequest>,
) -> Result<Json<Value>> {
    if request.path.trim().is_empty() {
        return Err(KfError::Validation("Directory path cannot be empty".into()));
    }
    let directory = state
        .store
        .add_directory(
            &request.path,
            request.alias.as_deref(),
            request.is_blacklist,
            request.parent_id,
        )
        .await?;
    invalidate_folder_caches(&state);

    if request.is_blacklist {
        purge_under_prefix(&state, &request.path).await?;
    }
    Ok(Json(json!({ "success": true, "directory": directory_json(&directory) })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDirectoryRequest {
    pub alias: Option<String>,
    pub is_blacklist: Option<bool>,
}

pub async fn update_directory(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateDirectoryRequest>,
) -> Result<Json<Value>> {
    let directory = state
        .store
        .update_directory(id, request.alias.as_deref(), request.is_blacklist)
        .await?;
    invalidate_folder_caches(&state);

    // Newly blacklisted: purge everything indexed under the prefix.
    if request.is_blacklist == Some(true) {
        let purged = purge_under_prefix(&state, &directory.path).await?;
        return Ok(Json(json!({
            "success": true,
            "directory": directory_json(&directory),
            "purged_screenings": purged,
        })));
    }
    Ok(Json(json!({ "success": true, "directory": directory_json(&directory) })))
}

pub async fn delete_directory(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let deleted = state.store.delete_directory(id).await?;
    invalidate_folder_caches(&state);
    Ok(Json(json!({ "success": deleted })))
}

/// Blacklist cascade: screening rows, documents (with chunks) and their
/// vector records all go.
async fn purge_under_prefix(state: &AppState, prefix: &str) -> Result<u64> {
    let purged = state.store.delete_screenings_under_prefix(prefix).await?;

    let documents = state.store.get_documents_under_prefix(prefix).await?;
    for document in documents {
        state.vectors.delete_by_document(document.id).await?;
        state.store.delete_document(document.id).await?;
    }

    tracing::info!(prefix, purged, "Purged indexed data under blacklisted folder");
    Ok(purged)
}

fn invalidate_folder_caches(state: &AppState) {
    state.config_cache.invalidate(&CONFIG_ALL_KEY.to_string());
    state.config_cache.invalidate(&HIERARCHY_KEY.to_string());
}

#[derive(Debug, Deserialize)]
pub struct BundleQuery {
    pub os: Option<String>,
}

pub async fn list_bundle_extensions(
    State(state): State<AppState>,
    Query(query): Query<BundleQuery>,
) -> Result<Json<Value>> {
    let extensions = state
        .store
        .list_bundle_extensions(query.os.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "bundle_extensions": extensions
            .iter()
            .map(|b| json!({ "id": b.id, "extension": b.extension, "os": b.os }))
            .collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct AddBundleExtensionRequest {
    pub extension: String,
    #[serde(default = "default_os")]
    pub os: String,
}

fn default_os() -> String {
    "macos".to_string()
}

pub async fn add_bundle_extension(
    State(state): State<AppState>,
    Json(request): Json<AddBundleExtensionRequest>,
) -> Result<Json<Value>> {
    let added = state
        .store
        .add_bundle_extension(&request.extension, &request.os)
        .await?;
    invalidate_folder_caches(&state);
    Ok(Json(json!({
        "success": true,
        "bundle_extension": { "id": added.id, "extension": added.extension, "os": added.os },
    })))
}

pub async fn delete_bundle_extension(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let deleted = state.store.delete_bundle_extension(id).await?;
    invalidate_folder_caches(&state);
    Ok(Json(json!({ "success": deleted })))
}

/// Everything the watcher needs to screen files in one payload:
/// extension→category mapping, enabled filename rules, project rules and
/// the flattened exclude list.
pub async fn watcher_rules(State(state): State<AppState>) -> Result<Json<Value>> {
    let extension_mapping = extension_category_map(&state).await?;
    let filter_rules = state.store.list_filter_rules(true).await?;
    let project_rules = state.store.list_project_rules(true).await?;

    let exclude_rules: Vec<Value> = filter_rules
        .iter()
        .filter(|rule| rule.action == crate::models::RuleAction::Exclude)
        .map(|rule| {
            json!({
                "pattern": rule.pattern,
                "pattern_type": rule.pattern_type,
                "priority": rule.priority,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "extension_mapping": extension_mapping,
        "filename_rules": filter_rules,
        "project_rules": project_rules,
        "exclude_rules": exclude_rules,
        "version": "1.0",
    })))
}

pub async fn create_filter_rule(
    State(state): State<AppState>,
    Json(rule): Json<crate::models::NewFilterRule>,
) -> Result<Json<Value>> {
    if rule.name.trim().is_empty() || rule.pattern.trim().is_empty() {
        return Err(KfError::Validation(
            "Filter rules need a name and a pattern".into(),
        ));
    }
    let created = state.store.add_filter_rule(&rule).await?;
    state.config_cache.invalidate(&CONFIG_ALL_KEY.to_string());
    Ok(Json(json!({ "success": true, "rule": created })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRuleRequest {
    pub enabled: bool,
}

pub async fn toggle_filter_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ToggleRuleRequest>,
) -> Result<Json<Value>> {
    let rule = state
        .store
        .set_filter_rule_enabled(id, request.enabled)
        .await?;
    state.config_cache.invalidate(&CONFIG_ALL_KEY.to_string());
    Ok(Json(json!({ "success": true, "rule": rule })))
}

/// Whitelist parents with their blacklist children nested underneath.
pub async fn folders_hierarchy(State(state): State<AppState>) -> Result<Json<Value>> {
    if let Some(cached) = state.config_cache.get(&HIERARCHY_KEY.to_string()) {
        return Ok(Json(cached));
    }

    let directories = state.store.list_directories().await?;
    let mut parents: Vec<Value> = Vec::new();
    for directory in directories.iter().filter(|d| !d.is_blacklist) {
        let children: Vec<Value> = directories
            .iter()
            .filter(|child| {
                child.is_blacklist
                    && (child.parent_id == Some(directory.id)
                        || child.path.starts_with(&directory.path))
            })
            .map(directory_json)
            .collect();
        let mut parent = directory_json(directory);
        parent["blacklist_children"] = Value::Array(children);
        parents.push(parent);
    }

    let payload = json!({ "success": true, "hierarchy": parents });
    state
        .config_cache
        .insert(HIERARCHY_KEY.to_string(), payload.clone());
    Ok(Json(payload))
}
