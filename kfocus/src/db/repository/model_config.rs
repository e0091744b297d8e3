use chrono::Utc;
use libsql::{params, Connection};

use crate::error::{KfError, Result};
use crate::models::{
    Capability, CapabilityAssignment, ModelConfiguration, ModelProvider, ProviderKind,
    ResolvedModel,
};

use super::parse_dt;

const PROVIDER_COLUMNS: &str =
    "id, kind, display_name, base_url, api_key, use_proxy, is_active, created_at, updated_at";
const CONFIGURATION_COLUMNS: &str = "id, provider_id, model_identifier, display_name, \
     max_context_length, max_output_tokens, capabilities, is_enabled, created_at, updated_at";

pub struct ModelConfigRepository;

impl ModelConfigRepository {
    pub async fn list_providers(conn: &Connection) -> Result<Vec<ModelProvider>> {
        let mut rows = conn
            .query(
                &format!("SELECT {PROVIDER_COLUMNS} FROM t_model_providers ORDER BY id"),
                (),
            )
            .await?;
        let mut providers = Vec::new();
        while let Some(row) = rows.next().await? {
            providers.push(Self::provider_from_row(&row)?);
        }
        Ok(providers)
    }

    pub async fn get_provider(conn: &Connection, id: i64) -> Result<Option<ModelProvider>> {
        let mut rows = conn
            .query(
                &format!("SELECT {PROVIDER_COLUMNS} FROM t_model_providers WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::provider_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn add_provider(
        conn: &Connection,
        kind: &str,
        display_name: &str,
        base_url: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<ModelProvider> {
        kind.parse::<ProviderKind>()
            .map_err(KfError::Validation)?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO t_model_providers (kind, display_name, base_url, api_key, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                kind.to_string(),
                display_name.to_string(),
                base_url.map(|u| u.to_string()),
                api_key.map(|k| k.to_string()),
                now,
            ],
        )
        .await?;

        let id = conn.last_insert_rowid();
        Self::get_provider(conn, id)
            .await?
            .ok_or_else(|| KfError::Internal(format!("Provider {id} vanished after insert")))
    }

    pub async fn update_provider(
        conn: &Connection,
        id: i64,
        display_name: Option<&str>,
        base_url: Option<&str>,
        api_key: Option<&str>,
        use_proxy: Option<bool>,
        is_active: Option<bool>,
    ) -> Result<ModelProvider> {
        let existing = Self::get_provider(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Provider {id} not found")))?;

        conn.execute(
            r#"
            UPDATE t_model_providers SET
                display_name = ?2, base_url = ?3, api_key = ?4,
                use_proxy = ?5, is_active = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                id,
                display_name
                    .map(|n| n.to_string())
                    .unwrap_or(existing.display_name),
                base_url.map(|u| u.to_string()).or(existing.base_url),
                api_key.map(|k| k.to_string()).or(existing.api_key),
                use_proxy.unwrap_or(existing.use_proxy) as i64,
                is_active.unwrap_or(existing.is_active) as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Self::get_provider(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Provider {id} not found")))
    }

    pub async fn list_configurations(
        conn: &Connection,
        provider_id: i64,
    ) -> Result<Vec<ModelConfiguration>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CONFIGURATION_COLUMNS} FROM t_model_configurations \
                     WHERE provider_id = ?1 ORDER BY id"
                ),
                params![provider_id],
            )
            .await?;
        let mut configurations = Vec::new();
        while let Some(row) = rows.next().await? {
            configurations.push(Self::configuration_from_row(&row)?);
        }
        Ok(configurations)
    }

    pub async fn get_configuration(
        conn: &Connection,
        id: i64,
    ) -> Result<Option<ModelConfiguration>> {
        let mut rows = conn
            .query(
                &format!("SELECT {CONFIGURATION_COLUMNS} FROM t_model_configurations WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::configuration_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_configuration(
        conn: &Connection,
        provider_id: i64,
        model_identifier: &str,
        display_name: &str,
        max_context_length: Option<u32>,
        max_output_tokens: Option<u32>,
    ) -> Result<ModelConfiguration> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO t_model_configurations (
                provider_id, model_identifier, display_name,
                max_context_length, max_output_tokens, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(provider_id, model_identifier) DO UPDATE SET
                display_name = excluded.display_name,
                max_context_length = COALESCE(excluded.max_context_length, max_context_length),
                max_output_tokens = COALESCE(excluded.max_output_tokens, max_output_tokens),
                updated_at = excluded.updated_at
            "#,
            params![
                provider_id,
                model_identifier.to_string(),
                display_name.to_string(),
                max_context_length,
                max_output_tokens,
                now,
            ],
        )
        .await?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CONFIGURATION_COLUMNS} FROM t_model_configurations \
                     WHERE provider_id = ?1 AND model_identifier = ?2"
                ),
                params![provider_id, model_identifier.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Self::configuration_from_row(&row),
            None => Err(KfError::Internal(
                "Configuration vanished after upsert".into(),
            )),
        }
    }

    /// Record that a probe (or the user) confirmed this capability on the
    /// configuration. Idempotent.
    pub async fn add_capability(
        conn: &Connection,
        configuration_id: i64,
        capability: Capability,
    ) -> Result<()> {
        let configuration = Self::get_configuration(conn, configuration_id)
            .await?
            .ok_or_else(|| {
                KfError::NotFound(format!("Configuration {configuration_id} not found"))
            })?;

        let mut capabilities = configuration.capabilities;
        if !capabilities.contains(&capability) {
            capabilities.push(capability);
        }

        conn.execute(
            "UPDATE t_model_configurations SET capabilities = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                configuration_id,
                serde_json::to_string(&capabilities)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn assign_capability(
        conn: &Connection,
        capability: Capability,
        configuration_id: i64,
    ) -> Result<CapabilityAssignment> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO t_capability_assignments (capability, model_configuration_id, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(capability) DO UPDATE SET
                model_configuration_id = excluded.model_configuration_id,
                updated_at = excluded.updated_at
            "#,
            params![capability.to_string(), configuration_id, now],
        )
        .await?;

        let mut rows = conn
            .query(
                "SELECT id, capability, model_configuration_id, updated_at \
                 FROM t_capability_assignments WHERE capability = ?1",
                params![capability.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let capability_str: String = row.get(1)?;
                Ok(CapabilityAssignment {
                    id: row.get(0)?,
                    capability: capability_str
                        .parse()
                        .map_err(KfError::Internal)?,
                    model_configuration_id: row.get(2)?,
                    updated_at: parse_dt(&row.get::<String>(3)?)?,
                })
            }
            None => Err(KfError::Internal("Assignment vanished after upsert".into())),
        }
    }

    pub async fn clear_assignment(conn: &Connection, capability: Capability) -> Result<bool> {
        let deleted = conn
            .execute(
                "DELETE FROM t_capability_assignments WHERE capability = ?1",
                params![capability.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    /// Capability → callable model, or `None` when the chain is broken
    /// anywhere (unassigned, configuration disabled, provider inactive).
    pub async fn resolve(
        conn: &Connection,
        capability: Capability,
    ) -> Result<Option<ResolvedModel>> {
        let mut rows = conn
            .query(
                r#"
                SELECT
                    c.model_identifier, c.max_context_length, c.max_output_tokens,
                    p.kind, p.base_url, p.api_key, p.use_proxy
                FROM t_capability_assignments a
                JOIN t_model_configurations c ON a.model_configuration_id = c.id
                JOIN t_model_providers p ON c.provider_id = p.id
                WHERE a.capability = ?1 AND c.is_enabled = 1 AND p.is_active = 1
                "#,
                params![capability.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let kind: String = row.get(3)?;
                let kind: ProviderKind = kind.parse().map_err(KfError::Internal)?;
                let base_url: Option<String> = row.get(4)?;
                Ok(Some(ResolvedModel {
                    model_identifier: row.get(0)?,
                    max_context_length: row.get::<Option<i64>>(1)?.map(|v| v as u32),
                    max_output_tokens: row.get::<Option<i64>>(2)?.map(|v| v as u32),
                    base_url: base_url.unwrap_or_else(|| kind.default_base_url().to_string()),
                    api_key: row.get(5)?,
                    use_proxy: row.get::<i64>(6)? != 0,
                }))
            }
            None => Ok(None),
        }
    }

    fn provider_from_row(row: &libsql::Row) -> Result<ModelProvider> {
        let kind: String = row.get(1)?;
        Ok(ModelProvider {
            id: row.get(0)?,
            kind: kind.parse().map_err(KfError::Internal)?,
            display_name: row.get(2)?,
            base_url: row.get(3)?,
            api_key: row.get(4)?,
            use_proxy: row.get::<i64>(5)? != 0,
            is_active: row.get::<i64>(6)? != 0,
            created_at: parse_dt(&row.get::<String>(7)?)?,
            updated_at: parse_dt(&row.get::<String>(8)?)?,
        })
    }

    fn configuration_from_row(row: &libsql::Row) -> Result<ModelConfiguration> {
        let capabilities: String = row.get(6)?;
        Ok(ModelConfiguration {
            id: row.get(0)?,
            provider_id: row.get(1)?,
            model_identifier: row.get(2)?,
            display_name: row.get(3)?,
            max_context_length: row.get::<Option<i64>>(4)?.map(|v| v as u32),
            max_output_tokens: row.get::<Option<i64>>(5)?.map(|v| v as u32),
            capabilities: serde_json::from_str(&capabilities).unwrap_or_default(),
            is_enabled: row.get::<i64>(7)? != 0,
            created_at: parse_dt(&row.get::<String>(8)?)?,
            updated_at: parse_dt(&row.get::<String>(9)?)?,
        })
    }
}
