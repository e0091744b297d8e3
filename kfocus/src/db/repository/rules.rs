use libsql::{params, Connection};

use crate::error::{KfError, Result};
use crate::models::{
    FileCategory, FileExtensionMapping, FileFilterRule, FilterRuleType, NewFilterRule,
    ProjectRecognitionRule, ProjectRuleType, RuleAction, RulePatternType, RulePriority,
};

use super::parse_json_opt;

const FILTER_RULE_COLUMNS: &str = "id, name, description, rule_type, pattern, pattern_type, \
     action, priority, enabled, category_id, extra_data";
const PROJECT_RULE_COLUMNS: &str =
    "id, name, description, rule_type, pattern, priority, indicators, enabled";

pub struct RuleRepository;

impl RuleRepository {
    pub async fn list_categories(conn: &Connection) -> Result<Vec<FileCategory>> {
        let mut rows = conn
            .query(
                "SELECT id, name, description, icon FROM t_file_categories ORDER BY id",
                (),
            )
            .await?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(FileCategory {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                icon: row.get(3)?,
            });
        }
        Ok(categories)
    }

    pub async fn upsert_category(
        conn: &Connection,
        name: &str,
        description: Option<&str>,
        icon: Option<&str>,
    ) -> Result<FileCategory> {
        conn.execute(
            r#"
            INSERT INTO t_file_categories (name, description, icon) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                description = COALESCE(excluded.description, description),
                icon = COALESCE(excluded.icon, icon)
            "#,
            params![
                name.to_string(),
                description.map(|d| d.to_string()),
                icon.map(|i| i.to_string()),
            ],
        )
        .await?;

        let mut rows = conn
            .query(
                "SELECT id, name, description, icon FROM t_file_categories WHERE name = ?1",
                params![name.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(FileCategory {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                icon: row.get(3)?,
            }),
            None => Err(KfError::Internal("Category vanished after upsert".into())),
        }
    }

    pub async fn list_extension_mappings(
        conn: &Connection,
    ) -> Result<Vec<FileExtensionMapping>> {
        let mut rows = conn
            .query(
                "SELECT id, extension, category_id, description, priority \
                 FROM t_file_extension_map ORDER BY extension",
                (),
            )
            .await?;
        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            let priority: String = row.get(4)?;
            mappings.push(FileExtensionMapping {
                id: row.get(0)?,
                extension: row.get(1)?,
                category_id: row.get(2)?,
                description: row.get(3)?,
                priority: priority.parse().unwrap_or(RulePriority::Medium),
            });
        }
        Ok(mappings)
    }

    pub async fn upsert_extension_mapping(
        conn: &Connection,
        extension: &str,
        category_id: i64,
        priority: RulePriority,
    ) -> Result<FileExtensionMapping> {
        conn.execute(
            r#"
            INSERT INTO t_file_extension_map (extension, category_id, priority)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(extension) DO UPDATE SET
                category_id = excluded.category_id,
                priority = excluded.priority
            "#,
            params![extension.to_string(), category_id, priority.to_string()],
        )
        .await?;

        let mut rows = conn
            .query(
                "SELECT id, extension, category_id, description, priority \
                 FROM t_file_extension_map WHERE extension = ?1",
                params![extension.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let priority: String = row.get(4)?;
                Ok(FileExtensionMapping {
                    id: row.get(0)?,
                    extension: row.get(1)?,
                    category_id: row.get(2)?,
                    description: row.get(3)?,
                    priority: priority.parse().unwrap_or(RulePriority::Medium),
                })
            }
            None => Err(KfError::Internal(
                "Extension mapping vanished after upsert".into(),
            )),
        }
    }

    pub async fn list_filter_rules(
        conn: &Connection,
        enabled_only: bool,
    ) -> Result<Vec<FileFilterRule>> {
        let filter = if enabled_only { "WHERE enabled = 1" } else { "" };
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {FILTER_RULE_COLUMNS} FROM t_file_filter_rules {filter} \
                     ORDER BY CASE priority WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END, id"
                ),
                (),
            )
            .await?;
        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(Self::filter_rule_from_row(&row)?);
        }
        Ok(rules)
    }

    pub async fn add_filter_rule(
        conn: &Connection,
        rule: &NewFilterRule,
    ) -> Result<FileFilterRule> {
        conn.execute(
            r#"
            INSERT INTO t_file_filter_rules
                (name, description, rule_type, pattern, pattern_type, action,
                 priority, enabled, category_id, extra_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)
            "#,
            params![
                rule.name.clone(),
                rule.description.clone(),
                rule.rule_type.to_string(),
                rule.pattern.clone(),
                rule.pattern_type.to_string(),
                rule.action.to_string(),
                rule.priority.to_string(),
                rule.category_id,
                rule.extra_data.as_ref().map(|v| v.to_string()),
            ],
        )
        .await?;

        let id = conn.last_insert_rowid();
        Self::get_filter_rule(conn, id)
            .await?
            .ok_or_else(|| KfError::Internal(format!("Filter rule {id} vanished after insert")))
    }

    pub async fn get_filter_rule(conn: &Connection, id: i64) -> Result<Option<FileFilterRule>> {
        let mut rows = conn
            .query(
                &format!("SELECT {FILTER_RULE_COLUMNS} FROM t_file_filter_rules WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::filter_rule_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn set_filter_rule_enabled(
        conn: &Connection,
        id: i64,
        enabled: bool,
    ) -> Result<FileFilterRule> {
        let changed = conn
            .execute(
                "UPDATE t_file_filter_rules SET enabled = ?2 WHERE id = ?1",
                params![id, enabled as i64],
            )
            .await?;
        if changed == 0 {
            return Err(KfError::NotFound(format!("Filter rule {id} not found")));
        }
        Self::get_filter_rule(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Filter rule {id} not found")))
    }

    pub async fn list_project_rules(
        conn: &Connection,
        enabled_only: bool,
    ) -> Result<Vec<ProjectRecognitionRule>> {
        let filter = if enabled_only { "WHERE enabled = 1" } else { "" };
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PROJECT_RULE_COLUMNS} FROM t_project_recognition_rules {filter} \
                     ORDER BY CASE priority WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END, id"
                ),
                (),
            )
            .await?;
        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            let rule_type: String = row.get(3)?;
            let priority: String = row.get(5)?;
            rules.push(ProjectRecognitionRule {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                rule_type: rule_type.parse().unwrap_or(ProjectRuleType::NamePattern),
                pattern: row.get(4)?,
                priority: priority.parse().unwrap_or(RulePriority::Medium),
                indicators: parse_json_opt(row.get(6)?),
                enabled: row.get::<i64>(7)? != 0,
            });
        }
        Ok(rules)
    }

    fn filter_rule_from_row(row: &libsql::Row) -> Result<FileFilterRule> {
        let rule_type: String = row.get(3)?;
        let pattern_type: String = row.get(5)?;
        let action: String = row.get(6)?;
        let priority: String = row.get(7)?;

        Ok(FileFilterRule {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            rule_type: rule_type.parse().unwrap_or(FilterRuleType::Filename),
            pattern: row.get(4)?,
            pattern_type: pattern_type.parse().unwrap_or(RulePatternType::Regex),
            action: action.parse().map_err(KfError::Internal)?,
            priority: priority.parse().unwrap_or(RulePriority::Medium),
            enabled: row.get::<i64>(8)? != 0,
            category_id: row.get(9)?,
            extra_data: parse_json_opt(row.get(10)?),
        })
    }
}
