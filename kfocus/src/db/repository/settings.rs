use chrono::Utc;
use libsql::{params, Connection};

use crate::db::traits::{BundleExtension, MonitoredDirectory};
use crate::error::{KfError, Result};

pub struct SettingsRepository;

impl SettingsRepository {
    pub async fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
        let mut rows = conn
            .query(
                "SELECT value FROM t_system_config WHERE key = ?1",
                params![key.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO t_system_config (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key.to_string(), value.to_string(), Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }

    pub async fn list_directories(conn: &Connection) -> Result<Vec<MonitoredDirectory>> {
        let mut rows = conn
            .query(
                "SELECT id, path, alias, is_blacklist, parent_id FROM t_monitored_directories \
                 ORDER BY path",
                (),
            )
            .await?;
        let mut directories = Vec::new();
        while let Some(row) = rows.next().await? {
            directories.push(Self::directory_from_row(&row)?);
        }
        Ok(directories)
    }

    pub async fn get_directory(conn: &Connection, id: i64) -> Result<Option<MonitoredDirectory>> {
        let mut rows = conn
            .query(
                "SELECT id, path, alias, is_blacklist, parent_id FROM t_monitored_directories \
                 WHERE id = ?1",
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::directory_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn add_directory(
        conn: &Connection,
        path: &str,
        alias: Option<&str>,
        is_blacklist: bool,
        parent_id: Option<i64>,
    ) -> Result<MonitoredDirectory> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO t_monitored_directories (path, alias, is_blacklist, parent_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                path.to_string(),
                alias.map(|a| a.to_string()),
                is_blacklist as i64,
                parent_id,
                now,
            ],
        )
        .await?;

        let id = conn.last_insert_rowid();
        Self::get_directory(conn, id)
            .await?
            .ok_or_else(|| KfError::Internal(format!("Directory {id} vanished after insert")))
    }

    pub async fn update_directory(
        conn: &Connection,
        id: i64,
        alias: Option<&str>,
        is_blacklist: Option<bool>,
    ) -> Result<MonitoredDirectory> {
        let existing = Self::get_directory(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Directory {id} not found")))?;

        conn.execute(
            "UPDATE t_monitored_directories SET alias = ?2, is_blacklist = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![
                id,
                alias.map(|a| a.to_string()).or(existing.alias),
                is_blacklist.unwrap_or(existing.is_blacklist) as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Self::get_directory(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Directory {id} not found")))
    }

    pub async fn delete_directory(conn: &Connection, id: i64) -> Result<bool> {
        let deleted = conn
            .execute(
                "DELETE FROM t_monitored_directories WHERE id = ?1",
                params![id],
            )
            .await?;
        Ok(deleted > 0)
    }

    pub async fn list_bundle_extensions(
        conn: &Connection,
        os: Option<&str>,
    ) -> Result<Vec<BundleExtension>> {
        let mut extensions = Vec::new();
        if let Some(os) = os {
            let mut rows = conn
                .query(
                    "SELECT id, extension, os FROM t_bundle_extensions WHERE os = ?1 \
                     ORDER BY extension",
                    params![os.to_string()],
                )
                .await?;
            while let Some(row) = rows.next().await? {
                extensions.push(Self::bundle_from_row(&row)?);
            }
        } else {
            let mut rows = conn
                .query(
                    "SELECT id, extension, os FROM t_bundle_extensions ORDER BY extension",
                    (),
                )
                .await?;
            while let Some(row) = rows.next().await? {
                extensions.push(Self::bundle_from_row(&row)?);
            }
        }
        Ok(extensions)
    }

    pub async fn add_bundle_extension(
        conn: &Connection,
        extension: &str,
        os: &str,
    ) -> Result<BundleExtension> {
        conn.execute(
            "INSERT OR IGNORE INTO t_bundle_extensions (extension, os, created_at) \
             VALUES (?1, ?2, ?3)",
            params![
                extension.to_string(),
                os.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        let mut rows = conn
            .query(
                "SELECT id, extension, os FROM t_bundle_extensions WHERE extension = ?1",
                params![extension.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Self::bundle_from_row(&row),
            None => Err(KfError::Internal(
                "Bundle extension vanished after insert".into(),
            )),
        }
    }

    pub async fn delete_bundle_extension(conn: &Connection, id: i64) -> Result<bool> {
        let deleted = conn
            .execute(
                "DELETE FROM t_bundle_extensions WHERE id = ?1",
                params![id],
            )
            .await?;
        Ok(deleted > 0)
    }

    fn directory_from_row(row: &libsql::Row) -> Result<MonitoredDirectory> {
        Ok(MonitoredDirectory {
            id: row.get(0)?,
            path: row.get(1)?,
            alias: row.get(2)?,
            is_blacklist: row.get::<i64>(3)? != 0,
            parent_id: row.get(4)?,
        })
    }

    fn bundle_from_row(row: &libsql::Row) -> Result<BundleExtension> {
        Ok(BundleExtension {
            id: row.get(0)?,
            extension: row.get(1)?,
            os: row.get(2)?,
        })
    }
}
