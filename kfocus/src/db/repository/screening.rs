use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{FileScreening, ScreeningStatus, ScreeningSubmission};

use super::{parse_dt, parse_dt_opt, parse_json_opt, placeholders};

const SCREENING_COLUMNS: &str = "id, file_path, file_name, file_size, extension, file_hash, \
     created_time, modified_time, category_id, matched_rules, extra_metadata, status, \
     error_message, tagged_time, tags_display_ids, task_id, created_at, updated_at";

pub struct ScreeningRepository;

impl ScreeningRepository {
    /// Insert a new screening row, or reset an existing `(file_path,
    /// file_hash)` pair to `pending` while refreshing its metadata.
    pub async fn upsert(
        conn: &Connection,
        submission: &ScreeningSubmission,
    ) -> Result<FileScreening> {
        let now = Utc::now().to_rfc3339();

        let mut rows = conn
            .query(
                "SELECT id FROM t_file_screening WHERE file_path = ?1 AND file_hash IS ?2",
                params![
                    submission.file_path.clone(),
                    submission.file_hash.clone(),
                ],
            )
            .await?;

        let existing_id = match rows.next().await? {
            Some(row) => Some(row.get::<i64>(0)?),
            None => None,
        };

        let id = if let Some(id) = existing_id {
            conn.execute(
                r#"
                UPDATE t_file_screening SET
                    file_name = ?2,
                    file_size = ?3,
                    extension = ?4,
                    created_time = ?5,
                    modified_time = ?6,
                    category_id = ?7,
                    matched_rules = ?8,
                    extra_metadata = ?9,
                    status = 'pending',
                    error_message = NULL,
                    task_id = ?10,
                    updated_at = ?11
                WHERE id = ?1
                "#,
                params![
                    id,
                    submission.file_name.clone(),
                    submission.file_size,
                    submission.extension.clone(),
                    submission.created_time.map(|t| t.to_rfc3339()),
                    submission.modified_time.map(|t| t.to_rfc3339()),
                    submission.category_id,
                    submission.matched_rules.as_ref().map(|v| v.to_string()),
                    submission
                        .extra_metadata
                        .as_ref()
                        .and_then(|m| serde_json::to_string(m).ok()),
                    submission.task_id,
                    now.clone(),
                ],
            )
            .await?;
            id
        } else {
            conn.execute(
                r#"
                INSERT INTO t_file_screening (
                    file_path, file_name, file_size, extension, file_hash,
                    created_time, modified_time, category_id, matched_rules,
                    extra_metadata, status, task_id, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11, ?12, ?12)
                "#,
                params![
                    submission.file_path.clone(),
                    submission.file_name.clone(),
                    submission.file_size,
                    submission.extension.clone(),
                    submission.file_hash.clone(),
                    submission.created_time.map(|t| t.to_rfc3339()),
                    submission.modified_time.map(|t| t.to_rfc3339()),
                    submission.category_id,
                    submission.matched_rules.as_ref().map(|v| v.to_string()),
                    submission
                        .extra_metadata
                        .as_ref()
                        .and_then(|m| serde_json::to_string(m).ok()),
                    submission.task_id,
                    now.clone(),
                ],
            )
            .await?;
            conn.last_insert_rowid()
        };

        Self::get_by_id(conn, id).await?.ok_or_else(|| {
            crate::error::KfError::Internal(format!("Screening row {id} vanished after upsert"))
        })
    }

    pub async fn upsert_batch(
        conn: &Connection,
        submissions: &[ScreeningSubmission],
    ) -> Result<usize> {
        let tx = conn.transaction().await?;
        let mut count = 0;
        for submission in submissions {
            Self::upsert(&tx, submission).await?;
            count += 1;
        }
        tx.commit().await?;
        Ok(count)
    }

    pub async fn get_by_id(conn: &Connection, id: i64) -> Result<Option<FileScreening>> {
        let mut rows = conn
            .query(
                &format!("SELECT {SCREENING_COLUMNS} FROM t_file_screening WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<FileScreening>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SCREENING_COLUMNS} FROM t_file_screening WHERE id IN ({}) ORDER BY id",
            placeholders(ids.len(), 1)
        );
        let values: Vec<libsql::Value> = ids.iter().map(|id| libsql::Value::from(*id)).collect();

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::from_row(&row)?);
        }
        Ok(results)
    }

    pub async fn get_pending_for_task(
        conn: &Connection,
        task_id: i64,
    ) -> Result<Vec<FileScreening>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SCREENING_COLUMNS} FROM t_file_screening \
                     WHERE status = 'pending' AND task_id = ?1 ORDER BY id"
                ),
                params![task_id],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::from_row(&row)?);
        }
        Ok(results)
    }

    pub async fn update_status(
        conn: &Connection,
        id: i64,
        status: ScreeningStatus,
        error: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE t_file_screening SET status = ?2, error_message = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![
                id,
                status.to_string(),
                error.map(|e| e.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn stamp_tagged_time(
        conn: &Connection,
        id: i64,
        when: DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE t_file_screening SET tagged_time = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, when.to_rfc3339(), Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }

    /// Purge rows under a path prefix together with their FTS mirror rows.
    pub async fn delete_under_prefix(conn: &Connection, prefix: &str) -> Result<u64> {
        let pattern = format!("{prefix}%");
        let tx = conn.transaction().await?;

        tx.execute(
            "DELETE FROM t_files_fts WHERE file_id IN \
             (SELECT id FROM t_file_screening WHERE file_path LIKE ?1)",
            params![pattern.clone()],
        )
        .await?;
        let deleted = tx
            .execute(
                "DELETE FROM t_file_screening WHERE file_path LIKE ?1",
                params![pattern],
            )
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    fn from_row(row: &libsql::Row) -> Result<FileScreening> {
        let status: String = row.get(11)?;
        Ok(FileScreening {
            id: row.get(0)?,
            file_path: row.get(1)?,
            file_name: row.get(2)?,
            file_size: row.get(3)?,
            extension: row.get(4)?,
            file_hash: row.get(5)?,
            created_time: parse_dt_opt(row.get(6)?)?,
            modified_time: parse_dt_opt(row.get(7)?)?,
            category_id: row.get(8)?,
            matched_rules: parse_json_opt(row.get(9)?),
            extra_metadata: parse_json_opt(row.get(10)?)
                .and_then(|v| serde_json::from_value(v).ok()),
            status: status.parse().unwrap_or(ScreeningStatus::Pending),
            error_message: row.get(12)?,
            tagged_time: parse_dt_opt(row.get(13)?)?,
            tags_display_ids: row.get(14)?,
            task_id: row.get(15)?,
            created_at: parse_dt(&row.get::<String>(16)?)?,
            updated_at: parse_dt(&row.get::<String>(17)?)?,
        })
    }
}
