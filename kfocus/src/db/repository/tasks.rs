use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{Task, TaskKind, TaskPriority, TaskResult, TaskStatus};

use super::{parse_dt, parse_dt_opt, parse_json_opt};

const TASK_COLUMNS: &str = "id, task_name, task_type, priority, status, result, extra_data, \
     target_file_path, created_at, updated_at, start_time, error_message";

pub struct TaskRepository;

impl TaskRepository {
    pub async fn add(
        conn: &Connection,
        name: &str,
        kind: TaskKind,
        priority: TaskPriority,
        extra_data: Option<serde_json::Value>,
        target_file_path: Option<&str>,
    ) -> Result<Task> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO t_tasks (
                task_name, task_type, priority, status, extra_data,
                target_file_path, created_at, updated_at
            ) VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5, ?6, ?6)
            "#,
            params![
                name.to_string(),
                kind.to_string(),
                priority.to_string(),
                extra_data.as_ref().map(|v| v.to_string()),
                target_file_path.map(|p| p.to_string()),
                now,
            ],
        )
        .await?;

        let id = conn.last_insert_rowid();
        Self::get(conn, id).await?.ok_or_else(|| {
            crate::error::KfError::Internal(format!("Task {id} vanished after insert"))
        })
    }

    pub async fn get(conn: &Connection, id: i64) -> Result<Option<Task>> {
        let mut rows = conn
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM t_tasks WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Atomic claim: a single UPDATE with a nested ordered SELECT, so two
    /// workers can never move the same task to RUNNING. FIFO within a
    /// priority band comes from the `created_at, id` tiebreak.
    pub async fn claim_next(conn: &Connection, high_only: bool) -> Result<Option<Task>> {
        let priority_filter = if high_only {
            "AND priority = 'HIGH'"
        } else {
            ""
        };

        let sql = format!(
            r#"
            UPDATE t_tasks SET
                status = 'RUNNING',
                start_time = ?1,
                updated_at = ?1
            WHERE id = (
                SELECT id FROM t_tasks
                WHERE status = 'PENDING' {priority_filter}
                ORDER BY
                    CASE priority WHEN 'HIGH' THEN 1 WHEN 'MEDIUM' THEN 2 ELSE 3 END,
                    created_at ASC,
                    id ASC
                LIMIT 1
            )
            RETURNING {TASK_COLUMNS}
            "#
        );

        let mut rows = conn
            .query(&sql, params![Utc::now().to_rfc3339()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn finish(
        conn: &Connection,
        id: i64,
        status: TaskStatus,
        result: Option<TaskResult>,
        message: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE t_tasks SET status = ?2, result = ?3, error_message = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![
                id,
                status.to_string(),
                result.map(|r| r.to_string()),
                message.map(|m| m.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Revert tasks a dead process left RUNNING. Run once at startup,
    /// before any worker begins claiming.
    pub async fn sweep_stale_running(conn: &Connection) -> Result<u64> {
        let swept = conn
            .execute(
                "UPDATE t_tasks SET status = 'PENDING', start_time = NULL, updated_at = ?1 \
                 WHERE status = 'RUNNING'",
                params![Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(swept)
    }

    /// Dedup guard: is there already an open task of this kind for the path?
    pub async fn has_open_for_path(
        conn: &Connection,
        kind: TaskKind,
        file_path: &str,
    ) -> Result<bool> {
        let mut rows = conn
            .query(
                r#"
                SELECT COUNT(*) FROM t_tasks
                WHERE task_type = ?1
                  AND status IN ('PENDING', 'RUNNING')
                  AND (target_file_path = ?2
                       OR json_extract(extra_data, '$.file_path') = ?2)
                "#,
                params![kind.to_string(), file_path.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? > 0),
            None => Ok(false),
        }
    }

    fn from_row(row: &libsql::Row) -> Result<Task> {
        let task_type: String = row.get(2)?;
        let priority: String = row.get(3)?;
        let status: String = row.get(4)?;
        let result: Option<String> = row.get(5)?;

        Ok(Task {
            id: row.get(0)?,
            task_name: row.get(1)?,
            task_type: task_type
                .parse()
                .map_err(crate::error::KfError::Internal)?,
            priority: priority.parse().unwrap_or(TaskPriority::Medium),
            status: status.parse().unwrap_or(TaskStatus::Pending),
            result: result.and_then(|r| r.parse().ok()),
            extra_data: parse_json_opt(row.get(6)?),
            target_file_path: row.get(7)?,
            created_at: parse_dt(&row.get::<String>(8)?)?,
            updated_at: parse_dt(&row.get::<String>(9)?)?,
            start_time: parse_dt_opt(row.get(10)?)?,
            error_message: row.get(11)?,
        })
    }
}
