use chrono::Utc;
use libsql::{params, Connection};

use crate::error::{KfError, Result};
use crate::models::{
    ChatMessage, ChatSession, MessageRole, Metadata, PinnedFile, SaveMessageRequest, SessionStats,
};

use super::{parse_dt, parse_json_opt};

const SESSION_COLUMNS: &str = "id, name, created_at, updated_at, metadata, is_active";
const MESSAGE_COLUMNS: &str =
    "id, session_id, message_id, role, content, parts, metadata, sources, created_at";
const PIN_COLUMNS: &str = "id, session_id, file_path, file_name, pinned_at, metadata";

fn metadata_to_text(metadata: &Option<Metadata>) -> Option<String> {
    metadata
        .as_ref()
        .and_then(|m| serde_json::to_string(m).ok())
}

fn metadata_from_text(text: Option<String>) -> Option<Metadata> {
    parse_json_opt(text).and_then(|v| serde_json::from_value(v).ok())
}

pub struct SessionRepository;

impl SessionRepository {
    pub async fn create(
        conn: &Connection,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<ChatSession> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO t_chat_sessions (name, created_at, updated_at, metadata, is_active) \
             VALUES (?1, ?2, ?2, ?3, 1)",
            params![name.to_string(), now, metadata_to_text(&metadata)],
        )
        .await?;

        let id = conn.last_insert_rowid();
        Self::get(conn, id)
            .await?
            .ok_or_else(|| KfError::Internal(format!("Session {id} vanished after insert")))
    }

    pub async fn get(conn: &Connection, id: i64) -> Result<Option<ChatSession>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM t_chat_sessions WHERE id = ?1 AND is_active = 1"
                ),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::session_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(conn: &Connection) -> Result<Vec<ChatSession>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM t_chat_sessions WHERE is_active = 1 \
                     ORDER BY updated_at DESC"
                ),
                (),
            )
            .await?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(Self::session_from_row(&row)?);
        }
        Ok(sessions)
    }

    pub async fn update(
        conn: &Connection,
        id: i64,
        name: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<ChatSession> {
        let existing = Self::get(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Session {id} not found")))?;

        let new_name = name.map(|n| n.to_string()).unwrap_or(existing.name);
        let new_metadata = match metadata {
            Some(m) => Some(m),
            None => existing.metadata,
        };

        conn.execute(
            "UPDATE t_chat_sessions SET name = ?2, metadata = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                new_name,
                metadata_to_text(&new_metadata),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Self::get(conn, id)
            .await?
            .ok_or_else(|| KfError::NotFound(format!("Session {id} not found")))
    }

    pub async fn soft_delete(conn: &Connection, id: i64) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE t_chat_sessions SET is_active = 0, updated_at = ?2 \
                 WHERE id = ?1 AND is_active = 1",
                params![id, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn save_message(
        conn: &Connection,
        session_id: i64,
        message: &SaveMessageRequest,
    ) -> Result<ChatMessage> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO t_chat_messages (
                session_id, message_id, role, content, parts, metadata, sources, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                session_id,
                message.message_id.clone(),
                message.role.to_string(),
                message.content.clone(),
                message.parts.as_ref().map(|v| v.to_string()),
                metadata_to_text(&message.metadata),
                message.sources.as_ref().map(|v| v.to_string()),
                now.clone(),
            ],
        )
        .await?;

        // Message activity bumps the session's updated_at.
        conn.execute(
            "UPDATE t_chat_sessions SET updated_at = ?2 WHERE id = ?1",
            params![session_id, now],
        )
        .await?;

        let id = conn.last_insert_rowid();
        let mut rows = conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM t_chat_messages WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Self::message_from_row(&row),
            None => Err(KfError::Internal(format!(
                "Message {id} vanished after insert"
            ))),
        }
    }

    pub async fn get_messages(
        conn: &Connection,
        session_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM t_chat_messages WHERE session_id = ?1 \
                     ORDER BY id ASC LIMIT ?2 OFFSET ?3"
                ),
                params![session_id, limit, offset],
            )
            .await?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            messages.push(Self::message_from_row(&row)?);
        }
        Ok(messages)
    }

    /// Re-pinning refreshes `pinned_at` (the 24 h chain window keys on it).
    pub async fn pin_file(
        conn: &Connection,
        session_id: i64,
        file_path: &str,
        file_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<PinnedFile> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO t_pinned_files (session_id, file_path, file_name, pinned_at, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id, file_path) DO UPDATE SET
                pinned_at = excluded.pinned_at,
                metadata = excluded.metadata
            "#,
            params![
                session_id,
                file_path.to_string(),
                file_name.to_string(),
                now,
                metadata_to_text(&metadata),
            ],
        )
        .await?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PIN_COLUMNS} FROM t_pinned_files \
                     WHERE session_id = ?1 AND file_path = ?2"
                ),
                params![session_id, file_path.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Self::pin_from_row(&row),
            None => Err(KfError::Internal("Pinned file vanished after upsert".into())),
        }
    }

    pub async fn unpin_file(conn: &Connection, session_id: i64, file_path: &str) -> Result<bool> {
        let deleted = conn
            .execute(
                "DELETE FROM t_pinned_files WHERE session_id = ?1 AND file_path = ?2",
                params![session_id, file_path.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    pub async fn get_pinned(conn: &Connection, session_id: i64) -> Result<Vec<PinnedFile>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PIN_COLUMNS} FROM t_pinned_files WHERE session_id = ?1 \
                     ORDER BY pinned_at DESC"
                ),
                params![session_id],
            )
            .await?;
        let mut pins = Vec::new();
        while let Some(row) = rows.next().await? {
            pins.push(Self::pin_from_row(&row)?);
        }
        Ok(pins)
    }

    pub async fn latest_pin_for_path(
        conn: &Connection,
        file_path: &str,
    ) -> Result<Option<PinnedFile>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PIN_COLUMNS} FROM t_pinned_files WHERE file_path = ?1 \
                     ORDER BY pinned_at DESC LIMIT 1"
                ),
                params![file_path.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::pin_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn stats(conn: &Connection, session_id: i64) -> Result<SessionStats> {
        let mut rows = conn
            .query(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM t_chat_messages WHERE session_id = ?1),
                    (SELECT COUNT(*) FROM t_pinned_files WHERE session_id = ?1),
                    (SELECT MAX(created_at) FROM t_chat_messages WHERE session_id = ?1)
                "#,
                params![session_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(SessionStats {
                session_id,
                message_count: row.get::<i64>(0)? as u64,
                pinned_file_count: row.get::<i64>(1)? as u64,
                last_activity: super::parse_dt_opt(row.get(2)?)?,
            }),
            None => Ok(SessionStats {
                session_id,
                message_count: 0,
                pinned_file_count: 0,
                last_activity: None,
            }),
        }
    }

    fn session_from_row(row: &libsql::Row) -> Result<ChatSession> {
        Ok(ChatSession {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: parse_dt(&row.get::<String>(2)?)?,
            updated_at: parse_dt(&row.get::<String>(3)?)?,
            metadata: metadata_from_text(row.get(4)?),
            is_active: row.get::<i64>(5)? != 0,
        })
    }

    fn message_from_row(row: &libsql::Row) -> Result<ChatMessage> {
        let role: String = row.get(3)?;
        Ok(ChatMessage {
            id: row.get(0)?,
            session_id: row.get(1)?,
            message_id: row.get(2)?,
            role: role.parse().unwrap_or(MessageRole::User),
            content: row.get(4)?,
            parts: parse_json_opt(row.get(5)?),
            metadata: metadata_from_text(row.get(6)?),
            sources: parse_json_opt(row.get(7)?),
            created_at: parse_dt(&row.get::<String>(8)?)?,
        })
    }

    fn pin_from_row(row: &libsql::Row) -> Result<PinnedFile> {
        Ok(PinnedFile {
            id: row.get(0)?,
            session_id: row.get(1)?,
            file_path: row.get(2)?,
            file_name: row.get(3)?,
            pinned_at: parse_dt(&row.get::<String>(4)?)?,
            metadata: metadata_from_text(row.get(5)?),
        })
    }
}
