use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{
    ChildChunk, ChunkType, Document, DocumentStatus, NewChildChunk, NewParentChunk, ParentChunk,
};

use super::{parse_dt, parse_dt_opt, parse_json_opt, placeholders};

const DOCUMENT_COLUMNS: &str =
    "id, file_path, file_hash, docling_json_path, status, processed_at, created_at, updated_at";

pub struct DocumentRepository;

impl DocumentRepository {
    pub async fn get(conn: &Connection, id: i64) -> Result<Option<Document>> {
        let mut rows = conn
            .query(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM t_documents WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_path(conn: &Connection, file_path: &str) -> Result<Option<Document>> {
        let mut rows = conn
            .query(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM t_documents WHERE file_path = ?1"),
                params![file_path.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_paths(conn: &Connection, file_paths: &[String]) -> Result<Vec<Document>> {
        if file_paths.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM t_documents WHERE file_path IN ({}) ORDER BY id",
            placeholders(file_paths.len(), 1)
        );
        let values: Vec<libsql::Value> = file_paths
            .iter()
            .map(|p| libsql::Value::from(p.clone()))
            .collect();

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::from_row(&row)?);
        }
        Ok(documents)
    }

    /// A document exists iff the file was submitted to the chunking
    /// pipeline at least once; resubmission refreshes hash + cache pointer
    /// and restarts at `processing`.
    pub async fn upsert(
        conn: &Connection,
        file_path: &str,
        file_hash: &str,
        docling_json_path: Option<&str>,
    ) -> Result<Document> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO t_documents (file_path, file_hash, docling_json_path, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, 'processing', ?4, ?4)
            ON CONFLICT(file_path) DO UPDATE SET
                file_hash = excluded.file_hash,
                docling_json_path = COALESCE(excluded.docling_json_path, docling_json_path),
                status = 'processing',
                processed_at = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                file_path.to_string(),
                file_hash.to_string(),
                docling_json_path.map(|p| p.to_string()),
                now,
            ],
        )
        .await?;

        Self::get_by_path(conn, file_path).await?.ok_or_else(|| {
            crate::error::KfError::Internal(format!("Document for {file_path} vanished"))
        })
    }

    pub async fn set_status(
        conn: &Connection,
        id: i64,
        status: DocumentStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE t_documents SET status = ?2, processed_at = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                status.to_string(),
                processed_at.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn insert_parents(
        conn: &Connection,
        chunks: &[NewParentChunk],
    ) -> Result<Vec<i64>> {
        let tx = conn.transaction().await?;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            tx.execute(
                "INSERT INTO t_parent_chunks (document_id, chunk_type, content, metadata) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    chunk.document_id,
                    chunk.chunk_type.to_string(),
                    chunk.content.clone(),
                    chunk.metadata.as_ref().map(|m| m.to_string()),
                ],
            )
            .await?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit().await?;
        Ok(ids)
    }

    pub async fn insert_children(
        conn: &Connection,
        chunks: &[NewChildChunk],
    ) -> Result<Vec<i64>> {
        let tx = conn.transaction().await?;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            tx.execute(
                "INSERT INTO t_child_chunks (parent_chunk_id, retrieval_content, vector_id) \
                 VALUES (?1, ?2, ?3)",
                params![
                    chunk.parent_chunk_id,
                    chunk.retrieval_content.clone(),
                    chunk.vector_id.clone(),
                ],
            )
            .await?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit().await?;
        Ok(ids)
    }

    pub async fn get_parents_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<ParentChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, document_id, chunk_type, content, metadata FROM t_parent_chunks \
             WHERE id IN ({})",
            placeholders(ids.len(), 1)
        );
        let values: Vec<libsql::Value> = ids.iter().map(|id| libsql::Value::from(*id)).collect();

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            let chunk_type: String = row.get(2)?;
            chunks.push(ParentChunk {
                id: row.get(0)?,
                document_id: row.get(1)?,
                chunk_type: chunk_type.parse().unwrap_or(ChunkType::Text),
                content: row.get(3)?,
                metadata: parse_json_opt(row.get(4)?),
            });
        }
        Ok(chunks)
    }

    pub async fn get_children_by_document(
        conn: &Connection,
        document_id: i64,
    ) -> Result<Vec<ChildChunk>> {
        let mut rows = conn
            .query(
                r#"
                SELECT c.id, c.parent_chunk_id, c.retrieval_content, c.vector_id
                FROM t_child_chunks c
                JOIN t_parent_chunks p ON c.parent_chunk_id = p.id
                WHERE p.document_id = ?1
                ORDER BY c.id
                "#,
                params![document_id],
            )
            .await?;

        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(ChildChunk {
                id: row.get(0)?,
                parent_chunk_id: row.get(1)?,
                retrieval_content: row.get(2)?,
                vector_id: row.get(3)?,
            });
        }
        Ok(chunks)
    }

    /// Children first, then parents (FK order); one transaction.
    pub async fn delete_chunks_by_document(conn: &Connection, document_id: i64) -> Result<()> {
        let tx = conn.transaction().await?;
        tx.execute(
            "DELETE FROM t_child_chunks WHERE parent_chunk_id IN \
             (SELECT id FROM t_parent_chunks WHERE document_id = ?1)",
            params![document_id],
        )
        .await?;
        tx.execute(
            "DELETE FROM t_parent_chunks WHERE document_id = ?1",
            params![document_id],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(conn: &Connection, id: i64) -> Result<bool> {
        Self::delete_chunks_by_document(conn, id).await?;
        let deleted = conn
            .execute("DELETE FROM t_documents WHERE id = ?1", params![id])
            .await?;
        Ok(deleted > 0)
    }

    pub async fn get_under_prefix(conn: &Connection, prefix: &str) -> Result<Vec<Document>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM t_documents WHERE file_path LIKE ?1 ORDER BY id"
                ),
                params![format!("{prefix}%")],
            )
            .await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::from_row(&row)?);
        }
        Ok(documents)
    }

    fn from_row(row: &libsql::Row) -> Result<Document> {
        let status: String = row.get(4)?;
        Ok(Document {
            id: row.get(0)?,
            file_path: row.get(1)?,
            file_hash: row.get(2)?,
            docling_json_path: row.get(3)?,
            status: status.parse().unwrap_or(DocumentStatus::Processing),
            processed_at: parse_dt_opt(row.get(5)?)?,
            created_at: parse_dt(&row.get::<String>(6)?)?,
            updated_at: parse_dt(&row.get::<String>(7)?)?,
        })
    }
}
