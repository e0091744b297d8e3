use std::path::Path;
use std::sync::Arc;

use libsql::{params, Builder, Connection};

use crate::error::{KfError, Result};
use crate::models::{VectorHit, VectorRecord};

use crate::db::repository::placeholders;

const PREVIEW_CHARS: usize = 500;

/// Append-only vector table in its own database file. Records are keyed by
/// `vector_id` and never updated in place: an edit is delete-by-document
/// followed by re-insert. The distance metric is libsql's
/// `vector_distance_cos`, cosine distance in `[0, 2]` (0 = identical).
pub struct VectorStore {
    db: Arc<libsql::Database>,
    dimensions: usize,
}

impl VectorStore {
    pub async fn open(path: &Path, dimensions: usize) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let store = Self {
            db: Arc::new(db),
            dimensions,
        };
        store.configure().await?;
        store.ensure_table().await?;
        Ok(store)
    }

    pub async fn open_in_memory(dimensions: usize) -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let store = Self {
            db: Arc::new(db),
            dimensions,
        };
        store.ensure_table().await?;
        Ok(store)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    async fn configure(&self) -> Result<()> {
        let conn = self.connect()?;
        for pragma in ["PRAGMA journal_mode = WAL", "PRAGMA synchronous = NORMAL"] {
            if let Err(error) = conn.execute_batch(pragma).await {
                tracing::warn!(pragma, error = %error, "Failed to apply vector store pragma");
            }
        }
        Ok(())
    }

    /// Create the table for this dimension, or refuse to open a table built
    /// for another one — mixed dimensions must never coexist.
    async fn ensure_table(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vector_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .await?;

        let mut rows = conn
            .query(
                "SELECT value FROM vector_meta WHERE key = 'dimensions'",
                (),
            )
            .await?;
        if let Some(row) = rows.next().await? {
            let stored: String = row.get(0)?;
            let stored: usize = stored
                .parse()
                .map_err(|_| KfError::Internal(format!("Corrupt vector_meta dimensions: {stored}")))?;
            if stored != self.dimensions {
                return Err(KfError::Vectorization(format!(
                    "Vector table was built for dimension {stored}, process is configured for {}",
                    self.dimensions
                )));
            }
            return Ok(());
        }

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS vector_records (
                vector_id TEXT PRIMARY KEY,
                embedding F32_BLOB({dims}),
                parent_chunk_id INTEGER NOT NULL,
                document_id INTEGER NOT NULL,
                retrieval_content TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_vector_records_document ON vector_records(document_id);
            "#,
            dims = self.dimensions
        ))
        .await?;
        conn.execute(
            "INSERT INTO vector_meta (key, value) VALUES ('dimensions', ?1)",
            params![self.dimensions.to_string()],
        )
        .await?;

        Ok(())
    }

    /// Insert a batch in one transaction. Rejects records of the wrong
    /// dimension before touching the table.
    pub async fn add_vectors(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        for record in records {
            if record.vector.len() != self.dimensions {
                return Err(KfError::Vectorization(format!(
                    "Vector {} has dimension {}, table requires {}",
                    record.vector_id,
                    record.vector.len(),
                    self.dimensions
                )));
            }
        }

        let conn = self.connect()?;
        let tx = conn.transaction().await?;
        for record in records {
            let embedding_json = serde_json::to_string(&record.vector)?;
            let preview: String = record
                .retrieval_content_preview
                .chars()
                .take(PREVIEW_CHARS)
                .collect();
            tx.execute(
                "INSERT INTO vector_records \
                 (vector_id, embedding, parent_chunk_id, document_id, retrieval_content) \
                 VALUES (?1, vector32(?2), ?3, ?4, ?5)",
                params![
                    record.vector_id.clone(),
                    embedding_json,
                    record.parent_chunk_id,
                    record.document_id,
                    preview,
                ],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Nearest neighbors by ascending cosine distance. The document filter
    /// is part of the WHERE clause, so it narrows the candidate set before
    /// top-k, not after.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        document_ids: Option<&[i64]>,
    ) -> Result<Vec<VectorHit>> {
        if query.len() != self.dimensions {
            return Err(KfError::Vectorization(format!(
                "Query vector has dimension {}, table requires {}",
                query.len(),
                self.dimensions
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        // An explicitly empty scope matches nothing.
        if matches!(document_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let embedding_json = serde_json::to_string(query)?;

        let (sql, values) = match document_ids {
            Some(ids) => {
                let sql = format!(
                    r#"
                    SELECT vector_id, parent_chunk_id, document_id, retrieval_content,
                           vector_distance_cos(embedding, vector32(?1)) AS distance
                    FROM vector_records
                    WHERE document_id IN ({})
                    ORDER BY distance ASC
                    LIMIT ?2
                    "#,
                    placeholders(ids.len(), 3)
                );
                let mut values = vec![
                    libsql::Value::from(embedding_json),
                    libsql::Value::from(top_k as i64),
                ];
                values.extend(ids.iter().map(|id| libsql::Value::from(*id)));
                (sql, values)
            }
            None => (
                r#"
                SELECT vector_id, parent_chunk_id, document_id, retrieval_content,
                       vector_distance_cos(embedding, vector32(?1)) AS distance
                FROM vector_records
                ORDER BY distance ASC
                LIMIT ?2
                "#
                .to_string(),
                vec![
                    libsql::Value::from(embedding_json),
                    libsql::Value::from(top_k as i64),
                ],
            ),
        };

        let conn = self.connect()?;
        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().await? {
            hits.push(VectorHit {
                vector_id: row.get(0)?,
                parent_chunk_id: row.get(1)?,
                document_id: row.get(2)?,
                retrieval_content_preview: row.get(3)?,
                distance: row.get::<f64>(4)? as f32,
            });
        }
        Ok(hits)
    }

    pub async fn delete_by_document(&self, document_id: i64) -> Result<u64> {
        let conn = self.connect()?;
        let deleted = conn
            .execute(
                "DELETE FROM vector_records WHERE document_id = ?1",
                params![document_id],
            )
            .await?;
        Ok(deleted)
    }
}

impl Clone for VectorStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            dimensions: self.dimensions,
        }
    }
}
