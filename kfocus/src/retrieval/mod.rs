use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::db::MetaStore;
use crate::error::Result;
use crate::events::EventBus;
use crate::gateway::ModelGateway;
use crate::vector::VectorStore;

/// Upper bound of the cosine distance returned by the vector store
/// (`vector_distance_cos` on normalized embeddings ranges over [0, 2]).
/// Keeps `similarity = 1 - distance/2` monotone and inside [0, 1].
const DISTANCE_UPPER_BOUND: f32 = 2.0;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub parent_chunk_id: i64,
    pub document_id: i64,
    pub file_path: String,
    /// Retrieval summary preview stored beside the vector.
    pub retrieval_content_preview: String,
    /// Raw parent content, the answer-synthesis payload.
    pub content: String,
    pub distance: f32,
    pub similarity: f32,
}

/// Query → embedding → filtered ANN search → parent hydration. The
/// document filter narrows candidates before top-k; an empty query or an
/// explicitly empty scope short-circuits to no rows.
pub struct Retriever {
    store: Arc<dyn MetaStore>,
    vectors: VectorStore,
    gateway: ModelGateway,
    events: EventBus,
    top_k: usize,
    source_preview_chars: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn MetaStore>,
        vectors: VectorStore,
        gateway: ModelGateway,
        events: EventBus,
        config: &Config,
    ) -> Self {
        Self {
            store,
            vectors,
            gateway,
            events,
            top_k: config.retrieval.top_k,
            source_preview_chars: config.retrieval.source_preview_chars,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.top_k
    }

    pub fn similarity_from_distance(distance: f32) -> f32 {
        (1.0 - distance / DISTANCE_UPPER_BOUND).clamp(0.0, 1.0)
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[i64]>,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if matches!(document_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let query_vector = self.gateway.embed(query).await?;
        let hits = self.vectors.search(&query_vector, top_k, document_ids).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let parent_ids: Vec<i64> = hits.iter().map(|h| h.parent_chunk_id).collect();
        let parents = self.store.get_parent_chunks_by_ids(&parent_ids).await?;
        let parents_by_id: HashMap<i64, _> =
            parents.into_iter().map(|p| (p.id, p)).collect();

        let mut file_paths: HashMap<i64, String> = HashMap::new();
        for hit in &hits {
            if let std::collections::hash_map::Entry::Vacant(entry) =
                file_paths.entry(hit.document_id)
            {
                if let Some(document) = self.store.get_document(hit.document_id).await? {
                    entry.insert(document.file_path);
                }
            }
        }

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(parent) = parents_by_id.get(&hit.parent_chunk_id) else {
                tracing::warn!(
                    parent_chunk_id = hit.parent_chunk_id,
                    "Vector hit without parent chunk, skipping"
                );
                continue;
            };
            results.push(SearchHit {
                parent_chunk_id: hit.parent_chunk_id,
                document_id: hit.document_id,
                file_path: file_paths
                    .get(&hit.document_id)
                    .cloned()
                    .unwrap_or_default(),
                retrieval_content_preview: hit.retrieval_content_preview,
                content: parent.content.clone(),
                distance: hit.distance,
                similarity: Self::similarity_from_distance(hit.distance),
            });
        }

        Ok(results)
    }

    /// Document ids of a session's pinned files; pins whose documents were
    /// never indexed contribute nothing.
    pub async fn pinned_document_ids(&self, session_id: i64) -> Result<Vec<i64>> {
        let pins = self.store.get_pinned_files(session_id).await?;
        if pins.is_empty() {
            return Ok(Vec::new());
        }
        let paths: Vec<String> = pins.into_iter().map(|p| p.file_path).collect();
        let documents = self.store.get_documents_by_paths(&paths).await?;
        Ok(documents.into_iter().map(|d| d.id).collect())
    }

    /// Assemble the RAG context block for a chat turn, scoped to the
    /// session's pinned documents. `None` when there are no pinned
    /// documents or no hits — the chat prompt then goes out unaugmented.
    pub async fn rag_context(
        &self,
        session_id: i64,
        query: &str,
    ) -> Result<Option<(String, Vec<SearchHit>)>> {
        let document_ids = self.pinned_document_ids(session_id).await?;
        if document_ids.is_empty() {
            tracing::debug!(session_id, "No pinned documents, skipping RAG");
            return Ok(None);
        }

        let hits = self
            .search(query, self.top_k, Some(&document_ids))
            .await?;
        if hits.is_empty() {
            return Ok(None);
        }

        let mut sections = Vec::with_capacity(hits.len());
        for hit in &hits {
            let preview: String = hit
                .retrieval_content_preview
                .chars()
                .take(self.source_preview_chars)
                .collect();
            sections.push(format!("**Source**: {}\n{}", hit.file_path, preview));
        }
        let block = format!("## Related knowledge\n{}", sections.join("\n\n"));

        self.events.rag_retrieval_result(
            query,
            json!(hits
                .iter()
                .map(|hit| json!({
                    "file_path": hit.file_path,
                    "similarity_score": (hit.similarity * 1000.0).round() / 1000.0,
                    "content_preview": hit.retrieval_content_preview.chars().take(300).collect::<String>(),
                    "parent_chunk_id": hit.parent_chunk_id,
                }))
                .collect::<Vec<_>>()),
        );

        Ok(Some((block, hits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_monotone_and_bounded() {
        let distances = [0.0f32, 0.2, 0.5, 1.0, 1.5, 2.0, 3.0];
        let mut last = f32::INFINITY;
        for distance in distances {
            let similarity = Retriever::similarity_from_distance(distance);
            assert!((0.0..=1.0).contains(&similarity), "out of range: {similarity}");
            assert!(similarity <= last, "not monotone at distance {distance}");
            last = similarity;
        }
        assert_eq!(Retriever::similarity_from_distance(0.0), 1.0);
        assert_eq!(Retriever::similarity_from_distance(2.0), 0.0);
        assert_eq!(Retriever::similarity_from_distance(3.0), 0.0);
    }
}
