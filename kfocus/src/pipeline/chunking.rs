use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use md5::{Digest, Md5};
use serde_json::json;

use crate::config::Config;
use crate::db::MetaStore;
use crate::error::{KfError, Result};
use crate::events::EventBus;
use crate::gateway::{ChatTurn, ModelGateway};
use crate::models::{
    generate_vector_id, Capability, ChunkType, DocumentStatus, NewChildChunk, NewParentChunk,
    VectorRecord,
};
use crate::vector::VectorStore;

use super::parser::{DocItem, DocItemKind, DocumentParser};
use super::prompts::{
    clean_summary_prefixes, summary_system_prompt, CONTEXT_SUMMARY_PROMPT,
};
use super::splitter::HybridSplitter;

const SUMMARY_FALLBACK_CHARS: usize = 500;
/// Neighbor window for image-context synthesis.
const CONTEXT_NEIGHBORS: usize = 2;

/// A parent chunk before persistence, paired later with its retrieval
/// summary.
#[derive(Debug, Clone)]
struct ChunkDraft {
    chunk_type: ChunkType,
    content: String,
    metadata: Option<serde_json::Value>,
}

/// Document → parents + children + vectors, transactionally visible on
/// success. Parents keep the parser's raw text and are never vectorized;
/// children carry retrieval summaries and join 1:1 to vector records.
pub struct ChunkPipeline {
    store: Arc<dyn MetaStore>,
    vectors: VectorStore,
    gateway: ModelGateway,
    events: EventBus,
    parser: DocumentParser,
    splitter: HybridSplitter,
    summary_min_chars: usize,
}

impl ChunkPipeline {
    pub fn new(
        store: Arc<dyn MetaStore>,
        vectors: VectorStore,
        gateway: ModelGateway,
        events: EventBus,
        config: &Config,
    ) -> Self {
        let parser = DocumentParser::new(gateway.clone(), config.parse_cache_dir());
        Self {
            store,
            vectors,
            gateway,
            events,
            parser,
            splitter: HybridSplitter::new(config.chunking.max_tokens),
            summary_min_chars: config.chunking.summary_min_chars,
        }
    }

    /// Capabilities the pipeline cannot run without. Vision is optional:
    /// the parser degrades captions to alt text.
    pub const REQUIRED_CAPABILITIES: [Capability; 2] = [Capability::Text, Capability::Embedding];

    pub async fn process_document(&self, file_path: &str) -> Result<bool> {
        // Gate before any row exists, so a deferred task leaves no trace.
        self.gateway
            .require_capabilities(&Self::REQUIRED_CAPABILITIES)
            .await?;

        let path = Path::new(file_path);
        if !path.exists() {
            return Err(KfError::NotFound(format!("File not found: {file_path}")));
        }

        match self.run(path, file_path).await {
            Ok(done) => Ok(done),
            Err(error) => {
                if error.is_model_unavailable() {
                    // Deferral, not failure: leave no error state behind.
                    return Err(error);
                }
                if let Ok(Some(document)) = self.store.get_document_by_path(file_path).await {
                    let _ = self
                        .store
                        .set_document_status(document.id, DocumentStatus::Error, None)
                        .await;
                }
                self.events.error_occurred(
                    "chunking_error",
                    &error.to_string(),
                    json!({ "file_path": file_path }),
                );
                Err(error)
            }
        }
    }

    async fn run(&self, path: &Path, file_path: &str) -> Result<bool> {
        self.events.progress("multivector", 0, 100, "hashing file");
        let file_hash = hash_file(path)?;

        if let Some(existing) = self.store.get_document_by_path(file_path).await? {
            if existing.file_hash == file_hash && existing.status == DocumentStatus::Done {
                tracing::info!(file_path, "Document unchanged and indexed, skipping");
                self.events
                    .progress("multivector", 100, 100, "already indexed");
                return Ok(true);
            }
        }

        self.events.progress("multivector", 20, 100, "parsing document");
        let (parsed, cache_path) = self.parser.parse(path).await?;

        self.events.progress("multivector", 40, 100, "chunking");
        let document = self
            .store
            .upsert_document(file_path, &file_hash, cache_path.to_str())
            .await?;

        let drafts = self.build_drafts(&parsed.items);
        if drafts.is_empty() {
            return Err(KfError::Parse(format!(
                "No chunkable content in {file_path}"
            )));
        }

        self.events
            .progress("multivector", 60, 100, "generating retrieval summaries");
        let mut pairs: Vec<(ChunkDraft, String)> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let summary = self.retrieval_summary(&draft.content, draft.chunk_type).await;
            pairs.push((draft, summary));
        }

        self.events
            .progress("multivector", 80, 100, "synthesizing image context");
        let context_pairs = self.image_context_pairs(&pairs).await;
        pairs.extend(context_pairs);

        // Re-index is delete-then-insert on both stores.
        self.store.delete_chunks_by_document(document.id).await?;
        self.vectors.delete_by_document(document.id).await?;

        let parents: Vec<NewParentChunk> = pairs
            .iter()
            .map(|(draft, _)| NewParentChunk {
                document_id: document.id,
                chunk_type: draft.chunk_type,
                content: draft.content.clone(),
                metadata: draft.metadata.clone(),
            })
            .collect();
        let parent_ids = self.store.insert_parent_chunks(&parents).await?;

        let children: Vec<NewChildChunk> = pairs
            .iter()
            .zip(parent_ids.iter())
            .map(|((_, summary), parent_id)| NewChildChunk {
                parent_chunk_id: *parent_id,
                retrieval_content: summary.clone(),
                vector_id: generate_vector_id(),
            })
            .collect();
        self.store.insert_child_chunks(&children).await?;
        self.events.progress("multivector", 85, 100, "chunks persisted");

        self.events.progress("multivector", 90, 100, "vectorizing");
        let records = self.vectorize(document.id, &children, &parent_ids).await?;
        let record_count = records.len();
        self.vectors.add_vectors(&records).await?;

        self.store
            .set_document_status(document.id, DocumentStatus::Done, Some(Utc::now()))
            .await?;
        self.events.progress("multivector", 100, 100, "done");
        self.events.file_processed(
            file_path,
            json!({ "chunks": parent_ids.len(), "vectors": record_count }),
        );

        Ok(true)
    }

    /// Parser items → typed drafts, splitting on the token budget and
    /// unmixing chunks so no stored parent is ever "mixed".
    fn build_drafts(&self, items: &[DocItem]) -> Vec<ChunkDraft> {
        let mut drafts = Vec::new();

        for item in items {
            let base_type = match item.kind {
                DocItemKind::Table => ChunkType::Table,
                DocItemKind::Image => ChunkType::Image,
                DocItemKind::Text => ChunkType::Text,
            };

            let runs: Vec<(ChunkType, String)> =
                if base_type == ChunkType::Text && is_mixed_content(&item.text) {
                    split_mixed_content(&item.text)
                } else {
                    vec![(base_type, item.text.clone())]
                };

            for (chunk_type, text) in runs {
                for piece in self.splitter.split(&text) {
                    drafts.push(ChunkDraft {
                        chunk_type,
                        content: piece,
                        metadata: None,
                    });
                }
            }
        }

        drafts
    }

    /// Retrieval-optimized summary for one chunk body. Short bodies pass
    /// through unchanged; model failures degrade to plain truncation.
    async fn retrieval_summary(&self, content: &str, chunk_type: ChunkType) -> String {
        let trimmed = content.trim();
        if trimmed.chars().count() < self.summary_min_chars {
            return trimmed.to_string();
        }

        let turns = [
            ChatTurn::system(summary_system_prompt(chunk_type)),
            ChatTurn::user(format!("Content to summarize:\n\n{content}")),
        ];

        match self.gateway.chat(&turns).await {
            Ok(summary) if !summary.trim().is_empty() => {
                clean_summary_prefixes(summary.trim())
            }
            Ok(_) | Err(_) => truncate_with_ellipsis(trimmed, SUMMARY_FALLBACK_CHARS),
        }
    }

    /// For each image draft, pair its caption with a summary of the ±2
    /// neighboring text drafts. Cross-modal recall: a text query about the
    /// surrounding topic can surface the image.
    async fn image_context_pairs(
        &self,
        pairs: &[(ChunkDraft, String)],
    ) -> Vec<(ChunkDraft, String)> {
        let mut extra = Vec::new();

        for (index, (draft, _)) in pairs.iter().enumerate() {
            if draft.chunk_type != ChunkType::Image {
                continue;
            }

            let neighbor_text = neighboring_text(pairs, index, CONTEXT_NEIGHBORS);
            if neighbor_text.trim().is_empty() {
                continue;
            }

            let context_summary = self.context_summary(&neighbor_text).await;
            let content = format!("Image: {}\n\nContext: {}", draft.content, context_summary);
            let retrieval = self
                .retrieval_summary(&content, ChunkType::ImageContext)
                .await;

            extra.push((
                ChunkDraft {
                    chunk_type: ChunkType::ImageContext,
                    content,
                    metadata: Some(json!({ "source": "image_context", "image_index": index })),
                },
                retrieval,
            ));
        }

        extra
    }

    async fn context_summary(&self, neighbor_text: &str) -> String {
        if neighbor_text.trim().chars().count() < self.summary_min_chars {
            return neighbor_text.trim().to_string();
        }

        let turns = [
            ChatTurn::system(CONTEXT_SUMMARY_PROMPT),
            ChatTurn::user(neighbor_text.to_string()),
        ];
        match self.gateway.chat(&turns).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) | Err(_) => truncate_with_ellipsis(neighbor_text.trim(), SUMMARY_FALLBACK_CHARS),
        }
    }

    /// Embed children and build vector records. A child whose embedding
    /// fails is skipped; the others proceed.
    async fn vectorize(
        &self,
        document_id: i64,
        children: &[NewChildChunk],
        parent_ids: &[i64],
    ) -> Result<Vec<VectorRecord>> {
        let texts: Vec<String> = children.iter().map(|c| c.retrieval_content.clone()).collect();

        let embeddings = match self.gateway.embed_batch(&texts).await {
            Ok(embeddings) if embeddings.len() == children.len() => {
                embeddings.into_iter().map(Some).collect::<Vec<_>>()
            }
            Ok(_) | Err(_) => {
                // Batch failed; retry per child so one bad summary cannot
                // sink the document.
                let mut singles = Vec::with_capacity(children.len());
                for (child, text) in children.iter().zip(texts.iter()) {
                    match self.gateway.embed(text).await {
                        Ok(vector) => singles.push(Some(vector)),
                        Err(error) => {
                            if error.is_model_unavailable() {
                                return Err(error);
                            }
                            tracing::warn!(
                                vector_id = %child.vector_id,
                                error = %error,
                                "Skipping child chunk after embedding failure"
                            );
                            singles.push(None);
                        }
                    }
                }
                singles
            }
        };

        let records: Vec<VectorRecord> = children
            .iter()
            .zip(parent_ids.iter())
            .zip(embeddings)
            .filter_map(|((child, parent_id), embedding)| {
                embedding.map(|vector| VectorRecord {
                    vector_id: child.vector_id.clone(),
                    vector,
                    parent_chunk_id: *parent_id,
                    document_id,
                    retrieval_content_preview: child
                        .retrieval_content
                        .chars()
                        .take(500)
                        .collect(),
                })
            })
            .collect();

        if records.is_empty() {
            return Err(KfError::Vectorization(
                "Every child chunk failed to embed".into(),
            ));
        }
        Ok(records)
    }
}

/// Streaming md5 in 8 KiB blocks; the dedup key for documents.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{prefix}...")
    }
}

fn is_caption_line(line: &str) -> bool {
    line.trim_start().starts_with("Image:")
}

/// A text block is mixed when it carries an image-caption line alongside
/// ordinary prose. Pure captions and pure prose are not mixed.
fn is_mixed_content(text: &str) -> bool {
    let mut has_caption = false;
    let mut has_prose = false;
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if is_caption_line(paragraph) {
            has_caption = true;
        } else {
            has_prose = true;
        }
    }
    has_caption && has_prose
}

/// Split a mixed block into contiguous same-type paragraph runs. The
/// output never contains a mixed run.
fn split_mixed_content(text: &str) -> Vec<(ChunkType, String)> {
    let mut runs: Vec<(ChunkType, String)> = Vec::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let chunk_type = if is_caption_line(paragraph) {
            ChunkType::Image
        } else {
            ChunkType::Text
        };

        match runs.last_mut() {
            Some((last_type, last_text)) if *last_type == chunk_type => {
                last_text.push_str("\n\n");
                last_text.push_str(paragraph);
            }
            _ => runs.push((chunk_type, paragraph.to_string())),
        }
    }

    runs
}

/// Up to `window` text drafts on each side of `index`, joined in order.
fn neighboring_text(pairs: &[(ChunkDraft, String)], index: usize, window: usize) -> String {
    let mut sections: Vec<&str> = Vec::new();

    let start = index.saturating_sub(window);
    let end = (index + window + 1).min(pairs.len());
    for (i, (draft, _)) in pairs.iter().enumerate().take(end).skip(start) {
        if i != index && draft.chunk_type == ChunkType::Text {
            sections.push(draft.content.as_str());
        }
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_detection_requires_caption_and_prose() {
        assert!(is_mixed_content(
            "Image: a bar chart of revenue\n\nRevenue grew steadily across 2024."
        ));
        assert!(!is_mixed_content("Image: a bar chart of revenue"));
        assert!(!is_mixed_content("Just prose, nothing else."));
    }

    #[test]
    fn mixed_split_produces_typed_runs() {
        let runs = split_mixed_content(
            "Intro text.\n\nImage: chart one\n\nImage: chart two\n\nClosing text.",
        );
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].0, ChunkType::Text);
        assert_eq!(runs[1].0, ChunkType::Image);
        assert!(runs[1].1.contains("chart one"));
        assert!(runs[1].1.contains("chart two"));
        assert_eq!(runs[2].0, ChunkType::Text);
    }

    #[test]
    fn mixed_split_never_emits_mixed() {
        let runs = split_mixed_content("Image: x\n\nprose\n\nImage: y");
        for (chunk_type, text) in runs {
            match chunk_type {
                ChunkType::Image => assert!(is_caption_line(&text)),
                ChunkType::Text => assert!(!is_caption_line(&text)),
                other => panic!("unexpected run type {other}"),
            }
        }
    }

    #[test]
    fn neighboring_text_skips_non_text_and_self() {
        let draft = |t: ChunkType, s: &str| {
            (
                ChunkDraft {
                    chunk_type: t,
                    content: s.to_string(),
                    metadata: None,
                },
                String::new(),
            )
        };
        let pairs = vec![
            draft(ChunkType::Text, "before"),
            draft(ChunkType::Table, "| t |"),
            draft(ChunkType::Image, "a chart"),
            draft(ChunkType::Text, "after"),
        ];
        let text = neighboring_text(&pairs, 2, 2);
        assert_eq!(text, "before\n\nafter");
    }

    #[test]
    fn hash_file_is_stable_md5() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        file.write_all(b"hello world").unwrap();
        let digest = hash_file(file.path()).unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_needed() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghij", 4), "abcd...");
    }
}
