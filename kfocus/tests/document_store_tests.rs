mod common;

use kfocus::models::{
    generate_vector_id, ChunkType, DocumentStatus, NewChildChunk, NewParentChunk,
};

#[tokio::test]
async fn document_upsert_restarts_processing_on_new_hash() {
    let store = common::memory_store().await;

    let first = store
        .upsert_document("/docs/a.pdf", "hash-v1", Some("/cache/a.json"))
        .await
        .unwrap();
    assert_eq!(first.status, DocumentStatus::Processing);

    store
        .set_document_status(first.id, DocumentStatus::Done, Some(chrono::Utc::now()))
        .await
        .unwrap();

    let second = store
        .upsert_document("/docs/a.pdf", "hash-v2", None)
        .await
        .unwrap();
    assert_eq!(second.id, first.id, "one document per path");
    assert_eq!(second.file_hash, "hash-v2");
    assert_eq!(second.status, DocumentStatus::Processing);
    assert!(second.processed_at.is_none());
    // The cache pointer survives a hashes-only refresh.
    assert_eq!(second.docling_json_path.as_deref(), Some("/cache/a.json"));
}

#[tokio::test]
async fn parents_then_children_insert_in_order() {
    let store = common::memory_store().await;
    let document = store
        .upsert_document("/docs/b.md", "hash", None)
        .await
        .unwrap();

    let parent_ids = store
        .insert_parent_chunks(&[
            NewParentChunk {
                document_id: document.id,
                chunk_type: ChunkType::Text,
                content: "Intro paragraph.".into(),
                metadata: None,
            },
            NewParentChunk {
                document_id: document.id,
                chunk_type: ChunkType::Table,
                content: "| a | b |".into(),
                metadata: Some(serde_json::json!({ "rows": 1 })),
            },
        ])
        .await
        .unwrap();
    assert_eq!(parent_ids.len(), 2);
    assert!(parent_ids[0] < parent_ids[1]);

    let children: Vec<NewChildChunk> = parent_ids
        .iter()
        .map(|parent_id| NewChildChunk {
            parent_chunk_id: *parent_id,
            retrieval_content: "summary".into(),
            vector_id: generate_vector_id(),
        })
        .collect();
    store.insert_child_chunks(&children).await.unwrap();

    let stored_children = store
        .get_child_chunks_by_document(document.id)
        .await
        .unwrap();
    assert_eq!(stored_children.len(), 2);

    // Every child joins back to a stored parent and keeps its vector id.
    let parents = store.get_parent_chunks_by_ids(&parent_ids).await.unwrap();
    assert_eq!(parents.len(), 2);
    for child in &stored_children {
        assert!(parent_ids.contains(&child.parent_chunk_id));
        assert_eq!(child.vector_id.len(), 16);
    }
}

#[tokio::test]
async fn duplicate_vector_ids_are_rejected() {
    let store = common::memory_store().await;
    let document = store
        .upsert_document("/docs/c.md", "hash", None)
        .await
        .unwrap();
    let parent_ids = store
        .insert_parent_chunks(&[NewParentChunk {
            document_id: document.id,
            chunk_type: ChunkType::Text,
            content: "text".into(),
            metadata: None,
        }])
        .await
        .unwrap();

    let vector_id = generate_vector_id();
    let child = |vid: &str| NewChildChunk {
        parent_chunk_id: parent_ids[0],
        retrieval_content: "summary".into(),
        vector_id: vid.to_string(),
    };

    store.insert_child_chunks(&[child(&vector_id)]).await.unwrap();
    assert!(store
        .insert_child_chunks(&[child(&vector_id)])
        .await
        .is_err());
}

#[tokio::test]
async fn chunk_deletion_clears_both_grains() {
    let store = common::memory_store().await;
    let document = store
        .upsert_document("/docs/d.md", "hash", None)
        .await
        .unwrap();

    let parent_ids = store
        .insert_parent_chunks(&[NewParentChunk {
            document_id: document.id,
            chunk_type: ChunkType::ImageContext,
            content: "Image: chart\n\nContext: sales".into(),
            metadata: None,
        }])
        .await
        .unwrap();
    store
        .insert_child_chunks(&[NewChildChunk {
            parent_chunk_id: parent_ids[0],
            retrieval_content: "chart with sales context".into(),
            vector_id: generate_vector_id(),
        }])
        .await
        .unwrap();

    store.delete_chunks_by_document(document.id).await.unwrap();
    assert!(store
        .get_child_chunks_by_document(document.id)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .get_parent_chunks_by_ids(&parent_ids)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn documents_under_prefix_and_path_lookup() {
    let store = common::memory_store().await;

    store
        .upsert_document("/vault/x.md", "h1", None)
        .await
        .unwrap();
    store
        .upsert_document("/vault/sub/y.md", "h2", None)
        .await
        .unwrap();
    store
        .upsert_document("/elsewhere/z.md", "h3", None)
        .await
        .unwrap();

    let under = store.get_documents_under_prefix("/vault/").await.unwrap();
    assert_eq!(under.len(), 2);

    let by_paths = store
        .get_documents_by_paths(&["/vault/x.md".into(), "/missing.md".into()])
        .await
        .unwrap();
    assert_eq!(by_paths.len(), 1);
    assert_eq!(by_paths[0].file_path, "/vault/x.md");
}
