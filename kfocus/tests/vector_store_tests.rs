use kfocus::models::VectorRecord;
use kfocus::vector::VectorStore;

fn record(vector_id: &str, document_id: i64, parent_chunk_id: i64, vector: Vec<f32>) -> VectorRecord {
    VectorRecord {
        vector_id: vector_id.to_string(),
        vector,
        parent_chunk_id,
        document_id,
        retrieval_content_preview: format!("preview for {vector_id}"),
    }
}

#[tokio::test]
async fn search_orders_by_ascending_distance() {
    let store = VectorStore::open_in_memory(3).await.unwrap();

    store
        .add_vectors(&[
            record("a000000000000001", 1, 10, vec![1.0, 0.0, 0.0]),
            record("a000000000000002", 1, 11, vec![0.0, 1.0, 0.0]),
            record("a000000000000003", 1, 12, vec![0.9, 0.1, 0.0]),
        ])
        .await
        .unwrap();

    let hits = store.search(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].vector_id, "a000000000000001");
    assert_eq!(hits[1].vector_id, "a000000000000003");
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits[1].distance <= hits[2].distance);
    assert!(hits.iter().all(|h| h.distance >= 0.0));
}

#[tokio::test]
async fn document_filter_narrows_before_top_k() {
    let store = VectorStore::open_in_memory(3).await.unwrap();

    // Document 2's vectors are all closer to the query than document 1's.
    store
        .add_vectors(&[
            record("b000000000000001", 2, 20, vec![1.0, 0.0, 0.0]),
            record("b000000000000002", 2, 21, vec![0.99, 0.01, 0.0]),
            record("b000000000000003", 1, 22, vec![0.0, 1.0, 0.0]),
            record("b000000000000004", 1, 23, vec![0.0, 0.9, 0.1]),
        ])
        .await
        .unwrap();

    // With top_k=1 and a filter on document 1, the (globally closer)
    // document-2 vectors must not crowd out the match.
    let hits = store.search(&[1.0, 0.0, 0.0], 1, Some(&[1])).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, 1);
}

#[tokio::test]
async fn empty_document_scope_returns_no_rows() {
    let store = VectorStore::open_in_memory(3).await.unwrap();
    store
        .add_vectors(&[record("c000000000000001", 1, 1, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();

    let hits = store.search(&[1.0, 0.0, 0.0], 5, Some(&[])).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let store = VectorStore::open_in_memory(3).await.unwrap();

    let error = store
        .add_vectors(&[record("d000000000000001", 1, 1, vec![1.0, 0.0])])
        .await
        .unwrap_err();
    assert!(error.to_string().contains("dimension"));

    let error = store.search(&[1.0, 0.0], 5, None).await.unwrap_err();
    assert!(error.to_string().contains("dimension"));
}

#[tokio::test]
async fn delete_by_document_removes_only_that_document() {
    let store = VectorStore::open_in_memory(2).await.unwrap();
    store
        .add_vectors(&[
            record("e000000000000001", 1, 1, vec![1.0, 0.0]),
            record("e000000000000002", 2, 2, vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let deleted = store.delete_by_document(1).await.unwrap();
    assert_eq!(deleted, 1);

    let hits = store.search(&[1.0, 0.0], 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, 2);
}

#[tokio::test]
async fn preview_is_capped_at_500_chars() {
    let store = VectorStore::open_in_memory(2).await.unwrap();
    let mut long = record("f000000000000001", 1, 1, vec![1.0, 0.0]);
    long.retrieval_content_preview = "x".repeat(2000);

    store.add_vectors(&[long]).await.unwrap();
    let hits = store.search(&[1.0, 0.0], 1, None).await.unwrap();
    assert_eq!(hits[0].retrieval_content_preview.chars().count(), 500);
}
