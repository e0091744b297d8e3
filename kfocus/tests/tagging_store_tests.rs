mod common;

use kfocus::models::{TagKind, TagSearchOperator};

async fn seeded_file(store: &std::sync::Arc<dyn kfocus::db::MetaStore>, path: &str) -> i64 {
    store
        .upsert_screening(&common::submission(path, "hash"))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn tags_are_interned_not_duplicated() {
    let store = common::memory_store().await;

    let first = store
        .get_or_create_tags(&["rust".into(), "search".into()], TagKind::Llm)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);

    let second = store
        .get_or_create_tags(&["rust".into(), "indexing".into()], TagKind::Llm)
        .await
        .unwrap();
    assert_eq!(second.len(), 2);

    let rust_first = first.iter().find(|t| t.name == "rust").unwrap();
    let rust_second = second.iter().find(|t| t.name == "rust").unwrap();
    assert_eq!(rust_first.id, rust_second.id, "existing tag is reused");

    let all = store.get_all_tag_names().await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn link_tags_writes_sorted_csv_and_unions() {
    let store = common::memory_store().await;
    let file_id = seeded_file(&store, "/docs/notes.txt").await;

    let tags = store
        .get_or_create_tags(&["b".into(), "a".into(), "c".into()], TagKind::Llm)
        .await
        .unwrap();
    let mut ids: Vec<i64> = tags.iter().map(|t| t.id).collect();

    // Link twice with overlap; the stored set is the sorted union.
    store.link_tags(file_id, &ids[..2]).await.unwrap();
    store.link_tags(file_id, &ids[1..]).await.unwrap();

    let row = store.get_screening_by_id(file_id).await.unwrap().unwrap();
    let csv = row.tags_display_ids.unwrap();
    ids.sort_unstable();
    let expected: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(csv, expected.join(","));

    // The FTS mirror holds exactly the same id set.
    for id in &ids {
        let hits = store
            .search_file_ids_by_tags(&[*id], TagSearchOperator::And)
            .await
            .unwrap();
        assert_eq!(hits, vec![file_id]);
    }
}

#[tokio::test]
async fn tag_search_and_or_semantics() {
    let store = common::memory_store().await;

    let f1 = seeded_file(&store, "/docs/f1.txt").await;
    let f2 = seeded_file(&store, "/docs/f2.txt").await;
    let f3 = seeded_file(&store, "/docs/f3.txt").await;

    let tags = store
        .get_or_create_tags(&["t1".into(), "t2".into(), "t3".into()], TagKind::Llm)
        .await
        .unwrap();
    let id_of = |name: &str| tags.iter().find(|t| t.name == name).unwrap().id;
    let (t1, t2, t3) = (id_of("t1"), id_of("t2"), id_of("t3"));

    store.link_tags(f1, &[t1, t2]).await.unwrap();
    store.link_tags(f2, &[t2, t3]).await.unwrap();
    store.link_tags(f3, &[t1, t3]).await.unwrap();

    let mut and_hits = store
        .search_file_ids_by_tags(&[t1, t2], TagSearchOperator::And)
        .await
        .unwrap();
    and_hits.sort_unstable();
    assert_eq!(and_hits, vec![f1]);

    let mut or_hits = store
        .search_file_ids_by_tags(&[t1, t2], TagSearchOperator::Or)
        .await
        .unwrap();
    or_hits.sort_unstable();
    assert_eq!(or_hits, vec![f1, f2, f3]);
}

#[tokio::test]
async fn unknown_tag_names_are_ignored() {
    let store = common::memory_store().await;

    let ids = store
        .get_tag_ids_by_names(&["never-created".into()])
        .await
        .unwrap();
    assert!(ids.is_empty());

    // Mixed known/unknown: only the known id comes back.
    store
        .get_or_create_tags(&["real".into()], TagKind::User)
        .await
        .unwrap();
    let ids = store
        .get_tag_ids_by_names(&["real".into(), "ghost".into()])
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn tag_cloud_weights_by_file_frequency() {
    let store = common::memory_store().await;

    let f1 = seeded_file(&store, "/docs/a.txt").await;
    let f2 = seeded_file(&store, "/docs/b.txt").await;

    let tags = store
        .get_or_create_tags(&["common".into(), "rare".into()], TagKind::Llm)
        .await
        .unwrap();
    let common_id = tags.iter().find(|t| t.name == "common").unwrap().id;
    let rare_id = tags.iter().find(|t| t.name == "rare").unwrap().id;

    store.link_tags(f1, &[common_id, rare_id]).await.unwrap();
    store.link_tags(f2, &[common_id]).await.unwrap();

    let cloud = store.tag_cloud(10, 1).await.unwrap();
    assert_eq!(cloud[0].name, "common");
    assert_eq!(cloud[0].weight, 2);
    assert_eq!(cloud[1].weight, 1);

    let filtered = store.tag_cloud(10, 2).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].name, "common");
}
