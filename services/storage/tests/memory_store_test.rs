use chrono::{Duration, TimeZone, Utc};
use pictor_storage::{
    ImageRecord, InMemoryMetadataStore, MetadataRepository, StorageError, DEFAULT_PAGE_SIZE,
};

fn seeded_record(index: i64, owner: &str) -> ImageRecord {
    let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    ImageRecord {
        id: format!("img_seed{:06}", index),
        owner_id: owner.to_string(),
        display_name: format!("photo-{}.png", index),
        storage_path: format!("img_seed{:06}.png", index),
        size_bytes: 1000 + index,
        description: format!("seed {}", index),
        created_at: base + Duration::seconds(index),
    }
}

async fn seeded_store(count: i64) -> InMemoryMetadataStore {
    let store = InMemoryMetadataStore::new();
    for i in 0..count {
        let owner = if i % 3 == 0 { "usr_alice00001" } else { "usr_bob0000001" };
        store.save(&seeded_record(i, owner)).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_pagination_newest_first() {
    let store = seeded_store(30).await;

    let first = store.list_page(0, DEFAULT_PAGE_SIZE).await.unwrap();
    assert_eq!(first.len(), 25);
    assert_eq!(first[0].id, "img_seed000029");
    assert!(first
        .windows(2)
        .all(|pair| pair[0].created_at > pair[1].created_at));

    let second = store.list_page(25, DEFAULT_PAGE_SIZE).await.unwrap();
    assert_eq!(second.len(), 5);
    assert_eq!(second.last().unwrap().id, "img_seed000000");
    assert!(first[24].created_at > second[0].created_at);

    let past_end = store.list_page(30, DEFAULT_PAGE_SIZE).await.unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_pagination_by_owner() {
    let store = seeded_store(30).await;

    let alice = store
        .list_page_by_owner("usr_alice00001", 0, DEFAULT_PAGE_SIZE)
        .await
        .unwrap();
    assert_eq!(alice.len(), 10);
    assert!(alice.iter().all(|r| r.owner_id == "usr_alice00001"));
    assert_eq!(alice[0].id, "img_seed000027");

    let nobody = store
        .list_page_by_owner("usr_nobody0001", 0, DEFAULT_PAGE_SIZE)
        .await
        .unwrap();
    assert!(nobody.is_empty());
}

#[tokio::test]
async fn test_find_present_and_absent() {
    let store = seeded_store(3).await;

    let found = store.find("img_seed000001").await.unwrap();
    assert_eq!(found, Some(seeded_record(1, "usr_bob0000001")));

    assert_eq!(store.find("img_doesnotexist").await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let store = seeded_store(1).await;

    let result = store.save(&seeded_record(0, "usr_alice00001")).await;
    match result {
        Err(StorageError::Duplicate(id)) => assert_eq!(id, "img_seed000000"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(store.len().await, 1);
}
