use collection_store::{CollectionStore, Identifiable, IdentifiableStore, StoreConfig, StoreError, TableKind};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    id: String,
    v: i64,
}

impl Identifiable for Entry {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

fn entry(id: &str, v: i64) -> Entry {
    Entry { id: id.to_string(), v }
}

/// Numeric ids are stored by their text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ticket {
    number: u32,
    title: String,
}

impl Identifiable for Ticket {
    type Id = u32;

    fn id(&self) -> u32 {
        self.number
    }
}

async fn open_entries(dir: &TempDir) -> IdentifiableStore<Entry> {
    let config = StoreConfig::in_directory("entries", dir.path(), TableKind::Identifiable);
    IdentifiableStore::open(config).await.expect("Failed to open store")
}

#[tokio::test]
async fn test_insert_under_same_key_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = open_entries(&dir).await;

    store.insert(&entry("a", 1)).await.unwrap();
    store.insert(&entry("a", 2)).await.unwrap();

    assert_eq!(
        store.get_by_id(&"a".to_string()).await.unwrap(),
        Some(entry("a", 2))
    );
    assert_eq!(store.query().await.unwrap(), vec![entry("a", 2)]);
}

#[tokio::test]
async fn test_get_by_id_absent_is_none() {
    let dir = TempDir::new().unwrap();
    let store = open_entries(&dir).await;

    assert_eq!(store.get_by_id(&"missing".to_string()).await.unwrap(), None);
}

#[tokio::test]
async fn test_exists_agrees_with_get_by_id() {
    let dir = TempDir::new().unwrap();
    let store = open_entries(&dir).await;
    store
        .insert_many(vec![entry("a", 1), entry("b", 2)])
        .await
        .unwrap();
    store.remove_by_id(&"b".to_string()).await.unwrap();

    for id in ["a", "b", "c"] {
        let id = id.to_string();
        let exists = store.exists(&id).await.unwrap();
        let found = store.get_by_id(&id).await.unwrap();
        assert_eq!(exists, found.is_some(), "id {}", id);
    }
    assert!(store.exists(&"a".to_string()).await.unwrap());
}

#[tokio::test]
async fn test_remove_by_item_and_by_id() {
    let dir = TempDir::new().unwrap();
    let store = open_entries(&dir).await;
    store
        .insert_many(vec![entry("a", 1), entry("b", 2), entry("c", 3)])
        .await
        .unwrap();

    // removal is by key, whatever the payload
    store.remove(&entry("a", 999)).await.unwrap();
    store.remove_by_id(&"b".to_string()).await.unwrap();
    store.remove_by_id(&"zzz".to_string()).await.unwrap();

    assert_eq!(store.query().await.unwrap(), vec![entry("c", 3)]);
}

#[tokio::test]
async fn test_insert_many_upserts_within_batch() {
    let dir = TempDir::new().unwrap();
    let store = open_entries(&dir).await;

    store
        .insert_many(vec![entry("a", 1), entry("a", 2), entry("b", 1)])
        .await
        .unwrap();

    let mut items = store.query().await.unwrap();
    items.sort_by(|l, r| l.id.cmp(&r.id));
    assert_eq!(items, vec![entry("a", 2), entry("b", 1)]);
}

#[tokio::test]
async fn test_numeric_ids() {
    let store: IdentifiableStore<Ticket> =
        IdentifiableStore::open(StoreConfig::in_memory("tickets"))
            .await
            .unwrap();
    let ticket = Ticket {
        number: 7,
        title: "Fix login".to_string(),
    };

    store.insert(&ticket).await.unwrap();

    assert!(store.exists(&7).await.unwrap());
    assert!(!store.exists(&8).await.unwrap());
    assert_eq!(store.get_by_id(&7).await.unwrap(), Some(ticket));
}

#[tokio::test]
async fn test_corrupt_payload_fails_point_lookup() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::in_directory("entries", dir.path(), TableKind::Identifiable);
    IdentifiableStore::<Entry>::open(config.clone())
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    let conn = rusqlite::Connection::open(&config.path).unwrap();
    conn.execute(
        "INSERT INTO entries (id, data) VALUES ('bad', X'00FF')",
        [],
    )
    .unwrap();
    drop(conn);

    let store = IdentifiableStore::<Entry>::open(config).await.unwrap();
    let err = store.get_by_id(&"bad".to_string()).await.unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));
    assert!(store.exists(&"bad".to_string()).await.unwrap());
    assert!(store.query().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_interchangeable_with_other_stores() {
    let dir = TempDir::new().unwrap();
    let store = open_entries(&dir).await;
    let dyn_store: &dyn CollectionStore<Entry> = &store;

    dyn_store.insert(&entry("a", 1)).await.unwrap();
    dyn_store.insert(&entry("b", 2)).await.unwrap();
    dyn_store.remove(&entry("a", 0)).await.unwrap();
    assert_eq!(dyn_store.name(), "entries");
    assert_eq!(dyn_store.query().await.unwrap(), vec![entry("b", 2)]);
}

#[tokio::test]
async fn test_boxed_store_can_be_driven_from_a_spawned_task() {
    let store: Box<dyn CollectionStore<Entry>> =
        Box::new(IdentifiableStore::<Entry>::open(StoreConfig::in_memory("entries")).await.unwrap());

    let store = tokio::spawn(async move {
        store.insert(&entry("a", 1)).await.unwrap();
        store.remove(&entry("a", 1)).await.unwrap();
        store
    })
    .await
    .unwrap();

    assert!(store.query().await.unwrap().is_empty());
}
