use collection_store::{
    BlobStore, Identifiable, IdentifiableStore, JsonStore, RecordFailure, StoreConfig, StoreError,
    StreamOptions, TableKind,
};
use futures::StreamExt;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::Path;
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

/// Rows in insertion order: ok, corrupt, ok.
async fn entries_with_corrupt_middle(dir: &TempDir) -> IdentifiableStore<Entry> {
    let config = StoreConfig::in_directory("entries", dir.path(), TableKind::Identifiable);
    let store = IdentifiableStore::<Entry>::open(config.clone()).await.unwrap();
    store.insert(&entry("1", 1)).await.unwrap();
    store.close().await.unwrap();

    insert_raw(&config.path, "2", b"{not json".to_vec());
    insert_raw(&config.path, "3", serde_json::to_vec(&entry("3", 3)).unwrap());

    IdentifiableStore::open(config).await.unwrap()
}

fn insert_raw(path: &Path, id: &str, data: Vec<u8>) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO entries (id, data) VALUES (?1, ?2)",
        params![id, data],
    )
    .unwrap();
}

#[tokio::test]
async fn test_fail_fast_yields_partial_result() {
    let dir = TempDir::new().unwrap();
    let store = entries_with_corrupt_middle(&dir).await;

    let mut stream = store
        .query_stream(StreamOptions::default().fail_fast())
        .await
        .unwrap();
    let failures = stream.take_failures().unwrap();

    let items: Vec<Entry> = stream.collect().await;
    assert_eq!(items, vec![entry("1", 1)]);

    let failures: Vec<RecordFailure> = failures.collect().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert!(matches!(failures[0].error, StoreError::Decode(_)));
}

#[tokio::test]
async fn test_default_stream_skips_corrupt_rows() {
    let dir = TempDir::new().unwrap();
    let store = entries_with_corrupt_middle(&dir).await;

    let mut stream = store.query_stream(StreamOptions::default()).await.unwrap();
    let failures = stream.take_failures().unwrap();

    let items: Vec<Entry> = stream.collect().await;
    assert_eq!(items, vec![entry("1", 1), entry("3", 3)]);
    assert_eq!(failures.collect::<Vec<_>>().await.len(), 1);
}

#[tokio::test]
async fn test_scan_reports_skipped_rows() {
    let dir = TempDir::new().unwrap();
    let store = entries_with_corrupt_middle(&dir).await;

    let report = store.scan().await.unwrap();
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
}

#[tokio::test]
async fn test_store_stays_usable_while_stream_is_consumed() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::in_directory("nums", dir.path(), TableKind::Blob);
    let store: BlobStore<i64> = BlobStore::open(config).await.unwrap();
    store.insert_many(1..=10).await.unwrap();

    let mut stream = store.query_stream(StreamOptions::default()).await.unwrap();
    let first = stream.next().await;
    assert!(first.is_some());

    // the stream holds only its own buffer, not the connection
    store.insert(&11).await.unwrap();
    let rest: Vec<i64> = stream.collect().await;
    assert_eq!(rest.len(), 9);
    assert_eq!(store.query().await.unwrap().len(), 11);
}

#[tokio::test]
async fn test_cancelled_stream_yields_nothing_more() {
    let store: BlobStore<i64> = BlobStore::open(StoreConfig::in_memory("nums"))
        .await
        .unwrap();
    store.insert_many(1..=100).await.unwrap();

    let mut stream = store.query_stream(StreamOptions::default()).await.unwrap();
    assert!(stream.next().await.is_some());
    stream.cancel();

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_json_store_streams_documents() {
    let store: JsonStore<Entry> = JsonStore::open(StoreConfig::in_memory("entries"))
        .await
        .unwrap();
    store
        .insert_many(vec![entry("a", 1), entry("b", 2)])
        .await
        .unwrap();

    let stream = store.query_stream(StreamOptions::bounded(16)).await.unwrap();
    let items: Vec<Entry> = stream.collect().await;
    assert_eq!(items.len(), 2);
}
