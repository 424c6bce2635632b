//! Identifiable store: items keyed by their own stable id.

use super::{drain_payloads, CollectionStore, Identifiable};
use crate::codec::{Codec, JsonCodec};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::schema::{diagnose, TableDefinition, TableDiagnostics, TableKind, BLOB_COLUMN, KEY_COLUMN};
use crate::sqlite::SqliteConnection;
use crate::stream::{decode_all, QueryStream, ScanReport, StreamOptions};
use crate::transaction::in_transaction;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Collection keyed by `Identifiable::id`, stored as `id TEXT PRIMARY KEY, data BLOB`.
///
/// Inserting under an existing id replaces the stored item.
pub struct IdentifiableStore<T, C = JsonCodec> {
    conn: SqliteConnection,
    codec: Arc<C>,
    _item: PhantomData<fn() -> T>,
}

impl<T> IdentifiableStore<T, JsonCodec>
where
    T: Identifiable + Send + 'static,
    JsonCodec: Codec<T>,
{
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_codec(config, JsonCodec).await
    }

    /// Open `<name>-identifiable-store.sql` in the platform data directory.
    pub async fn open_default(name: &str) -> StoreResult<Self> {
        Self::open(StoreConfig::default_location(name, TableKind::Identifiable)?).await
    }
}

impl<T, C> IdentifiableStore<T, C>
where
    T: Identifiable + Send + 'static,
    C: Codec<T>,
{
    pub async fn open_with_codec(config: StoreConfig, codec: C) -> StoreResult<Self> {
        let table = TableDefinition::for_kind(&config.name, TableKind::Identifiable);
        let conn = SqliteConnection::open(&config, table).await?;
        Ok(Self {
            conn,
            codec: Arc::new(codec),
            _item: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        self.conn.name()
    }

    /// Insert or replace the item stored under its id.
    pub async fn insert(&self, item: &T) -> StoreResult<()> {
        let id = item.id().to_string();
        let payload = self.codec.encode(item)?;
        let sql = self.upsert_statement();
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![id, payload])?;
                Ok(())
            })
            .await
    }

    /// Upsert all items or none of them.
    pub async fn insert_many<I>(&self, items: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let codec = Arc::clone(&self.codec);
        let sql = self.upsert_statement();
        let store = self.name().to_string();
        self.conn
            .call(move |conn| {
                in_transaction(conn, |tx| {
                    let mut stmt = tx.prepare(&sql)?;
                    for item in &items {
                        let payload = codec.encode(item)?;
                        stmt.execute(params![item.id().to_string(), payload])?;
                    }
                    Ok(())
                })?;
                debug!(store = %store, count = items.len(), "Bulk upsert committed");
                Ok(())
            })
            .await
    }

    pub async fn remove(&self, item: &T) -> StoreResult<()> {
        let key = item.id().to_string();
        self.delete_key(key).await
    }

    /// Delete the item stored under `id`; a no-op if there is none.
    pub async fn remove_by_id(&self, id: &T::Id) -> StoreResult<()> {
        self.delete_key(id.to_string()).await
    }

    /// The item stored under `id`, if any.
    pub async fn get_by_id(&self, id: &T::Id) -> StoreResult<Option<T>> {
        let key = id.to_string();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            BLOB_COLUMN,
            self.name(),
            KEY_COLUMN
        );
        let payload: Option<Vec<u8>> = self
            .conn
            .call(move |conn| {
                let payload = conn
                    .query_row(&sql, params![key], |row| row.get(0))
                    .optional()?;
                Ok(payload)
            })
            .await?;
        payload.map(|bytes| self.codec.decode(&bytes)).transpose()
    }

    /// Whether an item is stored under `id`, without decoding it.
    pub async fn exists(&self, id: &T::Id) -> StoreResult<bool> {
        let key = id.to_string();
        let sql = format!("SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1", self.name(), KEY_COLUMN);
        self.conn
            .call(move |conn| {
                let found = conn
                    .query_row(&sql, params![key], |_| Ok(()))
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    /// Every decodable item, in no particular order.
    pub async fn query(&self) -> StoreResult<Vec<T>> {
        Ok(self.scan().await?.items)
    }

    /// Full scan that also reports the records it had to skip.
    pub async fn scan(&self) -> StoreResult<ScanReport<T>> {
        let raw = self.drain_all().await?;
        Ok(decode_all(self.name(), self.codec.as_ref(), raw))
    }

    pub async fn query_stream(&self, options: StreamOptions) -> StoreResult<QueryStream<T>> {
        let raw = self.drain_all().await?;
        debug!(store = %self.name(), records = raw.len(), "Loaded records for streaming");
        QueryStream::spawn(self.name().to_string(), raw, Arc::clone(&self.codec), options)
    }

    pub async fn diagnose(&self) -> StoreResult<TableDiagnostics> {
        let table = self.name().to_string();
        self.conn.call(move |conn| diagnose(conn, &table)).await
    }

    pub async fn close(mut self) -> StoreResult<()> {
        self.conn.close().await
    }

    fn upsert_statement(&self) -> String {
        format!(
            "INSERT OR REPLACE INTO {} ({}, {}) VALUES (?1, ?2)",
            self.name(),
            KEY_COLUMN,
            BLOB_COLUMN
        )
    }

    async fn delete_key(&self, key: String) -> StoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", self.name(), KEY_COLUMN);
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![key])?;
                Ok(())
            })
            .await
    }

    async fn drain_all(&self) -> StoreResult<Vec<Vec<u8>>> {
        let sql = format!("SELECT {} FROM {}", BLOB_COLUMN, self.name());
        self.conn
            .call(move |conn| drain_payloads(conn, &sql, []))
            .await
    }
}

#[async_trait]
impl<T, C> CollectionStore<T> for IdentifiableStore<T, C>
where
    T: Identifiable + Send + Sync + 'static,
    C: Codec<T>,
{
    fn name(&self) -> &str {
        IdentifiableStore::name(self)
    }

    async fn insert(&self, item: &T) -> StoreResult<()> {
        IdentifiableStore::insert(self, item).await
    }

    async fn remove(&self, item: &T) -> StoreResult<()> {
        IdentifiableStore::remove(self, item).await
    }

    async fn query(&self) -> StoreResult<Vec<T>> {
        IdentifiableStore::query(self).await
    }
}
