//! Blob store: opaque encoded payloads with byte-exact identity.

use super::{drain_payloads, CollectionStore};
use crate::codec::{Codec, JsonCodec};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::schema::{diagnose, TableDefinition, TableDiagnostics, TableKind, BLOB_COLUMN};
use crate::sqlite::SqliteConnection;
use crate::stream::{decode_all, QueryStream, ScanReport, StreamOptions};
use crate::transaction::in_transaction;
use async_trait::async_trait;
use rusqlite::params;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Collection of encoded items in a `data BLOB UNIQUE` table.
///
/// Inserting byte-identical content twice stores it once.
pub struct BlobStore<T, C = JsonCodec> {
    conn: SqliteConnection,
    codec: Arc<C>,
    _item: PhantomData<fn() -> T>,
}

impl<T> BlobStore<T, JsonCodec>
where
    T: Send + 'static,
    JsonCodec: Codec<T>,
{
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_codec(config, JsonCodec).await
    }

    /// Open `<name>-store.sql` in the platform data directory.
    pub async fn open_default(name: &str) -> StoreResult<Self> {
        Self::open(StoreConfig::default_location(name, TableKind::Blob)?).await
    }
}

impl<T, C> BlobStore<T, C>
where
    T: Send + 'static,
    C: Codec<T>,
{
    pub async fn open_with_codec(config: StoreConfig, codec: C) -> StoreResult<Self> {
        let table = TableDefinition::for_kind(&config.name, TableKind::Blob);
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

    /// Insert an item; a no-op if identical bytes are already stored.
    pub async fn insert(&self, item: &T) -> StoreResult<()> {
        let payload = self.codec.encode(item)?;
        let sql = format!("INSERT OR IGNORE INTO {} ({}) VALUES (?1)", self.name(), BLOB_COLUMN);
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![payload])?;
                Ok(())
            })
            .await
    }

    /// Insert all items or none of them.
    pub async fn insert_many<I>(&self, items: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let codec = Arc::clone(&self.codec);
        let sql = format!("INSERT OR IGNORE INTO {} ({}) VALUES (?1)", self.name(), BLOB_COLUMN);
        let store = self.name().to_string();
        self.conn
            .call(move |conn| {
                in_transaction(conn, |tx| {
                    let mut stmt = tx.prepare(&sql)?;
                    for item in &items {
                        stmt.execute(params![codec.encode(item)?])?;
                    }
                    Ok(())
                })?;
                debug!(store = %store, count = items.len(), "Bulk insert committed");
                Ok(())
            })
            .await
    }

    /// Delete rows holding exactly this item's bytes.
    pub async fn remove(&self, item: &T) -> StoreResult<()> {
        let payload = self.codec.encode(item)?;
        let sql = format!("DELETE FROM {} WHERE {} = ?1", self.name(), BLOB_COLUMN);
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![payload])?;
                Ok(())
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
        QueryStream::spawn(self.name().to_string(), raw, Arc::clone(&self.codec), options)
    }

    pub async fn diagnose(&self) -> StoreResult<TableDiagnostics> {
        let table = self.name().to_string();
        self.conn.call(move |conn| diagnose(conn, &table)).await
    }

    pub async fn close(mut self) -> StoreResult<()> {
        self.conn.close().await
    }

    async fn drain_all(&self) -> StoreResult<Vec<Vec<u8>>> {
        let sql = format!("SELECT {} FROM {}", BLOB_COLUMN, self.name());
        self.conn
            .call(move |conn| drain_payloads(conn, &sql, []))
            .await
    }
}

#[async_trait]
impl<T, C> CollectionStore<T> for BlobStore<T, C>
where
    T: Send + Sync + 'static,
    C: Codec<T>,
{
    fn name(&self) -> &str {
        BlobStore::name(self)
    }

    async fn insert(&self, item: &T) -> StoreResult<()> {
        BlobStore::insert(self, item).await
    }

    async fn remove(&self, item: &T) -> StoreResult<()> {
        BlobStore::remove(self, item).await
    }

    async fn query(&self) -> StoreResult<Vec<T>> {
        BlobStore::query(self).await
    }
}
