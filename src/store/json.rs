//! JSON document store.
//!
//! Each row holds one complete JSON document as text, so rows can be filtered
//! with the engine's own JSON path extraction instead of decoding every row.
//! Documents have no key and duplicates are allowed.
//!
//! Field paths are written relative to the document root (`"city"`,
//! `"address.city"`); a path that already starts with `$` is passed through.

use super::{drain_payloads, CollectionStore};
use crate::codec::{Codec, JsonCodec};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::schema::{diagnose, TableDefinition, TableDiagnostics, TableKind, JSON_COLUMN};
use crate::sqlite::SqliteConnection;
use crate::stream::{decode_all, QueryStream, ScanReport, StreamOptions};
use crate::transaction::in_transaction;
use async_trait::async_trait;
use rusqlite::params;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Collection of JSON documents in a `json TEXT` table.
pub struct JsonStore<T, C = JsonCodec> {
    conn: SqliteConnection,
    codec: Arc<C>,
    path: Option<PathBuf>,
    is_new: AtomicBool,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T, JsonCodec>
where
    T: Send + 'static,
    JsonCodec: Codec<T>,
{
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_codec(config, JsonCodec).await
    }

    /// Open `<name>-json-store.sql` in the platform data directory.
    pub async fn open_default(name: &str) -> StoreResult<Self> {
        Self::open(StoreConfig::default_location(name, TableKind::Json)?).await
    }
}

impl<T, C> JsonStore<T, C>
where
    T: Send + 'static,
    C: Codec<T>,
{
    /// The codec must produce JSON text for field queries to work.
    pub async fn open_with_codec(config: StoreConfig, codec: C) -> StoreResult<Self> {
        let table = TableDefinition::for_kind(&config.name, TableKind::Json);
        let conn = SqliteConnection::open(&config, table).await?;
        let path = (!config.is_in_memory()).then(|| config.path.clone());
        let is_new = AtomicBool::new(conn.created_table());
        Ok(Self {
            conn,
            codec: Arc::new(codec),
            path,
            is_new,
            _item: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        self.conn.name()
    }

    /// True if the table was created by this handle and nothing has been inserted since.
    pub fn is_new(&self) -> bool {
        self.is_new.load(Ordering::Acquire)
    }

    /// Last modification time of the backing file; `None` for in-memory stores.
    pub fn modified_at(&self) -> StoreResult<Option<SystemTime>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let metadata = std::fs::metadata(path).map_err(|e| StoreError::Open {
            path: path.clone(),
            reason: format!("failed to read file metadata: {}", e),
        })?;
        metadata.modified().map(Some).map_err(|e| StoreError::Open {
            path: path.clone(),
            reason: format!("modification time unavailable: {}", e),
        })
    }

    pub async fn insert(&self, item: &T) -> StoreResult<()> {
        let document = self.codec.encode_text(item)?;
        let sql = format!("INSERT INTO {} ({}) VALUES (?1)", self.name(), JSON_COLUMN);
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![document])?;
                Ok(())
            })
            .await?;
        self.is_new.store(false, Ordering::Release);
        Ok(())
    }

    /// Insert all documents or none of them.
    pub async fn insert_many<I>(&self, items: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let codec = Arc::clone(&self.codec);
        let sql = format!("INSERT INTO {} ({}) VALUES (?1)", self.name(), JSON_COLUMN);
        let store = self.name().to_string();
        self.conn
            .call(move |conn| {
                in_transaction(conn, |tx| {
                    let mut stmt = tx.prepare(&sql)?;
                    for item in &items {
                        stmt.execute(params![codec.encode_text(item)?])?;
                    }
                    Ok(())
                })?;
                debug!(store = %store, count = items.len(), "Bulk insert committed");
                Ok(())
            })
            .await?;
        self.is_new.store(false, Ordering::Release);
        Ok(())
    }

    /// Documents whose field at `field_path` equals `value`.
    ///
    /// `value` is compared in its compact JSON form against the engine's JSON
    /// rendering of the field, so `"NYC"`, `42`, `true` and `null` all match
    /// as expected. Rows that are not valid JSON never match.
    pub async fn query_field<V>(&self, field_path: &str, value: &V) -> StoreResult<Vec<T>>
    where
        V: Serialize + ?Sized,
    {
        let path = json_path(field_path);
        let expected = canonical_json(value)?;
        let sql = format!(
            "SELECT {col} FROM {table} WHERE {field} = ?2",
            col = JSON_COLUMN,
            table = self.name(),
            field = field_expression(),
        );
        let raw = self
            .conn
            .call(move |conn| drain_payloads(conn, &sql, params![path, expected]))
            .await?;
        self.decode_strict(raw)
    }

    /// Documents whose field at `field_path` contains `pattern` as a substring.
    ///
    /// `%`, `_` and `\` in `pattern` match only themselves. Matching follows
    /// the engine's `LIKE`, which ignores ASCII case.
    pub async fn fuzzy_query(&self, field_path: &str, pattern: &str) -> StoreResult<Vec<T>> {
        let path = json_path(field_path);
        let like = format!("%{}%", escape_like(pattern));
        let sql = format!(
            "SELECT {col} FROM {table} \
             WHERE CASE WHEN json_valid({col}) THEN json_extract({col}, ?1) END LIKE ?2 ESCAPE '\\'",
            col = JSON_COLUMN,
            table = self.name(),
        );
        let raw = self
            .conn
            .call(move |conn| drain_payloads(conn, &sql, params![path, like]))
            .await?;
        self.decode_strict(raw)
    }

    /// Delete documents identical to this item's serialized form.
    pub async fn remove(&self, item: &T) -> StoreResult<()> {
        let document = self.codec.encode_text(item)?;
        let sql = format!("DELETE FROM {} WHERE {} = ?1", self.name(), JSON_COLUMN);
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![document])?;
                Ok(())
            })
            .await
    }

    /// Delete every document whose field at `field_path` equals `value`.
    /// Returns the number of documents removed.
    pub async fn remove_by_field<V>(&self, field_path: &str, value: &V) -> StoreResult<usize>
    where
        V: Serialize + ?Sized,
    {
        let path = json_path(field_path);
        let expected = canonical_json(value)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?2",
            self.name(),
            field_expression()
        );
        let store = self.name().to_string();
        self.conn
            .call(move |conn| {
                let removed = conn.execute(&sql, params![path, expected])?;
                debug!(store = %store, path = %path, removed, "Removed documents by field");
                Ok(removed)
            })
            .await
    }

    /// Every decodable document, in no particular order.
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
        let sql = format!("SELECT {} FROM {}", JSON_COLUMN, self.name());
        self.conn
            .call(move |conn| drain_payloads(conn, &sql, []))
            .await
    }

    fn decode_strict(&self, raw: Vec<Vec<u8>>) -> StoreResult<Vec<T>> {
        raw.iter().map(|bytes| self.codec.decode(bytes)).collect()
    }
}

/// JSON rendering of the field bound to `?1`, or NULL for rows that are not JSON.
fn field_expression() -> String {
    format!(
        "CASE WHEN json_valid({col}) THEN {col} -> ?1 END",
        col = JSON_COLUMN
    )
}

fn json_path(field_path: &str) -> String {
    if field_path.starts_with('$') {
        field_path.to_string()
    } else {
        format!("$.{}", field_path)
    }
}

fn canonical_json<V: Serialize + ?Sized>(value: &V) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Encode(e.to_string()))
}

fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl<T, C> CollectionStore<T> for JsonStore<T, C>
where
    T: Send + Sync + 'static,
    C: Codec<T>,
{
    fn name(&self) -> &str {
        JsonStore::name(self)
    }

    async fn insert(&self, item: &T) -> StoreResult<()> {
        JsonStore::insert(self, item).await
    }

    async fn remove(&self, item: &T) -> StoreResult<()> {
        JsonStore::remove(self, item).await
    }

    async fn query(&self) -> StoreResult<Vec<T>> {
        JsonStore::query(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_paths() {
        assert_eq!(json_path("city"), "$.city");
        assert_eq!(json_path("address.city"), "$.address.city");
        assert_eq!(json_path("$.tags[0]"), "$.tags[0]");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\dir"), "c:\\\\dir");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(canonical_json("NYC").unwrap(), "\"NYC\"");
        assert_eq!(canonical_json(&42).unwrap(), "42");
        assert_eq!(canonical_json(&true).unwrap(), "true");
        assert_eq!(canonical_json(&Option::<i32>::None).unwrap(), "null");
    }
}
