//! Store variants and the contract they share.

pub mod blob;
pub mod identifiable;
pub mod json;

use crate::error::StoreResult;
use crate::stream::RawRecords;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params};

/// A named collection of items backed by persistent storage.
#[async_trait]
pub trait CollectionStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str;

    async fn insert(&self, item: &T) -> StoreResult<()>;

    async fn remove(&self, item: &T) -> StoreResult<()>;

    async fn query(&self) -> StoreResult<Vec<T>>;
}

/// Items that carry a stable unique key.
pub trait Identifiable {
    type Id: std::fmt::Display;

    fn id(&self) -> Self::Id;
}

/// Run a single-column query and copy every non-null payload out of the cursor.
///
/// The statement is finalized before this returns, on success or failure.
pub(crate) fn drain_payloads<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<RawRecords> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut payloads = Vec::new();
    while let Some(row) = rows.next()? {
        match row.get_ref(0)? {
            ValueRef::Blob(bytes) => payloads.push(bytes.to_vec()),
            ValueRef::Text(text) => payloads.push(text.to_vec()),
            ValueRef::Null => {}
            ValueRef::Integer(n) => payloads.push(n.to_string().into_bytes()),
            ValueRef::Real(f) => payloads.push(f.to_string().into_bytes()),
        }
    }
    Ok(payloads)
}
