//! SQLite-backed collection stores.
//!
//! # Intention
//!
//! - Give applications interchangeable persistent collections: [`BlobStore`]
//!   (opaque encoded items), [`JsonStore`] (JSON documents queryable by field
//!   path) and [`IdentifiableStore`] (items keyed by their own id).
//! - Keep each collection's connection on its own worker so operations on one
//!   store never overlap, run in submission order, and never block other
//!   stores.
//! - Offer lazy, cancellable streaming over query results without ever moving
//!   a live cursor off the worker.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite persistence belongs here.
//! - One store handle per backing file; opening the same file through two
//!   handles at once is not supported.
//! - Schema management is create-if-absent only.
//!
//! # Usage
//!
//! ```rust,no_run
//! use collection_store::{BlobStore, StoreConfig};
//!
//! # async fn demo() -> collection_store::StoreResult<()> {
//! let store: BlobStore<i64> = BlobStore::open(StoreConfig::new("nums", "/tmp/nums-store.sql")).await?;
//! store.insert(&1).await?;
//! store.remove(&1).await?;
//! let all = store.query().await?;
//! assert!(all.is_empty());
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod schema;
mod sqlite;
pub mod store;
pub mod stream;
pub mod transaction;

// Re-exports
pub use codec::{Codec, JsonCodec};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use schema::{ColumnInfo, TableDiagnostics, TableKind};
pub use store::blob::BlobStore;
pub use store::identifiable::IdentifiableStore;
pub use store::json::JsonStore;
pub use store::{CollectionStore, Identifiable};
pub use stream::{QueryStream, RecordFailure, ScanReport, StreamOptions};
