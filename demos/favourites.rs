//! Keeps a small set of favourite numbers in a blob store.
//!
//! Run with `RUST_LOG=debug cargo run --example favourites` to watch the store
//! open, write and close.

use anyhow::Result;
use collection_store::{BlobStore, StoreConfig, TableKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = std::env::temp_dir().join("collection-store-demo");
    let store: BlobStore<i64> =
        BlobStore::open(StoreConfig::in_directory("favourites", &dir, TableKind::Blob)).await?;

    let mut values = store.query().await?;
    info!(?values, "Loaded favourites");

    let next = values.iter().max().copied().unwrap_or(9) + 1;
    store.insert(&next).await?;
    values.push(next);
    info!(added = next, "Added favourite");

    if values.len() > 5 {
        let oldest = values.remove(0);
        store.remove(&oldest).await?;
        info!(removed = oldest, "Removed favourite");
    }

    let diagnostics = store.diagnose().await?;
    info!(records = diagnostics.record_count, path = %dir.display(), "Done");
    store.close().await?;
    Ok(())
}
