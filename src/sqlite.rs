//! Connection ownership and the serializing access gate.
//!
//! Every store owns one [`SqliteConnection`]. The underlying
//! `rusqlite::Connection` lives on a dedicated worker thread for its whole
//! life; callers reach it only by submitting jobs to that thread's queue.
//! Jobs run one at a time, in the order they were submitted, so a store never
//! has two engine calls in flight and no cursor ever leaves the worker.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::schema::TableDefinition;
use futures::channel::oneshot;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Rollback journal, deleted after each commit
const JOURNAL_MODE: &str = "DELETE";
/// Negative values are KiB: roughly 2 MiB of page cache
const CACHE_SIZE: i64 = -2048;
/// Sync at critical moments only; fine for a single local writer
const SYNCHRONOUS: &str = "NORMAL";

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Exclusive owner of one connection to one backing file.
pub(crate) struct SqliteConnection {
    name: String,
    sender: Option<mpsc::Sender<Job>>,
    closed: Option<oneshot::Receiver<StoreResult<()>>>,
    created_table: bool,
}

impl SqliteConnection {
    /// Open the backing file on a fresh worker thread and make sure `table` exists.
    pub(crate) async fn open(config: &StoreConfig, table: TableDefinition) -> StoreResult<Self> {
        info!(store = %config.name, path = ?config.path, "Opening collection store");

        let (sender, receiver) = mpsc::channel::<Job>();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        let worker_config = config.clone();
        thread::Builder::new()
            .name(format!("collection-store-{}", config.name))
            .spawn(move || {
                let conn = match open_connection(&worker_config, &table) {
                    Ok((conn, created)) => {
                        let _ = opened_tx.send(Ok(created));
                        conn
                    }
                    Err(err) => {
                        let _ = opened_tx.send(Err(err));
                        return;
                    }
                };
                run_worker(&worker_config.name, conn, receiver, closed_tx);
            })
            .map_err(|e| StoreError::Open {
                path: config.path.clone(),
                reason: format!("failed to spawn store worker: {}", e),
            })?;

        let created_table = opened_rx.await.map_err(|_| StoreError::Open {
            path: config.path.clone(),
            reason: "store worker exited during open".to_string(),
        })??;

        Ok(Self {
            name: config.name.clone(),
            sender: Some(sender),
            closed: Some(closed_rx),
            created_table,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// True if the table did not exist before this connection was opened
    pub(crate) fn created_table(&self) -> bool {
        self.created_table
    }

    /// Run `f` against the connection once every earlier job has finished.
    ///
    /// The job is queued on the first poll of the returned future. Dropping the
    /// future afterwards does not retract it.
    pub(crate) async fn call<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| StoreError::Closed(self.name.clone()))?;

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = tx.send(f(conn));
        });
        sender
            .send(job)
            .map_err(|_| StoreError::Closed(self.name.clone()))?;

        rx.await.map_err(|_| StoreError::Closed(self.name.clone()))?
    }

    /// Stop accepting work, finish what is queued, and close the connection.
    pub(crate) async fn close(&mut self) -> StoreResult<()> {
        drop(self.sender.take());
        match self.closed.take() {
            Some(closed) => closed
                .await
                .map_err(|_| StoreError::Closed(self.name.clone()))?,
            None => Ok(()),
        }
    }
}

fn open_connection(config: &StoreConfig, table: &TableDefinition) -> StoreResult<(Connection, bool)> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory().map_err(|e| open_error(&config.path, e))?
    } else {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                    path: config.path.clone(),
                    reason: format!("failed to create directory: {}", e),
                })?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(&config.path, flags).map_err(|e| open_error(&config.path, e))?
    };

    configure_pragmas(&conn).map_err(|e| open_error(&config.path, e))?;
    let created = table.create_if_absent(&conn)?;
    Ok((conn, created))
}

fn open_error(path: &Path, err: rusqlite::Error) -> StoreError {
    StoreError::Open {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn configure_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    debug!(
        journal_mode = JOURNAL_MODE,
        cache_size = CACHE_SIZE,
        synchronous = SYNCHRONOUS,
        "Configuring SQLite pragmas"
    );
    conn.execute_batch(&format!("PRAGMA journal_mode = {};", JOURNAL_MODE))?;
    conn.execute_batch(&format!("PRAGMA cache_size = {};", CACHE_SIZE))?;
    conn.execute_batch(&format!("PRAGMA synchronous = {};", SYNCHRONOUS))?;
    Ok(())
}

fn run_worker(
    name: &str,
    mut conn: Connection,
    receiver: mpsc::Receiver<Job>,
    closed: oneshot::Sender<StoreResult<()>>,
) {
    while let Ok(job) = receiver.recv() {
        job(&mut conn);
    }

    let result = conn.close().map_err(|(_, e)| {
        warn!(store = name, error = %e, "Failed to close connection");
        StoreError::Statement(e)
    });
    info!(store = name, "Closed collection store");
    let _ = closed.send(result);
}
