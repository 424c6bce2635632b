//! All-or-nothing bulk writes.

use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, Transaction};
use tracing::warn;

/// Run `writes` between BEGIN and COMMIT.
///
/// If `writes` fails, everything issued since BEGIN is rolled back and the
/// original error is returned. Failures of BEGIN, COMMIT or ROLLBACK themselves
/// surface as [`StoreError::Transaction`].
pub fn in_transaction<R, F>(conn: &mut Connection, writes: F) -> StoreResult<R>
where
    F: FnOnce(&Transaction<'_>) -> StoreResult<R>,
{
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Transaction(format!("begin failed: {}", e)))?;

    match writes(&tx) {
        Ok(value) => {
            tx.commit()
                .map_err(|e| StoreError::Transaction(format!("commit failed: {}", e)))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback() {
                warn!(error = %err, rollback_error = %rollback, "Rollback failed");
                return Err(StoreError::Transaction(format!(
                    "rollback failed: {} (after: {})",
                    rollback, err
                )));
            }
            Err(err)
        }
    }
}
