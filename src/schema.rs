//! Table definitions for the three store variants, plus table diagnostics.

use crate::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

/// Column holding the primary key of identifiable records
pub const KEY_COLUMN: &str = "id";
/// Column holding binary payloads
pub const BLOB_COLUMN: &str = "data";
/// Column holding JSON document payloads
pub const JSON_COLUMN: &str = "json";

/// Which store variant a table backs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Unique-constrained binary payload
    Blob,
    /// One JSON document per row, queryable by field path
    Json,
    /// Text primary key plus binary payload
    Identifiable,
}

impl TableKind {
    /// Suffix appended to the collection name to form the default file name
    pub fn file_suffix(&self) -> &'static str {
        match self {
            TableKind::Blob => "-store.sql",
            TableKind::Json => "-json-store.sql",
            TableKind::Identifiable => "-identifiable-store.sql",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Blob,
}

impl DataType {
    fn as_sql(&self) -> &'static str {
        match self {
            DataType::Text => "TEXT",
            DataType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnConstraint {
    PrimaryKey,
    Unique,
}

impl ColumnConstraint {
    fn as_sql(&self) -> &'static str {
        match self {
            ColumnConstraint::PrimaryKey => "PRIMARY KEY",
            ColumnConstraint::Unique => "UNIQUE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    fn as_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.data_type.as_sql());
        for constraint in &self.constraints {
            sql.push(' ');
            sql.push_str(constraint.as_sql());
        }
        sql
    }
}

/// A store table. The name is developer-supplied and used verbatim in SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Table layout for the given store variant
    pub fn for_kind(name: &str, kind: TableKind) -> Self {
        let columns = match kind {
            TableKind::Blob => vec![ColumnDefinition::new(BLOB_COLUMN, DataType::Blob)
                .with_constraint(ColumnConstraint::Unique)],
            TableKind::Json => vec![ColumnDefinition::new(JSON_COLUMN, DataType::Text)],
            TableKind::Identifiable => vec![
                ColumnDefinition::new(KEY_COLUMN, DataType::Text)
                    .with_constraint(ColumnConstraint::PrimaryKey),
                ColumnDefinition::new(BLOB_COLUMN, DataType::Blob),
            ],
        };
        Self {
            name: name.to_string(),
            kind,
            columns,
        }
    }

    pub fn create_statement(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDefinition::as_sql).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            columns.join(", ")
        )
    }

    /// Create the table if absent. Returns true when it did not exist before.
    pub fn create_if_absent(&self, conn: &Connection) -> StoreResult<bool> {
        let existed = table_exists(conn, &self.name).map_err(|source| StoreError::Schema {
            table: self.name.clone(),
            source,
        })?;
        conn.execute_batch(&self.create_statement())
            .map_err(|source| StoreError::Schema {
                table: self.name.clone(),
                source,
            })?;
        debug!(table = %self.name, kind = ?self.kind, created = !existed, "Table ready");
        Ok(!existed)
    }
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Snapshot of a store table's shape and size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiagnostics {
    pub table: String,
    pub exists: bool,
    pub columns: Vec<ColumnInfo>,
    pub record_count: u64,
}

/// Inspect a table's columns and row count.
pub fn diagnose(conn: &Connection, table: &str) -> StoreResult<TableDiagnostics> {
    if !table_exists(conn, table)? {
        return Ok(TableDiagnostics {
            table: table.to_string(),
            exists: false,
            columns: Vec::new(),
            record_count: 0,
        });
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get("name")?,
                data_type: row.get("type")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;

    let diagnostics = TableDiagnostics {
        table: table.to_string(),
        exists: true,
        columns,
        record_count: count.max(0) as u64,
    };
    debug!(?diagnostics, "Diagnosed table");
    Ok(diagnostics)
}
