//! Mirrored tables.
//!
//! `TargetStore` owns one SQLite connection for the duration of a sync pass.
//! Table-level DDL is whole-table only (create or drop, never alter), and
//! every row write replaces the full row inside its own transaction.
//!
//! Identifiers come from remote labels, so they are always quoted with
//! [`quote_ident`]; values are always bound as parameters.

use crate::error::{Error, Result};
use crate::storage::events::{insert_event, prune_events, recent_events, Event, EventType};
use crate::storage::schema::{apply_schema, BOOKKEEPING_PREFIX};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::trace;

/// Primary key column (remote item id as text).
pub const ID_COLUMN: &str = "id";
/// Remote creation timestamp.
pub const CREATED_ON_COLUMN: &str = "created_on";
/// Remote last-modification timestamp, used for change detection.
pub const LAST_EVENT_ON_COLUMN: &str = "last_event_on";
/// Leading columns present in every mirrored table, in order.
pub const FIXED_COLUMNS: [&str; 3] = [ID_COLUMN, CREATED_ON_COLUMN, LAST_EVENT_ON_COLUMN];

/// Bookkeeping events kept by [`TargetStore::prune_events`].
pub const EVENT_RETENTION: u32 = 10_000;

/// Quote an SQL identifier (`"` doubled).
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One full row of a mirrored table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow {
    pub id: String,
    pub created_on: String,
    pub last_event_on: String,
    /// Values for the data columns, in column order.
    pub values: Vec<String>,
}

/// What a row replacement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowWrite {
    /// No previous row existed.
    Inserted,
    /// A previous row was deleted first.
    Replaced,
}

/// Row count and freshness of one mirrored table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    pub newest_event: Option<String>,
}

/// Side effects collected while a mutation runs.
///
/// Events are written after the mutation closure succeeds and before the
/// transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// SQLite-backed relational target.
#[derive(Debug)]
pub struct TargetStore {
    conn: Connection,
}

impl TargetStore {
    /// Open (or create) the mirror database at `path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open with an optional busy timeout (default 5 seconds).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout_ms.map_or(Duration::from_secs(5), Duration::from_millis))?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an existing database without creating it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseMissing` if there is no file at `path`.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::DatabaseMissing {
                path: path.to_path_buf(),
            });
        }
        Self::open(path)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation inside an IMMEDIATE transaction.
    ///
    /// Events recorded on the context are written before commit; any error
    /// rolls back the whole mutation, events included.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op);
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        trace!(op = %ctx.op_name, events = ctx.events.len(), "Mutation committed");
        Ok(result)
    }

    // ==================
    // Catalog
    // ==================

    /// Names of all mirrored tables (bookkeeping and SQLite internals excluded).
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub fn list_tables(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table'
               AND substr(name, 1, 7) != 'sqlite_'
               AND substr(name, 1, ?1) != ?2",
        )?;
        #[allow(clippy::cast_possible_wrap)]
        let prefix_len = BOOKKEEPING_PREFIX.len() as i64;
        let names = stmt
            .query_map(rusqlite::params![prefix_len, BOOKKEEPING_PREFIX], |row| {
                row.get(0)
            })?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(names)
    }

    /// Column names of a table, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma query fails.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([table], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(columns)
    }

    // ==================
    // DDL
    // ==================

    /// Create a mirrored table with the fixed columns followed by `columns`
    /// (all TEXT).
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails (e.g. duplicate column names).
    pub fn create_table(&mut self, table: &str, columns: &[String]) -> Result<()> {
        let mut definitions = vec![
            format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident(ID_COLUMN)),
            format!("{} TIMESTAMP", quote_ident(CREATED_ON_COLUMN)),
            format!("{} TIMESTAMP", quote_ident(LAST_EVENT_ON_COLUMN)),
        ];
        definitions.extend(columns.iter().map(|c| format!("{} TEXT", quote_ident(c))));

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            definitions.join(", ")
        );

        self.mutate("create_table", |tx, ctx| {
            tx.execute_batch(&sql)?;
            ctx.record(
                Event::new(table, EventType::TableCreated)
                    .with_detail(&format!("{} data columns", columns.len())),
            );
            Ok(())
        })
    }

    /// Drop a mirrored table, recording why.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn drop_table(&mut self, table: &str, reason: EventType, detail: Option<&str>) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));

        self.mutate("drop_table", |tx, ctx| {
            tx.execute_batch(&sql)?;
            let mut event = Event::new(table, reason);
            if let Some(detail) = detail {
                event = event.with_detail(detail);
            }
            ctx.record(event);
            Ok(())
        })
    }

    // ==================
    // Rows
    // ==================

    /// Stored `last_event_on` for an item, if a row exists.
    ///
    /// A row whose timestamp is NULL yields `Some(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_event_on(&self, table: &str, id: &str) -> Result<Option<Option<String>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            quote_ident(LAST_EVENT_ON_COLUMN),
            quote_ident(table),
            quote_ident(ID_COLUMN)
        );
        let stored = self
            .conn
            .query_row(&sql, [id], |row| row.get::<_, Option<String>>(0))
            .optional()?;
        Ok(stored)
    }

    /// Delete any existing row for `row.id` and insert the full row, in one
    /// transaction that commits before returning.
    ///
    /// If the insert fails the delete is rolled back with it.
    ///
    /// # Errors
    ///
    /// Returns `InsertRejected` when the table refuses the row, which means
    /// it no longer has the columns being written. Any other failure
    /// (locking, the delete) is returned as a plain database error.
    pub fn replace_row(&mut self, table: &str, columns: &[String], row: &MirrorRow) -> Result<RowWrite> {
        if row.values.len() != columns.len() {
            return Err(Error::Other(format!(
                "row for {} has {} values for {} columns",
                row.id,
                row.values.len(),
                columns.len()
            )));
        }

        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(ID_COLUMN)
        );

        let column_list = FIXED_COLUMNS
            .iter()
            .copied()
            .chain(columns.iter().map(String::as_str))
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=FIXED_COLUMNS.len() + columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_ident(table)
        );

        self.mutate("replace_row", |tx, ctx| {
            let deleted = tx.execute(&delete_sql, [&row.id])?;

            let params = [&row.id, &row.created_on, &row.last_event_on]
                .into_iter()
                .chain(row.values.iter());
            tx.execute(&insert_sql, rusqlite::params_from_iter(params))
                .map_err(|source| Error::InsertRejected {
                    table: table.to_string(),
                    source,
                })?;

            let (write, event_type) = if deleted > 0 {
                (RowWrite::Replaced, EventType::ItemReplaced)
            } else {
                (RowWrite::Inserted, EventType::ItemInserted)
            };
            ctx.record(Event::new(table, event_type).with_entity(&row.id));
            Ok(write)
        })
    }

    /// Number of rows in a mirrored table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Row counts and newest `last_event_on` for every mirrored table.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn summaries(&self) -> Result<Vec<TableSummary>> {
        self.list_tables()?
            .into_iter()
            .map(|name| {
                let sql = format!(
                    "SELECT COUNT(*), MAX({}) FROM {}",
                    quote_ident(LAST_EVENT_ON_COLUMN),
                    quote_ident(&name)
                );
                let (rows, newest_event): (i64, Option<String>) = self
                    .conn
                    .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
                Ok(TableSummary {
                    name,
                    rows: u64::try_from(rows).unwrap_or(0),
                    newest_event,
                })
            })
            .collect()
    }

    /// Trim the bookkeeping events to the newest `keep`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn prune_events(&self, keep: u32) -> Result<usize> {
        Ok(prune_events(&self.conn, keep)?)
    }

    /// Most recent bookkeeping events.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_events(&self, table: Option<&str>, limit: Option<u32>) -> Result<Vec<Event>> {
        Ok(recent_events(&self.conn, table, limit)?)
    }
}
