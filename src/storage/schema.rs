//! Bookkeeping schema.
//!
//! Mirrored tables are created on demand by [`super::target::TargetStore`];
//! this module only owns the tables the mirror keeps for itself. Their names
//! start with [`BOOKKEEPING_PREFIX`] and are hidden from the catalog.

use rusqlite::{Connection, Result};

/// Prefix reserved for tables the mirror owns itself.
pub const BOOKKEEPING_PREFIX: &str = "_mirror_";

/// Bookkeeping DDL. Timestamps are INTEGER Unix milliseconds.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS _mirror_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    entity_id TEXT,
    event_type TEXT NOT NULL,
    detail TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mirror_events_table ON _mirror_events(table_name, created_at);
CREATE INDEX IF NOT EXISTS idx_mirror_events_created ON _mirror_events(created_at);
";

/// Apply pragmas and the bookkeeping schema.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)
}
