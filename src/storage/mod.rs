//! SQLite storage layer for the mirror.
//!
//! This module provides the relational target:
//! - One table per mirrored application (`<workspace>__<app>`)
//! - Transaction discipline: each row replacement commits on its own
//! - Bookkeeping events for table and row changes
//!
//! # Submodules
//!
//! - [`events`] - Bookkeeping event storage
//! - [`schema`] - Bookkeeping schema and connection pragmas
//! - [`target`] - Mirrored tables: catalog, DDL and row replacement

pub mod events;
pub mod schema;
pub mod target;

pub use events::{Event, EventType};
pub use target::{
    quote_ident, MirrorRow, RowWrite, TableSummary, TargetStore, CREATED_ON_COLUMN,
    EVENT_RETENTION, FIXED_COLUMNS, ID_COLUMN, LAST_EVENT_ON_COLUMN,
};
