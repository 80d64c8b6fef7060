//! Podio → SQLite synchronization.
//!
//! A cycle is two passes over the configured applications:
//!
//! - **Schema pass** ([`SchemaSynchronizer`]): create the table of every
//!   active application that has none, drop the table of every inactive one
//! - **Item pass** ([`ItemSyncEngine`]): page through items oldest first and
//!   rewrite rows whose remote `last_event_on` is strictly newer
//!
//! The [`Scheduler`] runs cycles forever and picks the pause before the next
//! one from the two [`PassReport`]s.
//!
//! # Example
//!
//! ```ignore
//! use podio_mirror::remote::PodioConnector;
//! use podio_mirror::sync::Scheduler;
//!
//! let connector = PodioConnector::new(&config.endpoint, config.credentials.clone(), config.request_timeout)?;
//! let mut scheduler = Scheduler::new(connector, &config);
//! let report = scheduler.run_once().await?;
//! ```

mod codec;
mod items;
mod naming;
mod scheduler;
mod schema;
mod types;

#[cfg(test)]
mod fake;

pub use codec::{encode, MULTI_VALUE_SEPARATOR};
pub use items::{is_newer, page_count, ItemSyncEngine};
pub use naming::{normalize_label, table_name, Column, ColumnModel, TableClaims, MAX_COLUMN_LEN};
pub use scheduler::{
    decide, CycleReport, Decision, Scheduler, State, RATE_LIMIT_BACKOFF, RETRY_PAUSE,
};
pub use schema::{describe_application, SchemaAction, SchemaSynchronizer};
pub use types::{ApplicationReport, Halt, ItemStats, Outcome, PassReport};
