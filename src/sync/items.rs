//! Item synchronization.
//!
//! Pages through every item of an application, oldest first, and rewrites a
//! row when the remote item is strictly newer than what is stored. Each row
//! is committed before the next item is looked at, so an interrupted pass
//! resumes cleanly: the newer-than check is idempotent.
//!
//! A table whose columns no longer match the application's active fields
//! is dropped (structural drift) and recreated by the next schema pass.

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::remote::{
    classify, format_podio_datetime, parse_podio_datetime, ItemQuery, RemoteFailure,
    RemoteItem, RemoteSource, PAGE_SIZE,
};
use crate::storage::{EventType, MirrorRow, RowWrite, TargetStore, FIXED_COLUMNS};

use super::naming::{ColumnModel, TableClaims};
use super::schema::describe_application;
use super::types::{ApplicationReport, Halt, ItemStats, Outcome, PassReport};

/// Number of pages needed for `count` items.
#[must_use]
pub fn page_count(count: u64) -> u64 {
    count.div_ceil(u64::from(PAGE_SIZE))
}

/// Whether a remote item should overwrite the stored row.
///
/// A missing or unparseable stored timestamp counts as stale.
#[must_use]
pub fn is_newer(remote: &NaiveDateTime, stored: Option<&str>) -> bool {
    stored
        .and_then(parse_podio_datetime)
        .is_none_or(|stored| *remote > stored)
}

/// Why one application's item sync stopped.
enum Stop {
    Remote(RemoteFailure),
    Drift(String),
    Storage(crate::Error),
}

/// Mirrors items into tables created by the schema pass.
pub struct ItemSyncEngine<'a, S: RemoteSource> {
    source: &'a S,
    store: &'a mut TargetStore,
    claims: TableClaims,
}

impl<'a, S: RemoteSource> ItemSyncEngine<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, store: &'a mut TargetStore) -> Self {
        Self {
            source,
            store,
            claims: TableClaims::default(),
        }
    }

    /// Run one item pass over `app_ids`, in order.
    ///
    /// Any remote failure stops the pass: a rate limit asks for a later
    /// retry, everything else aborts the cycle. Structural drift and storage
    /// errors only affect their own application.
    pub async fn sync_all(&mut self, app_ids: &[i64]) -> PassReport {
        let mut report = PassReport::default();

        for &app_id in app_ids {
            let (app_report, halt) = self.sync_application(app_id).await;
            report.applications.push(app_report);

            if halt.is_some() {
                report.halt = halt;
                break;
            }
        }

        report
    }

    /// Mirror the items of one application.
    ///
    /// Returns the application report and, for remote failures, how the
    /// pass should stop.
    pub async fn sync_application(&mut self, app_id: i64) -> (ApplicationReport, Option<Halt>) {
        let (app, table) = match describe_application(self.source, app_id).await {
            Ok(found) => found,
            Err(err) => {
                let failure = classify(&err);
                warn!(app_id, %failure, error = %err, "Item pass interrupted");
                let halt = halt_for(&failure);
                return (
                    ApplicationReport::new(app_id, None, Outcome::from_failure(&failure)),
                    Some(halt),
                );
            }
        };

        let mut report = ApplicationReport::new(app_id, Some(table.clone()), Outcome::Ok);

        if let Err(owner) = self.claims.claim(&table, app_id) {
            warn!(app_id, owner, table = %table, "Table name already used by another application");
            report.outcome = Outcome::TransientSkip;
            return (report, None);
        }

        match self.store.list_tables() {
            Ok(tables) if tables.contains(&table) => {}
            Ok(_) => {
                debug!(app_id, table = %table, "No table yet, skipping items");
                report.outcome = Outcome::TransientSkip;
                return (report, None);
            }
            Err(err) => {
                error!(app_id, table = %table, error = %err, "Catalog lookup failed");
                report.outcome = Outcome::StorageError;
                return (report, None);
            }
        }

        let model = ColumnModel::from_fields(app.active_fields());
        let result = match self.check_columns(&table, &model) {
            Ok(()) => self.mirror_items(app_id, &table, &model, &mut report.stats).await,
            Err(stop) => Err(stop),
        };
        let stats = report.stats;

        match result {
            Ok(()) => {
                info!(
                    app_id,
                    table = %table,
                    fetched = stats.fetched,
                    inserted = stats.inserted,
                    replaced = stats.replaced,
                    unchanged = stats.unchanged,
                    "Items synchronized"
                );
                (report, None)
            }
            Err(Stop::Remote(failure)) => {
                warn!(app_id, table = %table, %failure, pages = stats.pages, "Item pass interrupted");
                report.outcome = Outcome::from_failure(&failure);
                (report, Some(halt_for(&failure)))
            }
            Err(Stop::Drift(detail)) => {
                warn!(app_id, table = %table, %detail, "Table out of date, dropping it");
                match self
                    .store
                    .drop_table(&table, EventType::StructuralDrift, Some(&detail))
                {
                    Ok(()) => report.outcome = Outcome::StructuralDrift,
                    Err(drop_err) => {
                        error!(app_id, table = %table, error = %drop_err, "Could not drop drifted table");
                        report.outcome = Outcome::StorageError;
                    }
                }
                (report, None)
            }
            Err(Stop::Storage(err)) => {
                error!(app_id, table = %table, error = %err, "Storage error, skipping application");
                report.outcome = Outcome::StorageError;
                (report, None)
            }
        }
    }

    /// Compare the table's columns with the ones the model writes.
    fn check_columns(&self, table: &str, model: &ColumnModel) -> std::result::Result<(), Stop> {
        let actual = self.store.table_columns(table).map_err(Stop::Storage)?;
        let expected: Vec<String> = FIXED_COLUMNS
            .iter()
            .map(|c| (*c).to_string())
            .chain(model.names())
            .collect();

        if actual == expected {
            return Ok(());
        }
        Err(Stop::Drift(format!(
            "table has columns [{}], application needs [{}]",
            actual.join(", "),
            expected.join(", ")
        )))
    }

    async fn mirror_items(
        &mut self,
        app_id: i64,
        table: &str,
        model: &ColumnModel,
        stats: &mut ItemStats,
    ) -> std::result::Result<(), Stop> {
        let remote_error = |err| Stop::Remote(classify(&err));

        let count = self.source.count_items(app_id).await.map_err(remote_error)?;
        let pages = page_count(count);
        debug!(app_id, count, pages, "Paging items");

        let columns = model.names();
        for page in 0..pages {
            let query = ItemQuery::page(page * u64::from(PAGE_SIZE));
            let batch = self
                .source
                .filter_items(app_id, &query)
                .await
                .map_err(remote_error)?;
            stats.pages += 1;
            stats.fetched += batch.items.len() as u64;

            for item in &batch.items {
                self.apply_item(table, &columns, model, item, stats)?;
            }
        }

        Ok(())
    }

    fn apply_item(
        &mut self,
        table: &str,
        columns: &[String],
        model: &ColumnModel,
        item: &RemoteItem,
        stats: &mut ItemStats,
    ) -> std::result::Result<(), Stop> {
        let id = item.item_id.to_string();
        let stored = self.store.last_event_on(table, &id).map_err(Stop::Storage)?;

        if let Some(stored) = &stored {
            if !is_newer(&item.last_event_on, stored.as_deref()) {
                stats.unchanged += 1;
                return Ok(());
            }
        }

        let row = MirrorRow {
            id,
            created_on: format_podio_datetime(&item.created_on),
            last_event_on: format_podio_datetime(&item.last_event_on),
            values: model.row_values(item),
        };

        let write = self.store.replace_row(table, columns, &row).map_err(|err| {
            if matches!(err, crate::Error::InsertRejected { .. }) {
                Stop::Drift(err.to_string())
            } else {
                Stop::Storage(err)
            }
        })?;
        match write {
            RowWrite::Inserted => stats.inserted += 1,
            RowWrite::Replaced => stats.replaced += 1,
        }
        debug!(item_id = item.item_id, table, "Row written");
        Ok(())
    }
}

fn halt_for(failure: &RemoteFailure) -> Halt {
    match failure {
        RemoteFailure::RateLimit => Halt::RetryLater,
        _ => Halt::AbortCycle,
    }
}
