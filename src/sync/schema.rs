//! Schema synchronization.
//!
//! Reconciles table existence with application status, one application at a
//! time. Tables are only ever created or dropped as a whole: a field added or
//! removed remotely reaches the table when it is next recreated.

use tracing::{debug, error, info, warn};

use crate::remote::{classify, RemoteApplication, RemoteFailure, RemoteResult, RemoteSource};
use crate::storage::{EventType, TargetStore};

use super::naming::{table_name, ColumnModel, TableClaims};
use super::types::{ApplicationReport, Halt, Outcome, PassReport};

/// Fetch an application and the name of its target table.
///
/// # Errors
///
/// Returns the transport failure of the application or workspace lookup.
pub async fn describe_application<S: RemoteSource>(
    source: &S,
    app_id: i64,
) -> RemoteResult<(RemoteApplication, String)> {
    let app = source.get_application(app_id).await?;
    let space = source.get_space(app.space_id).await?;
    let table = table_name(&space.url_label, &app.url_label);
    Ok((app, table))
}

/// What a schema pass did to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    Created,
    Dropped,
    Unchanged,
}

/// Creates tables for active applications and drops them for inactive ones.
pub struct SchemaSynchronizer<'a, S: RemoteSource> {
    source: &'a S,
    store: &'a mut TargetStore,
    claims: TableClaims,
}

impl<'a, S: RemoteSource> SchemaSynchronizer<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, store: &'a mut TargetStore) -> Self {
        Self {
            source,
            store,
            claims: TableClaims::default(),
        }
    }

    /// Run one schema pass over `app_ids`, in order.
    ///
    /// A rate limit or an expired token stops the pass; every other failure
    /// only skips the application it happened on.
    pub async fn sync_all(&mut self, app_ids: &[i64]) -> PassReport {
        let mut report = PassReport::default();

        for &app_id in app_ids {
            let app_report = self.sync_application(app_id).await;
            let halt = match app_report.outcome {
                Outcome::RateLimited => Some(Halt::RetryLater),
                Outcome::AuthExpired => Some(Halt::Reauth),
                _ => None,
            };
            report.applications.push(app_report);

            if halt.is_some() {
                report.halt = halt;
                break;
            }
        }

        report
    }

    /// Reconcile one application's table.
    pub async fn sync_application(&mut self, app_id: i64) -> ApplicationReport {
        let (app, table) = match describe_application(self.source, app_id).await {
            Ok(found) => found,
            Err(err) => {
                let failure = classify(&err);
                match failure {
                    RemoteFailure::RateLimit | RemoteFailure::AuthExpired => {
                        warn!(app_id, %failure, "Schema pass interrupted");
                    }
                    _ => warn!(app_id, %failure, error = %err, "Skipping application"),
                }
                return ApplicationReport::new(app_id, None, Outcome::from_failure(&failure));
            }
        };

        if let Err(owner) = self.claims.claim(&table, app_id) {
            warn!(app_id, owner, table = %table, "Table name already used by another application");
            return ApplicationReport::new(app_id, Some(table), Outcome::TransientSkip);
        }

        let outcome = match self.reconcile(&app, &table) {
            Ok(action) => {
                match action {
                    SchemaAction::Created => info!(app_id, table = %table, "Created table"),
                    SchemaAction::Dropped => info!(app_id, table = %table, "Dropped table of inactive application"),
                    SchemaAction::Unchanged => debug!(app_id, table = %table, "Schema unchanged"),
                }
                Outcome::Ok
            }
            Err(err) => {
                error!(app_id, table = %table, error = %err, "Schema change failed");
                Outcome::StorageError
            }
        };

        ApplicationReport::new(app_id, Some(table), outcome)
    }

    fn reconcile(&mut self, app: &RemoteApplication, table: &str) -> crate::Result<SchemaAction> {
        let exists = self.store.list_tables()?.contains(table);

        match (app.is_active(), exists) {
            (true, false) => {
                let model = ColumnModel::from_fields(app.active_fields());
                self.store.create_table(table, &model.names())?;
                Ok(SchemaAction::Created)
            }
            (false, true) => {
                self.store
                    .drop_table(table, EventType::TableDropped, Some("application inactive"))?;
                Ok(SchemaAction::Dropped)
            }
            _ => Ok(SchemaAction::Unchanged),
        }
    }
}
