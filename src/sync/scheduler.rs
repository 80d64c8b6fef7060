//! Polling scheduler.
//!
//! Drives cycles of schema pass then item pass over the configured
//! applications, forever. Each pass opens its own database connection.
//! Backoff timing is decided by [`decide`] from the pass reports alone:
//!
//! | Result                              | Pause           |
//! |-------------------------------------|-----------------|
//! | Both passes completed               | sync interval   |
//! | Rate limit in either pass           | one hour        |
//! | Anything else that stopped a pass   | one second      |
//!
//! Every pause is followed by a fresh authentication. The only way out of
//! the loop is credentials rejected by the very first authentication.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::MirrorConfig;
use crate::error::{Error, Result};
use crate::remote::{classify, Connector, RemoteFailure, TransportError};
use crate::storage::{TargetStore, EVENT_RETENTION};

use super::items::ItemSyncEngine;
use super::schema::SchemaSynchronizer;
use super::types::{Halt, PassReport};

/// Pause after a rate limit.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Pause before re-authenticating after any other failure.
pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Authenticating,
    SyncingSchema,
    SyncingItems,
    BackoffSleep,
    Terminated,
}

/// What to do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Everything ran: wait for the regular interval.
    Steady,
    /// Quota exhausted: wait an hour.
    RateLimited,
    /// Re-authenticate and retry almost immediately.
    Retry,
}

impl Decision {
    /// How long to sleep before the next authentication.
    #[must_use]
    pub const fn pause(self, interval: Duration) -> Duration {
        match self {
            Self::Steady => interval,
            Self::RateLimited => RATE_LIMIT_BACKOFF,
            Self::Retry => RETRY_PAUSE,
        }
    }

    /// Decision after a failed authentication.
    #[must_use]
    pub const fn after_auth_failure(failure: &RemoteFailure) -> Self {
        match failure {
            RemoteFailure::RateLimit => Self::RateLimited,
            _ => Self::Retry,
        }
    }
}

/// Decide the next step from a cycle's reports.
///
/// `items` is `None` when the schema pass stopped early and the item pass
/// never ran.
#[must_use]
pub fn decide(schema: &PassReport, items: Option<&PassReport>) -> Decision {
    let halt = match (schema.halt, items) {
        (Some(halt), _) => Some(halt),
        (None, Some(items)) => items.halt,
        (None, None) => return Decision::Retry,
    };

    match halt {
        None => Decision::Steady,
        Some(Halt::RetryLater) => Decision::RateLimited,
        Some(Halt::Reauth | Halt::AbortCycle | Halt::StorageUnavailable) => Decision::Retry,
    }
}

/// Reports of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub schema: PassReport,
    /// `None` when the schema pass stopped early.
    pub items: Option<PassReport>,
    pub decision: Decision,
}

/// Long-running mirror loop.
pub struct Scheduler<C: Connector> {
    connector: C,
    app_ids: Vec<i64>,
    db_path: PathBuf,
    interval: Duration,
    state: State,
    cycle: u64,
}

impl<C: Connector> Scheduler<C> {
    #[must_use]
    pub fn new(connector: C, config: &MirrorConfig) -> Self {
        Self {
            connector,
            app_ids: config.app_ids.clone(),
            db_path: config.db_path.clone(),
            interval: config.interval,
            state: State::Authenticating,
            cycle: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Run cycles until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns `StartupAuth` when the first authentication is rejected as a
    /// bad request. Nothing else ends the loop.
    pub async fn run(&mut self) -> Result<()> {
        let mut source = self.authenticate(true).await?;

        loop {
            let report = self.run_cycle(&source).await;
            let pause = report.decision.pause(self.interval);

            self.state = State::BackoffSleep;
            info!(
                cycle = report.cycle,
                decision = ?report.decision,
                pause_secs = pause.as_secs(),
                "Cycle finished, sleeping"
            );
            tokio::time::sleep(pause).await;

            source = self.authenticate(false).await?;
        }
    }

    /// Authenticate and run exactly one cycle.
    ///
    /// # Errors
    ///
    /// Returns `StartupAuth` for rejected credentials and `Remote` for any
    /// other authentication failure.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        self.state = State::Authenticating;
        let source = match self.connector.connect().await {
            Ok(source) => source,
            Err(err) => return Err(self.fail_startup(err)),
        };
        Ok(self.run_cycle(&source).await)
    }

    /// Run schema then item pass with an authenticated source.
    pub async fn run_cycle(&mut self, source: &C::Source) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;

        async {
            info!(apps = self.app_ids.len(), "Cycle started");

            self.state = State::SyncingSchema;
            let schema = match TargetStore::open(&self.db_path) {
                Ok(mut store) => {
                    prune_events(&store);
                    SchemaSynchronizer::new(source, &mut store)
                        .sync_all(&self.app_ids)
                        .await
                }
                Err(err) => storage_unavailable(&self.db_path, &err),
            };

            let items = if schema.completed() {
                self.state = State::SyncingItems;
                let report = match TargetStore::open(&self.db_path) {
                    Ok(mut store) => {
                        ItemSyncEngine::new(source, &mut store)
                            .sync_all(&self.app_ids)
                            .await
                    }
                    Err(err) => storage_unavailable(&self.db_path, &err),
                };
                Some(report)
            } else {
                warn!(halt = ?schema.halt, "Schema pass stopped early, skipping items");
                None
            };

            let decision = decide(&schema, items.as_ref());
            CycleReport {
                cycle,
                schema,
                items,
                decision,
            }
        }
        .instrument(info_span!("cycle", cycle))
        .await
    }

    /// Authenticate, retrying until it works.
    ///
    /// A bad request on the very first attempt of the process means the
    /// credentials are wrong; that is returned instead of retried.
    async fn authenticate(&mut self, startup: bool) -> Result<C::Source> {
        let mut first_attempt = startup;
        loop {
            self.state = State::Authenticating;
            let err = match self.connector.connect().await {
                Ok(source) => return Ok(source),
                Err(err) => err,
            };

            let failure = classify(&err);
            if first_attempt && matches!(failure, RemoteFailure::BadRequest(_)) {
                return Err(self.fail_startup(err));
            }
            first_attempt = false;

            let pause = Decision::after_auth_failure(&failure).pause(self.interval);
            warn!(%failure, error = %err, pause_secs = pause.as_secs(), "Authentication failed, retrying");
            self.state = State::BackoffSleep;
            tokio::time::sleep(pause).await;
        }
    }

    fn fail_startup(&mut self, err: TransportError) -> Error {
        let failure = classify(&err);
        if matches!(failure, RemoteFailure::BadRequest(_)) {
            self.state = State::Terminated;
            error!(%failure, "Startup authentication rejected");
            Error::StartupAuth {
                failure,
                source: err,
            }
        } else {
            Error::Remote {
                failure,
                source: err,
            }
        }
    }
}

fn prune_events(store: &TargetStore) {
    match store.prune_events(EVENT_RETENTION) {
        Ok(0) => {}
        Ok(removed) => debug!(removed, "Pruned bookkeeping events"),
        Err(err) => warn!(error = %err, "Could not prune bookkeeping events"),
    }
}

fn storage_unavailable(path: &std::path::Path, err: &Error) -> PassReport {
    error!(path = %path.display(), error = %err, "Could not open mirror database");
    PassReport::halted(Halt::StorageUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::remote::BadRequestReason;
    use crate::sync::fake::{error_body, item, FakeConnector, FakeSource, Op};
    use crate::sync::types::{ApplicationReport, Outcome};
    use std::sync::Arc;

    fn config(db_path: PathBuf, app_ids: Vec<i64>) -> MirrorConfig {
        MirrorConfig {
            credentials: Credentials {
                client_id: "c".to_string(),
                client_secret: "s".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            },
            app_ids,
            interval: Duration::from_secs(8 * 60 * 60),
            db_path,
            endpoint: "http://localhost".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn pass(halt: Option<Halt>) -> PassReport {
        PassReport {
            applications: vec![ApplicationReport::new(1, None, Outcome::Ok)],
            halt,
        }
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(&pass(None), Some(&pass(None))), Decision::Steady);
        assert_eq!(decide(&pass(Some(Halt::RetryLater)), None), Decision::RateLimited);
        assert_eq!(decide(&pass(Some(Halt::Reauth)), None), Decision::Retry);
        assert_eq!(
            decide(&pass(None), Some(&pass(Some(Halt::RetryLater)))),
            Decision::RateLimited
        );
        assert_eq!(
            decide(&pass(None), Some(&pass(Some(Halt::AbortCycle)))),
            Decision::Retry
        );
        assert_eq!(
            decide(&pass(Some(Halt::StorageUnavailable)), None),
            Decision::Retry
        );
    }

    #[test]
    fn test_partial_success_still_counts_as_steady() {
        let mut schema = pass(None);
        schema
            .applications
            .push(ApplicationReport::new(2, None, Outcome::TransientSkip));
        let mut items = pass(None);
        items
            .applications
            .push(ApplicationReport::new(2, None, Outcome::StructuralDrift));
        assert_eq!(decide(&schema, Some(&items)), Decision::Steady);
    }

    #[test]
    fn test_pauses() {
        let interval = Duration::from_secs(28800);
        assert_eq!(Decision::Steady.pause(interval), interval);
        assert_eq!(Decision::RateLimited.pause(interval), Duration::from_secs(3600));
        assert_eq!(Decision::Retry.pause(interval), Duration::from_secs(1));
        assert_eq!(
            Decision::after_auth_failure(&RemoteFailure::RateLimit),
            Decision::RateLimited
        );
        assert_eq!(
            Decision::after_auth_failure(&RemoteFailure::Timeout),
            Decision::Retry
        );
    }

    #[tokio::test]
    async fn test_run_once_mirrors_items() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mirror.db");
        let source = Arc::new(FakeSource::new());
        source.add_app(1, 10, "sales", "leads", true, &["title"]);
        source.set_items(
            1,
            vec![item(5, "2023-01-01 00:00:00", "2023-01-02 00:00:00", &[("title", "Acme")])],
        );

        let mut scheduler = Scheduler::new(FakeConnector::new(Arc::clone(&source)), &config(db_path.clone(), vec![1]));
        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.cycle, 1);
        assert_eq!(report.decision, Decision::Steady);
        assert_eq!(report.items.as_ref().unwrap().totals().inserted, 1);
        assert_eq!(scheduler.state(), State::SyncingItems);

        // Pass connections are closed; the file is readable afterwards
        let store = TargetStore::open_existing(&db_path).unwrap();
        assert_eq!(store.count_rows("sales__leads").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_schema_rate_limit_skips_item_pass() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        source.add_app(1, 10, "sales", "leads", true, &["title"]);
        source.fail_next(Op::Application, 1, TransportError::http(429, None, "quota"));

        let mut scheduler = Scheduler::new(
            FakeConnector::new(Arc::clone(&source)),
            &config(dir.path().join("mirror.db"), vec![1]),
        );
        let report = scheduler.run_once().await.unwrap();

        assert!(report.items.is_none());
        assert_eq!(report.decision, Decision::RateLimited);
        assert_eq!(source.calls(Op::Count), 0);
    }

    #[tokio::test]
    async fn test_unopenable_database_requests_retry() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the database file should be
        let db_path = dir.path().join("mirror.db");
        std::fs::create_dir(&db_path).unwrap();
        let source = Arc::new(FakeSource::new());
        source.add_app(1, 10, "sales", "leads", true, &["title"]);

        let mut scheduler = Scheduler::new(FakeConnector::new(source), &config(db_path, vec![1]));
        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.schema.halt, Some(Halt::StorageUnavailable));
        assert_eq!(report.decision, Decision::Retry);
    }

    #[tokio::test]
    async fn test_rejected_credentials_terminate_run() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(Arc::new(FakeSource::new()));
        connector.fail_next(TransportError::http(
            400,
            None,
            &error_body("user.invalid.password"),
        ));

        let mut scheduler = Scheduler::new(connector, &config(dir.path().join("m.db"), vec![1]));
        let err = scheduler.run().await.unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert_eq!(scheduler.state(), State::Terminated);
        match err {
            Error::StartupAuth { failure, .. } => assert_eq!(
                failure,
                RemoteFailure::BadRequest(BadRequestReason::InvalidPassword)
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_startup_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(Arc::new(FakeSource::new()));
        connector.fail_next(TransportError::timeout("slow"));
        connector.fail_next(TransportError::http(400, None, &error_body("oauth.client.invalid_id")));

        let mut scheduler = Scheduler::new(connector, &config(dir.path().join("m.db"), vec![]));

        // Only the very first attempt may terminate; a later bad request is
        // retried like any other failure
        let result = scheduler.authenticate(true).await;
        assert!(result.is_ok());
        assert_eq!(scheduler.connector.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sleeps_between_cycles_and_reauthenticates() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        source.add_app(1, 10, "sales", "leads", true, &["title"]);
        source.set_items(
            1,
            vec![item(5, "2023-01-01 00:00:00", "2023-01-02 00:00:00", &[("title", "Acme")])],
        );
        // Cycle 1: schema pass rate limited. Cycle 2: item pass times out.
        source.fail_next(Op::Application, 1, TransportError::http(420, None, "quota"));
        source.fail_next(Op::Count, 1, TransportError::timeout("slow"));

        let db_path = dir.path().join("mirror.db");
        let mut scheduler = Scheduler::new(
            FakeConnector::new(Arc::clone(&source)),
            &config(db_path.clone(), vec![1]),
        );
        let interval = Duration::from_secs(8 * 60 * 60);

        let stopped = tokio::time::timeout(
            RATE_LIMIT_BACKOFF + RETRY_PAUSE + interval + Duration::from_secs(60),
            scheduler.run(),
        )
        .await;
        assert!(stopped.is_err(), "run loop must not return");

        // cycle 3 completes, cycle 4 starts after the interval
        assert_eq!(scheduler.cycle, 4);
        let times = scheduler.connector.connect_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![RATE_LIMIT_BACKOFF, RETRY_PAUSE, interval]);

        let store = TargetStore::open_existing(&db_path).unwrap();
        assert_eq!(store.count_rows("sales__leads").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cycle_prunes_old_events() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mirror.db");
        {
            let store = TargetStore::open(&db_path).unwrap();
            store
                .conn()
                .execute(
                    "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < ?1)
                     INSERT INTO _mirror_events (table_name, entity_id, event_type, created_at)
                     SELECT 'old__table', i, 'item_inserted', 0 FROM n",
                    [EVENT_RETENTION + 5],
                )
                .unwrap();
        }
        let source = Arc::new(FakeSource::new());
        source.add_app(1, 10, "sales", "leads", true, &["title"]);

        let mut scheduler = Scheduler::new(FakeConnector::new(source), &config(db_path.clone(), vec![1]));
        scheduler.run_once().await.unwrap();

        let store = TargetStore::open_existing(&db_path).unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM _mirror_events", [], |r| r.get(0))
            .unwrap();
        // Pruned to the limit, then the new table's creation was recorded
        assert_eq!(count, i64::from(EVENT_RETENTION) + 1);
    }

    #[tokio::test]
    async fn test_run_once_reports_non_credential_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(Arc::new(FakeSource::new()));
        connector.fail_next(TransportError::http(503, None, "maintenance"));

        let mut scheduler = Scheduler::new(connector, &config(dir.path().join("m.db"), vec![1]));
        let err = scheduler.run_once().await.unwrap_err();

        assert!(matches!(err, Error::Remote { failure: RemoteFailure::Unknown, .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
