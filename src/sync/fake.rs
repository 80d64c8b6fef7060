//! In-memory remote source for sync tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde_json::{json, Value};

use crate::remote::{
    parse_podio_datetime, Connector, FieldType, ItemPage, ItemQuery, LifecycleStatus,
    RemoteApplication, RemoteField, RemoteItem, RemoteItemField, RemoteResult, RemoteSource,
    RemoteSpace, TransportError,
};

/// Remote operation, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Application,
    Space,
    Count,
    Filter,
}

#[derive(Default)]
pub struct FakeSource {
    apps: Mutex<HashMap<i64, RemoteApplication>>,
    spaces: Mutex<HashMap<i64, RemoteSpace>>,
    items: Mutex<HashMap<i64, Vec<RemoteItem>>>,
    failures: Mutex<Vec<(Op, i64, usize, TransportError)>>,
    queries: Mutex<Vec<(i64, ItemQuery)>>,
    calls: Mutex<HashMap<Op, usize>>,
}

pub fn ts(raw: &str) -> NaiveDateTime {
    parse_podio_datetime(raw).unwrap()
}

/// Item with plain text fields.
pub fn item(item_id: i64, created_on: &str, last_event_on: &str, fields: &[(&str, &str)]) -> RemoteItem {
    RemoteItem {
        item_id,
        created_on: ts(created_on),
        last_event_on: ts(last_event_on),
        fields: fields
            .iter()
            .map(|(external_id, value)| RemoteItemField {
                external_id: (*external_id).to_string(),
                field_type: FieldType::Plain("text".to_string()),
                values: vec![json!({ "value": value })],
            })
            .collect(),
    }
}

/// `count` items created one second apart, all with the same event time.
pub fn numbered_items(count: i64) -> Vec<RemoteItem> {
    let base = ts("2023-01-01 00:00:00");
    (1..=count)
        .map(|id| RemoteItem {
            item_id: id,
            created_on: base + chrono::Duration::seconds(id),
            last_event_on: ts("2023-06-01 00:00:00"),
            fields: Vec::new(),
        })
        .collect()
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application with plain text fields, in workspace `space_id`.
    pub fn add_app(
        &self,
        app_id: i64,
        space_id: i64,
        space_label: &str,
        app_label: &str,
        active: bool,
        fields: &[&str],
    ) {
        let fields = fields
            .iter()
            .map(|external_id| RemoteField {
                external_id: (*external_id).to_string(),
                field_type: FieldType::Plain("text".to_string()),
                status: LifecycleStatus::Active,
            })
            .collect();
        self.apps.lock().unwrap().insert(
            app_id,
            RemoteApplication {
                app_id,
                space_id,
                status: if active {
                    LifecycleStatus::Active
                } else {
                    LifecycleStatus::Inactive
                },
                url_label: app_label.to_string(),
                fields,
            },
        );
        self.spaces.lock().unwrap().insert(
            space_id,
            RemoteSpace {
                space_id,
                url_label: space_label.to_string(),
            },
        );
    }

    pub fn set_active(&self, app_id: i64, active: bool) {
        if let Some(app) = self.apps.lock().unwrap().get_mut(&app_id) {
            app.status = if active {
                LifecycleStatus::Active
            } else {
                LifecycleStatus::Inactive
            };
        }
    }

    /// Append an active plain field to an application.
    pub fn add_field(&self, app_id: i64, external_id: &str) {
        if let Some(app) = self.apps.lock().unwrap().get_mut(&app_id) {
            app.fields.push(RemoteField {
                external_id: external_id.to_string(),
                field_type: FieldType::Plain("text".to_string()),
                status: LifecycleStatus::Active,
            });
        }
    }

    pub fn set_items(&self, app_id: i64, items: Vec<RemoteItem>) {
        self.items.lock().unwrap().insert(app_id, items);
    }

    /// Fail the next call of `op` for `id` (app id, or space id for `Op::Space`).
    pub fn fail_next(&self, op: Op, id: i64, err: TransportError) {
        self.fail_after(op, id, 0, err);
    }

    /// Let `successes` calls of `op` for `id` through, then fail one.
    pub fn fail_after(&self, op: Op, id: i64, successes: usize, err: TransportError) {
        self.failures.lock().unwrap().push((op, id, successes, err));
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn filter_queries(&self, app_id: i64) -> Vec<ItemQuery> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == app_id)
            .map(|(_, q)| q.clone())
            .collect()
    }

    fn enter(&self, op: Op, id: i64) -> RemoteResult<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;

        let mut failures = self.failures.lock().unwrap();
        let Some(index) = failures.iter().position(|(o, i, _, _)| *o == op && *i == id) else {
            return Ok(());
        };
        if failures[index].2 > 0 {
            failures[index].2 -= 1;
            return Ok(());
        }
        Err(failures.remove(index).3)
    }
}

fn not_found(what: &str, id: i64) -> TransportError {
    TransportError::http(404, None, &format!(r#"{{"error":"not_found","error_description":"{what} {id}"}}"#))
}

impl RemoteSource for FakeSource {
    async fn get_application(&self, app_id: i64) -> RemoteResult<RemoteApplication> {
        self.enter(Op::Application, app_id)?;
        self.apps
            .lock()
            .unwrap()
            .get(&app_id)
            .cloned()
            .ok_or_else(|| not_found("app", app_id))
    }

    async fn get_space(&self, space_id: i64) -> RemoteResult<RemoteSpace> {
        self.enter(Op::Space, space_id)?;
        self.spaces
            .lock()
            .unwrap()
            .get(&space_id)
            .cloned()
            .ok_or_else(|| not_found("space", space_id))
    }

    async fn count_items(&self, app_id: i64) -> RemoteResult<u64> {
        self.enter(Op::Count, app_id)?;
        let items = self.items.lock().unwrap();
        Ok(items.get(&app_id).map_or(0, |v| v.len() as u64))
    }

    async fn filter_items(&self, app_id: i64, query: &ItemQuery) -> RemoteResult<ItemPage> {
        self.enter(Op::Filter, app_id)?;
        self.queries.lock().unwrap().push((app_id, query.clone()));

        let mut items = self
            .items
            .lock()
            .unwrap()
            .get(&app_id)
            .cloned()
            .unwrap_or_default();
        items.sort_by_key(|i| i.created_on);
        if query.sort_desc {
            items.reverse();
        }

        let total = items.len() as u64;
        let page: Vec<RemoteItem> = items
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap())
            .take(query.limit as usize)
            .collect();

        Ok(ItemPage {
            total,
            filtered: total,
            items: page,
        })
    }
}

impl RemoteSource for Arc<FakeSource> {
    async fn get_application(&self, app_id: i64) -> RemoteResult<RemoteApplication> {
        self.as_ref().get_application(app_id).await
    }

    async fn get_space(&self, space_id: i64) -> RemoteResult<RemoteSpace> {
        self.as_ref().get_space(space_id).await
    }

    async fn count_items(&self, app_id: i64) -> RemoteResult<u64> {
        self.as_ref().count_items(app_id).await
    }

    async fn filter_items(&self, app_id: i64, query: &ItemQuery) -> RemoteResult<ItemPage> {
        self.as_ref().filter_items(app_id, query).await
    }
}

/// Connector handing out the same shared [`FakeSource`].
pub struct FakeConnector {
    pub source: Arc<FakeSource>,
    failures: Mutex<Vec<TransportError>>,
    connects: AtomicUsize,
    connected_at: Mutex<Vec<tokio::time::Instant>>,
}

impl FakeConnector {
    pub fn new(source: Arc<FakeSource>) -> Self {
        Self {
            source,
            failures: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            connected_at: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `connect` (queued in order).
    pub fn fail_next(&self, err: TransportError) {
        self.failures.lock().unwrap().push(err);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// When each `connect` call happened, on the tokio clock.
    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.connected_at.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    type Source = Arc<FakeSource>;

    async fn connect(&self) -> RemoteResult<Arc<FakeSource>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected_at.lock().unwrap().push(tokio::time::Instant::now());
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            Ok(Arc::clone(&self.source))
        } else {
            Err(failures.remove(0))
        }
    }
}

/// Podio-style error body with an `error_detail`.
pub fn error_body(detail: &str) -> String {
    let body: Value = json!({ "error": "invalid_grant", "error_detail": detail });
    body.to_string()
}
