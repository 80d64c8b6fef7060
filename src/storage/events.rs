//! Bookkeeping event storage and retrieval.
//!
//! Events record every table and row change the mirror makes, written in the
//! same transaction as the change itself. The scheduler trims them to the
//! newest [`super::EVENT_RETENTION`] at the start of every cycle.

use rusqlite::{Connection, Result};

/// Event types for bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TableCreated,
    TableDropped,
    ItemInserted,
    ItemReplaced,
    StructuralDrift,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TableCreated => "table_created",
            Self::TableDropped => "table_dropped",
            Self::ItemInserted => "item_inserted",
            Self::ItemReplaced => "item_replaced",
            Self::StructuralDrift => "structural_drift",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "table_created" => Some(Self::TableCreated),
            "table_dropped" => Some(Self::TableDropped),
            "item_inserted" => Some(Self::ItemInserted),
            "item_replaced" => Some(Self::ItemReplaced),
            "structural_drift" => Some(Self::StructuralDrift),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookkeeping event record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Event {
    pub id: i64,
    pub table_name: String,
    pub entity_id: Option<String>,
    #[serde(serialize_with = "serialize_event_type")]
    pub event_type: EventType,
    pub detail: Option<String>,
    pub created_at: i64,
}

fn serialize_event_type<S: serde::Serializer>(
    event_type: &EventType,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(event_type.as_str())
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(table_name: &str, event_type: EventType) -> Self {
        Self {
            id: 0,
            table_name: table_name.to_string(),
            entity_id: None,
            event_type,
            detail: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach the affected item id.
    #[must_use]
    pub fn with_entity(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    /// Attach a free-form detail (error text, column list, ...).
    #[must_use]
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO _mirror_events (table_name, entity_id, event_type, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            event.table_name,
            event.entity_id,
            event.event_type.as_str(),
            event.detail,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete all but the newest `keep` events.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn prune_events(conn: &Connection, keep: u32) -> Result<usize> {
    conn.execute(
        "DELETE FROM _mirror_events
         WHERE id <= (SELECT id FROM _mirror_events ORDER BY id DESC LIMIT 1 OFFSET ?1)",
        [keep],
    )
}

/// Most recent events, optionally restricted to one table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn recent_events(
    conn: &Connection,
    table_name: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(20);
    let mut stmt = conn.prepare(
        "SELECT id, table_name, entity_id, event_type, detail, created_at
         FROM _mirror_events
         WHERE ?1 IS NULL OR table_name = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(rusqlite::params![table_name, limit], |row| {
        let raw_type: String = row.get(3)?;
        let event_type = EventType::parse(&raw_type).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown event type: {raw_type}").into(),
            )
        })?;
        Ok(Event {
            id: row.get(0)?,
            table_name: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            detail: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    rows.collect()
}
