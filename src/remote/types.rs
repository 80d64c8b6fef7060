//! Podio data model.
//!
//! These types mirror the subset of the Podio JSON payloads the mirror reads.
//! Unknown JSON members are ignored so API additions never break decoding.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum page size accepted by the item filter endpoint.
pub const PAGE_SIZE: u32 = 500;

/// Timestamp format used by Podio for `created_on` / `last_event_on` (UTC).
pub const PODIO_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lifecycle status shared by applications and fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Active,
    Inactive,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl LifecycleStatus {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Field type tag.
///
/// The mirror only needs to tell apart the types whose values are not a
/// plain `value` member. Everything else (text, number, duration, location,
/// phone, ...) is carried as `Plain` with its original tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Category,
    Date,
    Calculation,
    Money,
    Image,
    Embed,
    Contact,
    App,
    Plain(String),
}

impl FieldType {
    /// The Podio type tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Category => "category",
            Self::Date => "date",
            Self::Calculation => "calculation",
            Self::Money => "money",
            Self::Image => "image",
            Self::Embed => "embed",
            Self::Contact => "contact",
            Self::App => "app",
            Self::Plain(tag) => tag,
        }
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "category" => Self::Category,
            "date" => Self::Date,
            "calculation" => Self::Calculation,
            "money" => Self::Money,
            "image" => Self::Image,
            "embed" => Self::Embed,
            "contact" => Self::Contact,
            "app" => Self::App,
            _ => Self::Plain(tag),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Plain(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field definition of an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteField {
    pub external_id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub status: LifecycleStatus,
}

/// An application (Podio "app"): the schema of one mirrored table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteApplication {
    pub app_id: i64,
    pub space_id: i64,
    pub status: LifecycleStatus,
    pub url_label: String,
    #[serde(default)]
    pub fields: Vec<RemoteField>,
}

impl RemoteApplication {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Fields currently active, in the order Podio lists them.
    pub fn active_fields(&self) -> impl Iterator<Item = &RemoteField> {
        self.fields.iter().filter(|f| f.status.is_active())
    }
}

/// A workspace (Podio "space").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSpace {
    pub space_id: i64,
    pub url_label: String,
}

/// One field value instance carried by an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItemField {
    pub external_id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub values: Vec<Value>,
}

/// One record of an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItem {
    pub item_id: i64,
    #[serde(with = "podio_datetime")]
    pub created_on: NaiveDateTime,
    #[serde(with = "podio_datetime")]
    pub last_event_on: NaiveDateTime,
    #[serde(default)]
    pub fields: Vec<RemoteItemField>,
}

/// Body of `POST /item/app/{app_id}/filter/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemQuery {
    pub offset: u64,
    pub limit: u32,
    pub sort_by: &'static str,
    pub sort_desc: bool,
}

impl ItemQuery {
    /// Oldest-first page starting at `offset`.
    #[must_use]
    pub const fn page(offset: u64) -> Self {
        Self {
            offset,
            limit: PAGE_SIZE,
            sort_by: "created_on",
            sort_desc: false,
        }
    }
}

/// Response of the item filter endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub filtered: u64,
    #[serde(default)]
    pub items: Vec<RemoteItem>,
}

/// Render a timestamp the way Podio does.
#[must_use]
pub fn format_podio_datetime(value: &NaiveDateTime) -> String {
    value.format(PODIO_DATETIME_FORMAT).to_string()
}

/// Parse a Podio timestamp.
#[must_use]
pub fn parse_podio_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), PODIO_DATETIME_FORMAT).ok()
}

mod podio_datetime {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_podio_datetime(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_podio_datetime(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid Podio timestamp: {raw}")))
    }
}
