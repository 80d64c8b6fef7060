//! Podio API access.
//!
//! This module is the read-only remote side of the mirror:
//!
//! - [`types`] - Applications, spaces, fields and items as Podio returns them
//! - [`source`] - The `RemoteSource`/`Connector` traits the sync engine talks to
//! - [`client`] - `reqwest` implementation against the Podio REST API
//! - [`classify`] - Maps transport failures onto retry/backoff categories
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐ connect() ┌──────────────┐
//! │ PodioConnector ├──────────►│ PodioClient  │  (bearer token)
//! └────────────────┘           └──────┬───────┘
//!                                     │ RemoteSource
//!                       ┌─────────────┼─────────────┐
//!                       ▼             ▼             ▼
//!                  /app/{id}    /space/{id}   /item/app/{id}/filter/
//! ```
//!
//! Every call returns `Result<T, TransportError>`; callers hand the error to
//! [`classify`] and decide what to do with the resulting [`RemoteFailure`].

pub mod classify;
pub mod client;
pub mod source;
pub mod types;

pub use classify::{classify, BadRequestReason, RemoteFailure, TransportError};
pub use client::{PodioClient, PodioConnector, DEFAULT_ENDPOINT};
pub use source::{Connector, RemoteResult, RemoteSource};
pub use types::{
    FieldType, ItemPage, ItemQuery, LifecycleStatus, RemoteApplication, RemoteField, RemoteItem,
    RemoteItemField, RemoteSpace, format_podio_datetime, parse_podio_datetime, PAGE_SIZE,
    PODIO_DATETIME_FORMAT,
};
