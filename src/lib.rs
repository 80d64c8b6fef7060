//! podio-mirror - Mirror Podio applications into SQLite
//!
//! This crate provides the core functionality for the `podio-mirror` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`remote`] - Podio API client, data model and failure classification
//! - [`storage`] - SQLite target tables and bookkeeping events
//! - [`sync`] - Schema pass, item pass and the polling scheduler
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
