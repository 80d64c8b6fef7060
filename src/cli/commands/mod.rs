//! Command implementations.

pub mod completions;
pub mod config;
pub mod status;
pub mod sync;
pub mod version;
