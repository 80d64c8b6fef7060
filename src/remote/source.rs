//! Remote source traits.
//!
//! The sync engine only sees these traits, so tests can drive it with an
//! in-memory source while production uses [`super::PodioClient`].

use super::classify::TransportError;
use super::types::{ItemPage, ItemQuery, RemoteApplication, RemoteSpace};

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, TransportError>;

/// Read-only access to applications, workspaces and items.
pub trait RemoteSource: Send + Sync {
    /// Application metadata including its field list.
    fn get_application(
        &self,
        app_id: i64,
    ) -> impl std::future::Future<Output = RemoteResult<RemoteApplication>> + Send;

    /// Workspace metadata.
    fn get_space(
        &self,
        space_id: i64,
    ) -> impl std::future::Future<Output = RemoteResult<RemoteSpace>> + Send;

    /// Number of items currently in the application.
    fn count_items(&self, app_id: i64) -> impl std::future::Future<Output = RemoteResult<u64>> + Send;

    /// One page of items.
    fn filter_items(
        &self,
        app_id: i64,
        query: &ItemQuery,
    ) -> impl std::future::Future<Output = RemoteResult<ItemPage>> + Send;
}

/// Produces an authenticated [`RemoteSource`].
///
/// The scheduler calls `connect` at startup and again after every backoff
/// sleep or expired token.
pub trait Connector: Send + Sync {
    type Source: RemoteSource;

    fn connect(&self) -> impl std::future::Future<Output = RemoteResult<Self::Source>> + Send;
}
