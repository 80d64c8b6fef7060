//! Sync pass outcomes and statistics.

use serde::Serialize;

use crate::remote::RemoteFailure;

/// Result of processing one application in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Processed (including "nothing to do").
    Ok,
    /// Request quota exhausted.
    RateLimited,
    /// Access token rejected.
    AuthExpired,
    /// Insert failed against the existing table; the table was dropped.
    StructuralDrift,
    /// DDL or DML failed for this application.
    StorageError,
    /// Skipped for now (bad request, timeout, name collision, ...).
    TransientSkip,
}

impl Outcome {
    /// Per-application outcome for a classified remote failure.
    #[must_use]
    pub const fn from_failure(failure: &RemoteFailure) -> Self {
        match failure {
            RemoteFailure::RateLimit => Self::RateLimited,
            RemoteFailure::AuthExpired => Self::AuthExpired,
            RemoteFailure::BadRequest(_) | RemoteFailure::Timeout | RemoteFailure::Unknown => {
                Self::TransientSkip
            }
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::RateLimited => "rate_limited",
            Self::AuthExpired => "auth_expired",
            Self::StructuralDrift => "structural_drift",
            Self::StorageError => "storage_error",
            Self::TransientSkip => "transient_skip",
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pass stopped before reaching every application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
    /// Quota exhausted: wait for the next hour.
    RetryLater,
    /// Token rejected: authenticate again.
    Reauth,
    /// Remote failure while paging items: give up on this cycle.
    AbortCycle,
    /// The mirror database could not be opened.
    StorageUnavailable,
}

impl Halt {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RetryLater => "retry_later",
            Self::Reauth => "reauth",
            Self::AbortCycle => "abort_cycle",
            Self::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl std::fmt::Display for Halt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item counters for one application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemStats {
    /// Items returned by the remote.
    pub fetched: u64,
    /// Rows written for items not seen before.
    pub inserted: u64,
    /// Rows rewritten because the remote item is newer.
    pub replaced: u64,
    /// Items whose stored row is already current.
    pub unchanged: u64,
    /// Pages requested.
    pub pages: u64,
}

impl ItemStats {
    /// Rows written (inserted or replaced).
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.inserted + self.replaced
    }
}

/// One application's share of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationReport {
    pub app_id: i64,
    /// Target table, once the application metadata was read.
    pub table: Option<String>,
    pub outcome: Outcome,
    pub stats: ItemStats,
}

impl ApplicationReport {
    #[must_use]
    pub fn new(app_id: i64, table: Option<String>, outcome: Outcome) -> Self {
        Self {
            app_id,
            table,
            outcome,
            stats: ItemStats::default(),
        }
    }
}

/// Result of one schema or item pass over all configured applications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Applications reached, in processing order.
    pub applications: Vec<ApplicationReport>,
    /// Set when the pass stopped early.
    pub halt: Option<Halt>,
}

impl PassReport {
    /// A pass that could not start.
    #[must_use]
    pub fn halted(halt: Halt) -> Self {
        Self {
            applications: Vec::new(),
            halt: Some(halt),
        }
    }

    /// True when the pass reached every application.
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.halt.is_none()
    }

    /// Number of applications with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.applications
            .iter()
            .filter(|a| a.outcome == outcome)
            .count()
    }

    /// Item counters summed across applications.
    #[must_use]
    pub fn totals(&self) -> ItemStats {
        self.applications
            .iter()
            .fold(ItemStats::default(), |mut acc, app| {
                acc.fetched += app.stats.fetched;
                acc.inserted += app.stats.inserted;
                acc.replaced += app.stats.replaced;
                acc.unchanged += app.stats.unchanged;
                acc.pages += app.stats.pages;
                acc
            })
    }
}
