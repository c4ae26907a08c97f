use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::error::SyncError;
use crate::keys::QueryKey;

use super::engine::Fetcher;

pub type ArcAny = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Idle => write!(f, "idle"),
            QueryStatus::Loading => write!(f, "loading"),
            QueryStatus::Success => write!(f, "success"),
            QueryStatus::Error => write!(f, "error"),
        }
    }
}

/// What a view sees for one query: `{data, is_loading, error}` plus status.
#[derive(Debug)]
pub struct QueryResult<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    pub error: Option<SyncError>,
    pub is_stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Clone for QueryResult<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            is_stale: self.is_stale,
            updated_at: self.updated_at,
        }
    }
}

impl<T> QueryResult<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            is_stale: true,
            updated_at: None,
        }
    }

    /// A result produced without touching the cache, e.g. for a query
    /// whose activation condition does not hold.
    pub fn settled(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(data) => Self {
                data: Some(Arc::new(data)),
                status: QueryStatus::Success,
                error: None,
                is_stale: false,
                updated_at: None,
            },
            Err(error) => Self {
                data: None,
                status: QueryStatus::Error,
                error: Some(error),
                is_stale: false,
                updated_at: None,
            },
        }
    }

    /// First load in progress: nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading && self.data.is_none()
    }

    /// Any fetch in progress, including a background refresh.
    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

/// How an in-flight fetch ended, as seen by the readers waiting on it.
#[derive(Debug, Clone)]
pub(crate) enum FetchOutcome {
    Pending,
    /// The entry holds whatever the fetch produced; read it again.
    Settled,
    /// The fetch failed with an error that is not kept in the entry.
    Rejected(SyncError),
}

/// One cache slot. Only the engine touches these, always under its lock.
pub(crate) struct Entry {
    pub status: QueryStatus,
    pub data: Option<ArcAny>,
    pub error: Option<SyncError>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_access: DateTime<Utc>,
    /// Set by invalidation or forced refetch; cleared by a fetch that completes
    /// in the same generation.
    pub stale: bool,
    /// Bumped on every invalidation.
    pub generation: u64,
    /// Completion signal of the single fetch in progress.
    pub in_flight: Option<watch::Receiver<FetchOutcome>>,
    pub observers: usize,
    pub fetcher: Option<Fetcher>,
    pub fetch_count: u64,
    changes: watch::Sender<u64>,
}

impl Entry {
    pub fn new() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            last_access: Utc::now(),
            stale: false,
            generation: 0,
            in_flight: None,
            observers: 0,
            fetcher: None,
            fetch_count: 0,
            changes: watch::Sender::new(0),
        }
    }

    fn aged_out(&self, now: DateTime<Utc>, stale_after: Option<Duration>) -> bool {
        match (stale_after, self.updated_at) {
            (Some(limit), Some(at)) => now - at > limit,
            _ => false,
        }
    }

    /// Whether a read can be answered from this entry without fetching.
    /// Errors do not age; they stay until invalidated or refetched.
    pub fn is_fresh(&self, now: DateTime<Utc>, stale_after: Option<Duration>) -> bool {
        if self.stale {
            return false;
        }
        match self.status {
            QueryStatus::Success => !self.aged_out(now, stale_after),
            QueryStatus::Error => true,
            QueryStatus::Idle | QueryStatus::Loading => false,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Option<Duration>) -> bool {
        self.stale
            || self.status == QueryStatus::Idle
            || (self.status == QueryStatus::Success && self.aged_out(now, stale_after))
    }

    /// Settled value for a fresh entry.
    pub fn settled<V: Send + Sync + 'static>(&self, key: &QueryKey) -> Result<Arc<V>, SyncError> {
        if let (QueryStatus::Error, Some(error)) = (self.status, &self.error) {
            return Err(error.clone());
        }
        self.data
            .clone()
            .and_then(|data| data.downcast::<V>().ok())
            .ok_or_else(|| SyncError::CacheTypeMismatch(key.to_string()))
    }

    pub fn result<V: Send + Sync + 'static>(
        &self,
        now: DateTime<Utc>,
        stale_after: Option<Duration>,
    ) -> QueryResult<V> {
        QueryResult {
            data: self.data.clone().and_then(|data| data.downcast::<V>().ok()),
            status: self.status,
            error: self.error.clone(),
            is_stale: self.is_stale(now, stale_after),
            updated_at: self.updated_at,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Wake observers after any state change.
    pub fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}
