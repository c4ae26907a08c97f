//! In-memory query cache shared by every view of a session.
//!
//! `SyncEngine` owns one entry per `QueryKey`. It deduplicates concurrent
//! reads of a key into a single fetch, tracks staleness (explicit
//! invalidation or age), refetches observed entries when they are
//! invalidated and leaves unobserved ones stale until the next read.
//!
//! Fetch results are tagged with the entry's generation; a result that
//! resolves after the entry was invalidated is discarded instead of
//! overwriting the stale marker.

pub mod engine;
pub mod entry;

pub use engine::{EngineConfig, FetchFuture, Fetcher, ObserverGuard, SyncEngine};
pub use entry::{ArcAny, QueryResult, QueryStatus};
