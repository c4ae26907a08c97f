//! Client-side synchronization layer for family-tree (gia phả) charts.
//!
//! The crate keeps a keyed, in-memory cache of chart resources fetched from
//! the remote chart service, deduplicates concurrent reads, and invalidates
//! dependent entries after every successful write.
//!
//! - [`keys`]: hierarchical cache keys and invalidation filters
//! - [`cache`]: the synchronization engine
//! - [`queries`] / [`mutations`]: the read and write registries
//! - [`sync`]: `ChartSync`, the facade views use

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod mutations;
pub mod queries;
pub mod sync;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ChartApi, HttpChartApi};
pub use auth::{Session, SessionData};
pub use cache::{EngineConfig, QueryResult, QueryStatus, SyncEngine};
pub use config::Config;
pub use error::SyncError;
pub use keys::{chart_keys, KeyFilter, QueryKey};
pub use models::{Chart, ChartUpdate, EditorInfo, NewChart};
pub use queries::QueryHandle;
pub use sync::ChartSync;
