//! Transport boundary for the family-tree chart service.
//!
//! `ChartApi` is the abstract remote surface the query cache consumes.
//! `HttpChartApi` implements it over REST with bearer-token
//! authentication. Tests substitute an in-memory implementation.

pub mod client;
pub mod error;
pub mod transport;

pub use client::HttpChartApi;
pub use error::ApiError;
pub use transport::ChartApi;
