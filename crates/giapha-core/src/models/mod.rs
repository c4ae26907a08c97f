//! Data models for family-tree chart entities.
//!
//! - `Chart`: the shared document with one owner and a set of editors
//! - `EditorInfo`: display projection of a user granted edit rights
//! - `NewChart`, `ChartUpdate`: request bodies for chart writes

pub mod chart;
pub mod editor;

pub use chart::{Chart, ChartUpdate, NewChart};
pub use editor::EditorInfo;
