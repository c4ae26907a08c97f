use serde::{Deserialize, Serialize};

/// Display information for a chart editor, resolved from a user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct EditorInfo {
    #[serde(rename = "_id")]
    pub id: String,
    pub full_name: String,
    pub email: String,
}
