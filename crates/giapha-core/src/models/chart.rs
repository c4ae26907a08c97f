use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A family-tree chart as returned by the remote service.
///
/// The owner is implicitly privileged and never listed in `editors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Chart {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    #[serde(rename = "ownerName", default)]
    pub owner_name: String,
    #[serde(default)]
    pub editors: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Placeholder shown for a chart that has not been named yet
pub const UNNAMED_CHART: &str = "Gia Phả Chưa Đặt Tên";

/// Placeholder shown for a chart without a description
pub const NO_DESCRIPTION: &str = "Chưa có mô tả";

impl Chart {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNNAMED_CHART,
        }
    }

    pub fn display_description(&self) -> &str {
        match self.description.as_deref() {
            Some(desc) if !desc.is_empty() => desc,
            _ => NO_DESCRIPTION,
        }
    }

    pub fn visibility_label(&self) -> &'static str {
        if self.published {
            "Công khai"
        } else {
            "Riêng tư"
        }
    }

    pub fn has_editor(&self, user_id: &str) -> bool {
        self.editors.iter().any(|e| e == user_id)
    }
}

/// Body of a create-chart request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChart {
    pub name: String,
    pub description: String,
}

/// Body of an update-chart request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartUpdate {
    pub name: String,
    pub description: String,
    pub published: bool,
}
