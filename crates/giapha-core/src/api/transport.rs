use async_trait::async_trait;

use crate::models::{Chart, ChartUpdate, EditorInfo, NewChart};

use super::ApiError;

/// Remote calls consumed by the query cache.
///
/// Every call that takes a token requires an authenticated session; the
/// cache layer checks for a token before calling in.
#[async_trait]
pub trait ChartApi: Send + Sync {
    /// The caller's own chart, or `None` when they have not created one.
    async fn get_my_chart(&self, token: &str) -> Result<Option<Chart>, ApiError>;

    /// Charts owned by someone else that the caller may edit.
    async fn get_edited_charts(&self, token: &str) -> Result<Vec<Chart>, ApiError>;

    async fn get_published_charts(&self) -> Result<Vec<Chart>, ApiError>;

    async fn get_editor_name(&self, token: &str, user_id: &str) -> Result<EditorInfo, ApiError>;

    async fn create_chart(&self, token: &str, chart: &NewChart) -> Result<Chart, ApiError>;

    async fn update_chart(
        &self,
        token: &str,
        chart_id: &str,
        update: &ChartUpdate,
    ) -> Result<Chart, ApiError>;

    async fn delete_chart(&self, token: &str, chart_id: &str) -> Result<(), ApiError>;

    async fn add_editor(&self, token: &str, chart_id: &str, email: &str) -> Result<(), ApiError>;

    async fn remove_editor(&self, token: &str, chart_id: &str, user_id: &str)
        -> Result<(), ApiError>;
}
