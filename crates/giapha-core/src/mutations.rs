//! Mutation registry: every chart write and the cache keys it invalidates.
//!
//! Mutations never patch cached data. On success they mark their dependent
//! keys stale and let the next read (or an active observer) fetch fresh
//! state. The engine does not chain invalidations, so each mutation lists
//! every key it can affect, directly or through derived keys.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ChartApi};
use crate::cache::SyncEngine;
use crate::error::{SyncError, SESSION_EXPIRED};
use crate::keys::{chart_keys, KeyFilter};
use crate::models::{Chart, ChartUpdate, NewChart};
use crate::queries::FetchContext;

#[async_trait]
pub trait Mutation: Send + Sync {
    type Output: Send;

    /// Name used in logs.
    const NAME: &'static str;

    /// Generic message for failures the UI has nothing more specific for.
    const FAILURE_MESSAGE: &'static str;

    /// Local precondition checked after the token and before the transport.
    fn validate(&self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn execute(&self, api: &dyn ChartApi, token: &str) -> Result<Self::Output, ApiError>;

    /// Map a transport failure onto the error taxonomy.
    fn classify(&self, error: ApiError) -> SyncError {
        error.into()
    }

    /// Keys to invalidate once the write succeeded.
    fn invalidates(&self) -> Vec<KeyFilter>;
}

/// Run a mutation: token check, local validation, the remote write, then the
/// invalidation cascade. Failures go back to the caller untouched by the cache.
pub async fn run_mutation<M: Mutation>(
    engine: &SyncEngine,
    ctx: &FetchContext,
    mutation: &M,
) -> Result<M::Output, SyncError> {
    ctx.rescope(engine);
    let token = ctx.require_token(SESSION_EXPIRED)?;
    mutation.validate()?;

    debug!(mutation = M::NAME, "mutation: start");
    let output = match mutation.execute(ctx.api.as_ref(), &token).await {
        Ok(output) => output,
        Err(e) => {
            let error = mutation.classify(e);
            warn!(mutation = M::NAME, error = %error, "mutation failed");
            return Err(error);
        }
    };

    let filters = mutation.invalidates();
    for filter in &filters {
        engine.invalidate(filter);
    }
    info!(mutation = M::NAME, invalidated = filters.len(), "mutation: ok");
    Ok(output)
}

#[derive(Debug, Clone)]
pub struct CreateChart {
    pub name: String,
    pub description: String,
}

#[async_trait]
impl Mutation for CreateChart {
    type Output = Chart;
    const NAME: &'static str = "create_chart";
    const FAILURE_MESSAGE: &'static str = "Không thể tạo gia phả.";

    async fn execute(&self, api: &dyn ChartApi, token: &str) -> Result<Chart, ApiError> {
        let body = NewChart {
            name: self.name.clone(),
            description: self.description.clone(),
        };
        api.create_chart(token, &body).await
    }

    fn invalidates(&self) -> Vec<KeyFilter> {
        vec![KeyFilter::Exact(chart_keys::my_chart())]
    }
}

#[derive(Debug, Clone)]
pub struct UpdateChart {
    pub chart_id: String,
    pub update: ChartUpdate,
}

#[async_trait]
impl Mutation for UpdateChart {
    type Output = Chart;
    const NAME: &'static str = "update_chart";
    const FAILURE_MESSAGE: &'static str = "Không thể cập nhật.";

    async fn execute(&self, api: &dyn ChartApi, token: &str) -> Result<Chart, ApiError> {
        api.update_chart(token, &self.chart_id, &self.update).await
    }

    fn invalidates(&self) -> Vec<KeyFilter> {
        vec![
            KeyFilter::Exact(chart_keys::my_chart()),
            KeyFilter::Exact(chart_keys::published_charts()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DeleteChart {
    pub chart_id: String,
}

#[async_trait]
impl Mutation for DeleteChart {
    type Output = ();
    const NAME: &'static str = "delete_chart";
    const FAILURE_MESSAGE: &'static str = "Không thể xóa gia phả.";

    async fn execute(&self, api: &dyn ChartApi, token: &str) -> Result<(), ApiError> {
        api.delete_chart(token, &self.chart_id).await
    }

    fn invalidates(&self) -> Vec<KeyFilter> {
        vec![
            KeyFilter::Exact(chart_keys::my_chart()),
            KeyFilter::Exact(chart_keys::published_charts()),
            KeyFilter::Prefix(chart_keys::editors_of(&self.chart_id)),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct AddEditor {
    pub chart_id: String,
    pub email: String,
}

#[async_trait]
impl Mutation for AddEditor {
    type Output = ();
    const NAME: &'static str = "add_editor";
    const FAILURE_MESSAGE: &'static str = "Không thể thêm người dùng này.";

    fn validate(&self) -> Result<(), SyncError> {
        if self.email.trim().is_empty() {
            return Err(SyncError::InvalidCollaborator {
                email: self.email.clone(),
            });
        }
        Ok(())
    }

    async fn execute(&self, api: &dyn ChartApi, token: &str) -> Result<(), ApiError> {
        api.add_editor(token, &self.chart_id, self.email.trim()).await
    }

    fn classify(&self, error: ApiError) -> SyncError {
        if error.is_unresolvable() {
            debug!(email = %self.email, error = %error, "collaborator not resolvable");
            SyncError::InvalidCollaborator {
                email: self.email.trim().to_string(),
            }
        } else {
            error.into()
        }
    }

    fn invalidates(&self) -> Vec<KeyFilter> {
        vec![
            KeyFilter::Exact(chart_keys::my_chart()),
            KeyFilter::Prefix(chart_keys::editors_of(&self.chart_id)),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct RemoveEditor {
    pub chart_id: String,
    pub user_id: String,
}

#[async_trait]
impl Mutation for RemoveEditor {
    type Output = ();
    const NAME: &'static str = "remove_editor";
    const FAILURE_MESSAGE: &'static str = "Không thể xóa người dùng này.";

    async fn execute(&self, api: &dyn ChartApi, token: &str) -> Result<(), ApiError> {
        api.remove_editor(token, &self.chart_id, &self.user_id).await
    }

    fn invalidates(&self) -> Vec<KeyFilter> {
        vec![
            KeyFilter::Exact(chart_keys::my_chart()),
            KeyFilter::Prefix(chart_keys::editors_of(&self.chart_id)),
        ]
    }
}
