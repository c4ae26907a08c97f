//! Facade tying the transport, the session and the query cache together.
//!
//! One `ChartSync` lives per signed-in process. Views read through the
//! `watch_*` handles or the one-shot readers; every write goes through the
//! mutation methods so the right keys are invalidated.

use std::sync::Arc;

use tracing::info;

use crate::api::{ApiError, ChartApi, HttpChartApi};
use crate::auth::{Session, SessionData};
use crate::cache::{EngineConfig, SyncEngine};
use crate::config::Config;
use crate::error::SyncError;
use crate::models::{Chart, ChartUpdate, EditorInfo};
use crate::mutations::{
    run_mutation, AddEditor, CreateChart, DeleteChart, RemoveEditor, UpdateChart,
};
use crate::queries::{
    run_query, EditedChartsQuery, EditorsQuery, FetchContext, MyChartQuery,
    PublishedChartsQuery, QueryHandle,
};

#[derive(Clone)]
pub struct ChartSync {
    engine: SyncEngine,
    ctx: FetchContext,
}

impl ChartSync {
    pub fn new(api: Arc<dyn ChartApi>, session: Session, config: EngineConfig) -> Self {
        Self {
            engine: SyncEngine::new(config),
            ctx: FetchContext::new(api, session),
        }
    }

    /// Build against the configured REST endpoint.
    pub fn from_config(config: &Config, session: Session) -> Result<Self, ApiError> {
        let api = HttpChartApi::from_config(config)?;
        Ok(Self::new(Arc::new(api), session, config.engine_config()))
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    // ------------------------------------------------------------------
    // Observed reads
    // ------------------------------------------------------------------

    pub fn watch_my_chart(&self) -> QueryHandle<MyChartQuery> {
        QueryHandle::new(self.engine.clone(), self.ctx.clone(), MyChartQuery)
    }

    pub fn watch_edited_charts(&self) -> QueryHandle<EditedChartsQuery> {
        QueryHandle::new(self.engine.clone(), self.ctx.clone(), EditedChartsQuery)
    }

    pub fn watch_published_charts(&self) -> QueryHandle<PublishedChartsQuery> {
        QueryHandle::new(self.engine.clone(), self.ctx.clone(), PublishedChartsQuery)
    }

    pub fn watch_editors(&self, chart_id: &str, editor_ids: &[String]) -> QueryHandle<EditorsQuery> {
        QueryHandle::new(
            self.engine.clone(),
            self.ctx.clone(),
            EditorsQuery::new(chart_id, editor_ids),
        )
    }

    // ------------------------------------------------------------------
    // One-shot reads
    // ------------------------------------------------------------------

    pub async fn my_chart(&self) -> Result<Arc<Option<Chart>>, SyncError> {
        run_query(&self.engine, &self.ctx, &MyChartQuery).await
    }

    pub async fn edited_charts(&self) -> Result<Arc<Vec<Chart>>, SyncError> {
        run_query(&self.engine, &self.ctx, &EditedChartsQuery).await
    }

    pub async fn published_charts(&self) -> Result<Arc<Vec<Chart>>, SyncError> {
        run_query(&self.engine, &self.ctx, &PublishedChartsQuery).await
    }

    pub async fn editors(
        &self,
        chart_id: &str,
        editor_ids: &[String],
    ) -> Result<Arc<Vec<EditorInfo>>, SyncError> {
        run_query(&self.engine, &self.ctx, &EditorsQuery::new(chart_id, editor_ids)).await
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn create_chart(&self, name: &str, description: &str) -> Result<Chart, SyncError> {
        let mutation = CreateChart {
            name: name.to_string(),
            description: description.to_string(),
        };
        run_mutation(&self.engine, &self.ctx, &mutation).await
    }

    pub async fn update_chart(
        &self,
        chart_id: &str,
        name: &str,
        description: &str,
        published: bool,
    ) -> Result<Chart, SyncError> {
        let mutation = UpdateChart {
            chart_id: chart_id.to_string(),
            update: ChartUpdate {
                name: name.to_string(),
                description: description.to_string(),
                published,
            },
        };
        run_mutation(&self.engine, &self.ctx, &mutation).await
    }

    pub async fn delete_chart(&self, chart_id: &str) -> Result<(), SyncError> {
        let mutation = DeleteChart {
            chart_id: chart_id.to_string(),
        };
        run_mutation(&self.engine, &self.ctx, &mutation).await
    }

    pub async fn add_editor(&self, chart_id: &str, email: &str) -> Result<(), SyncError> {
        let mutation = AddEditor {
            chart_id: chart_id.to_string(),
            email: email.to_string(),
        };
        run_mutation(&self.engine, &self.ctx, &mutation).await
    }

    pub async fn remove_editor(&self, chart_id: &str, user_id: &str) -> Result<(), SyncError> {
        let mutation = RemoveEditor {
            chart_id: chart_id.to_string(),
            user_id: user_id.to_string(),
        };
        run_mutation(&self.engine, &self.ctx, &mutation).await
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Start a session. Data cached for a different identity is dropped.
    pub fn sign_in(&self, data: SessionData) {
        self.ctx.session.sign_in(data);
        self.ctx.rescope(&self.engine);
    }

    /// Drop the token and every cached entry so nothing from this user
    /// leaks into the next session.
    pub fn sign_out(&self) {
        self.ctx.session.sign_out();
        self.engine.scope_to(None);
        let dropped = self.engine.clear();
        info!(dropped, "signed out, cache cleared");
    }

    pub fn collect_garbage(&self) -> usize {
        self.engine.collect_garbage()
    }
}
