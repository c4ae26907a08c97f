//! Query registry: one entry per readable chart resource.
//!
//! Each query names its cache key, its activation condition and how to
//! fetch it. The token is read from the session when a fetch actually
//! runs, so a query built before sign-in works after it.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

use crate::api::ChartApi;
use crate::auth::Session;
use crate::cache::{ArcAny, Fetcher, ObserverGuard, QueryResult, SyncEngine};
use crate::error::{SyncError, LOGIN_REQUIRED_FOR_SHARED, SESSION_EXPIRED};
use crate::keys::{chart_keys, QueryKey};
use crate::models::{Chart, EditorInfo};

/// Everything a fetch needs: the transport and the session to take the
/// token from.
#[derive(Clone)]
pub struct FetchContext {
    pub api: Arc<dyn ChartApi>,
    pub session: Session,
}

impl FetchContext {
    pub fn new(api: Arc<dyn ChartApi>, session: Session) -> Self {
        Self { api, session }
    }

    /// Current token, or `Unauthenticated` with the given message.
    pub fn require_token(&self, message: &'static str) -> Result<String, SyncError> {
        self.session
            .token()
            .ok_or(SyncError::Unauthenticated(message))
    }

    /// Drop the cache if the session now belongs to someone else. Runs
    /// before every read and write.
    pub fn rescope(&self, engine: &SyncEngine) {
        engine.scope_to(self.session.identity().as_deref());
    }
}

pub trait Query: Clone + Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Name used in logs.
    const NAME: &'static str;

    fn key(&self) -> QueryKey;

    /// What readers get while the activation condition does not hold.
    /// `None` means the query is active and may fetch.
    fn inactive_result(&self, token: Option<&str>) -> Option<Result<Self::Output, SyncError>>;

    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, Result<Self::Output, SyncError>>;
}

/// Type-erased fetcher the engine can call for this query.
pub fn fetcher<Q: Query>(query: &Q, ctx: &FetchContext) -> Fetcher {
    let query = query.clone();
    let ctx = ctx.clone();
    Arc::new(move || {
        query
            .fetch(ctx.clone())
            .map(|result| result.map(|value| Arc::new(value) as ArcAny))
            .boxed()
    })
}

/// Read a query through the cache, honoring its activation condition.
pub async fn run_query<Q: Query>(
    engine: &SyncEngine,
    ctx: &FetchContext,
    query: &Q,
) -> Result<Arc<Q::Output>, SyncError> {
    ctx.rescope(engine);
    let token = ctx.session.token();
    if let Some(result) = query.inactive_result(token.as_deref()) {
        debug!(query = Q::NAME, "query inactive");
        return result.map(Arc::new);
    }
    engine.fetch(&query.key(), fetcher(query, ctx)).await
}

// ============================================================================
// Queries
// ============================================================================

/// The signed-in user's own chart; `None` until they create one.
#[derive(Debug, Clone, Default)]
pub struct MyChartQuery;

impl Query for MyChartQuery {
    type Output = Option<Chart>;
    const NAME: &'static str = "my_chart";

    fn key(&self) -> QueryKey {
        chart_keys::my_chart()
    }

    fn inactive_result(&self, token: Option<&str>) -> Option<Result<Self::Output, SyncError>> {
        token
            .is_none()
            .then_some(Err(SyncError::Unauthenticated(SESSION_EXPIRED)))
    }

    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, Result<Self::Output, SyncError>> {
        async move {
            let token = ctx.require_token(SESSION_EXPIRED)?;
            Ok(ctx.api.get_my_chart(&token).await?)
        }
        .boxed()
    }
}

/// Charts owned by others that the signed-in user may edit.
#[derive(Debug, Clone, Default)]
pub struct EditedChartsQuery;

impl Query for EditedChartsQuery {
    type Output = Vec<Chart>;
    const NAME: &'static str = "edited_charts";

    fn key(&self) -> QueryKey {
        chart_keys::edited_charts()
    }

    fn inactive_result(&self, token: Option<&str>) -> Option<Result<Self::Output, SyncError>> {
        token
            .is_none()
            .then_some(Err(SyncError::Unauthenticated(LOGIN_REQUIRED_FOR_SHARED)))
    }

    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, Result<Self::Output, SyncError>> {
        async move {
            let token = ctx.require_token(LOGIN_REQUIRED_FOR_SHARED)?;
            Ok(ctx.api.get_edited_charts(&token).await?)
        }
        .boxed()
    }
}

/// Charts visible to everyone. Needs no session.
#[derive(Debug, Clone, Default)]
pub struct PublishedChartsQuery;

impl Query for PublishedChartsQuery {
    type Output = Vec<Chart>;
    const NAME: &'static str = "published_charts";

    fn key(&self) -> QueryKey {
        chart_keys::published_charts()
    }

    fn inactive_result(&self, _token: Option<&str>) -> Option<Result<Self::Output, SyncError>> {
        None
    }

    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, Result<Self::Output, SyncError>> {
        async move { Ok(ctx.api.get_published_charts().await?) }.boxed()
    }
}

/// Display info for a chart's current editors, derived from its editor ids.
///
/// Ids are resolved concurrently; one failed lookup fails the whole list.
#[derive(Debug, Clone)]
pub struct EditorsQuery {
    chart_id: String,
    editor_ids: Vec<String>,
}

impl EditorsQuery {
    pub fn new(chart_id: impl Into<String>, editor_ids: &[String]) -> Self {
        let mut editor_ids = editor_ids.to_vec();
        editor_ids.sort();
        editor_ids.dedup();
        Self {
            chart_id: chart_id.into(),
            editor_ids,
        }
    }

    pub fn editor_ids(&self) -> &[String] {
        &self.editor_ids
    }
}

impl Query for EditorsQuery {
    type Output = Vec<EditorInfo>;
    const NAME: &'static str = "editors";

    fn key(&self) -> QueryKey {
        chart_keys::editors(&self.chart_id, &self.editor_ids)
    }

    fn inactive_result(&self, token: Option<&str>) -> Option<Result<Self::Output, SyncError>> {
        (token.is_none() || self.editor_ids.is_empty()).then(|| Ok(Vec::new()))
    }

    fn fetch(&self, ctx: FetchContext) -> BoxFuture<'static, Result<Self::Output, SyncError>> {
        let editor_ids = self.editor_ids.clone();
        async move {
            let Some(token) = ctx.session.token() else {
                return Ok(Vec::new());
            };
            if editor_ids.is_empty() {
                return Ok(Vec::new());
            }
            let lookups = editor_ids
                .iter()
                .map(|user_id| ctx.api.get_editor_name(&token, user_id));
            Ok(try_join_all(lookups).await?)
        }
        .boxed()
    }
}

// ============================================================================
// Handles
// ============================================================================

/// A view's accessor for one query.
///
/// Holding the handle marks the key as observed, so invalidations refetch
/// it right away. `state()` is cheap and meant to be called on every render.
pub struct QueryHandle<Q: Query> {
    query: Q,
    ctx: FetchContext,
    engine: SyncEngine,
    fetcher: Fetcher,
    observer: ObserverGuard,
}

impl<Q: Query> QueryHandle<Q> {
    pub fn new(engine: SyncEngine, ctx: FetchContext, query: Q) -> Self {
        let fetcher = fetcher(&query, &ctx);
        let observer = engine.observe(&query.key(), fetcher.clone());
        Self {
            query,
            ctx,
            engine,
            fetcher,
            observer,
        }
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn key(&self) -> &QueryKey {
        self.observer.key()
    }

    /// Current `{data, is_loading, error}`. Starts a fetch when the query is
    /// active and the entry is missing or stale.
    pub fn state(&self) -> QueryResult<Q::Output> {
        self.ctx.rescope(&self.engine);
        let token = self.ctx.session.token();
        if let Some(result) = self.query.inactive_result(token.as_deref()) {
            return QueryResult::settled(result);
        }
        self.engine.ensure(self.key(), self.fetcher.clone());
        self.engine.snapshot(self.key())
    }

    /// Wait until the cached entry changes. Session changes are not reported
    /// here; subscribe to the session for those.
    pub async fn changed(&mut self) -> bool {
        self.observer.changed().await
    }

    /// Wait for a settled value.
    pub async fn settle(&self) -> Result<Arc<Q::Output>, SyncError> {
        run_query(&self.engine, &self.ctx, &self.query).await
    }

    /// Fetch again even if the cached value is fresh.
    pub async fn refetch(&self) -> Result<Arc<Q::Output>, SyncError> {
        self.ctx.rescope(&self.engine);
        let token = self.ctx.session.token();
        if let Some(result) = self.query.inactive_result(token.as_deref()) {
            return result.map(Arc::new);
        }
        self.engine.refetch(self.key(), self.fetcher.clone()).await
    }
}
