//! In-memory `ChartApi` used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::api::{ApiError, ChartApi};
use crate::models::{Chart, ChartUpdate, EditorInfo, NewChart};

pub const OWNER_ID: &str = "owner";

#[derive(Default)]
struct State {
    my_chart: Option<Chart>,
    edited: Vec<Chart>,
    published: Vec<Chart>,
    users: HashMap<String, EditorInfo>,
    unreachable_users: HashSet<String>,
    failures: HashMap<&'static str, ApiError>,
    calls: HashMap<&'static str, usize>,
    gates: HashMap<&'static str, Arc<Semaphore>>,
    next_id: usize,
}

/// A fake chart service. Reads snapshot server state when the call arrives,
/// then optionally wait on a gate so tests can hold them pending.
#[derive(Default)]
pub struct FakeChartApi {
    state: Mutex<State>,
}

impl FakeChartApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chart(id: &str, name: &str, editors: &[&str]) -> Chart {
        Chart {
            id: id.to_string(),
            owner_id: OWNER_ID.to_string(),
            owner_name: "Chủ sở hữu".to_string(),
            editors: editors.iter().map(|e| e.to_string()).collect(),
            name: Some(name.to_string()),
            description: None,
            published: false,
            created_at: Utc::now(),
        }
    }

    pub fn set_my_chart(&self, chart: Option<Chart>) {
        self.state.lock().my_chart = chart;
    }

    pub fn set_published(&self, charts: Vec<Chart>) {
        self.state.lock().published = charts;
    }

    pub fn set_edited(&self, charts: Vec<Chart>) {
        self.state.lock().edited = charts;
    }

    pub fn add_user(&self, id: &str, full_name: &str, email: &str) {
        self.state.lock().users.insert(
            id.to_string(),
            EditorInfo {
                id: id.to_string(),
                full_name: full_name.to_string(),
                email: email.to_string(),
            },
        );
    }

    /// Editor lookups for this user fail with a server error.
    pub fn break_user(&self, id: &str) {
        self.state.lock().unreachable_users.insert(id.to_string());
    }

    /// The next call to `call` fails with `error`.
    pub fn fail_next(&self, call: &'static str, error: ApiError) {
        self.state.lock().failures.insert(call, error);
    }

    /// Hold every call to `call` until `release` grants it a permit.
    pub fn hold(&self, call: &'static str) {
        self.state
            .lock()
            .gates
            .insert(call, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, call: &'static str, permits: usize) {
        if let Some(gate) = self.state.lock().gates.get(call) {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self, call: &'static str) -> usize {
        self.state.lock().calls.get(call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Count the call and take any injected failure.
    fn enter(&self, call: &'static str) -> (Option<ApiError>, Option<Arc<Semaphore>>) {
        let mut state = self.state.lock();
        *state.calls.entry(call).or_insert(0) += 1;
        (state.failures.remove(call), state.gates.get(call).cloned())
    }

    async fn pass_gate(gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn my_chart_mut<'a>(state: &'a mut State, chart_id: &str) -> Result<&'a mut Chart, ApiError> {
        state
            .my_chart
            .as_mut()
            .filter(|c| c.id == chart_id)
            .ok_or_else(|| ApiError::NotFound(format!("chart {}", chart_id)))
    }
}

#[async_trait]
impl ChartApi for FakeChartApi {
    async fn get_my_chart(&self, _token: &str) -> Result<Option<Chart>, ApiError> {
        let (failure, gate) = self.enter("get_my_chart");
        let snapshot = self.state.lock().my_chart.clone();
        Self::pass_gate(gate).await;
        match failure {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }

    async fn get_edited_charts(&self, _token: &str) -> Result<Vec<Chart>, ApiError> {
        let (failure, gate) = self.enter("get_edited_charts");
        let snapshot = self.state.lock().edited.clone();
        Self::pass_gate(gate).await;
        match failure {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }

    async fn get_published_charts(&self) -> Result<Vec<Chart>, ApiError> {
        let (failure, gate) = self.enter("get_published_charts");
        let snapshot = self.state.lock().published.clone();
        Self::pass_gate(gate).await;
        match failure {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }

    async fn get_editor_name(&self, _token: &str, user_id: &str) -> Result<EditorInfo, ApiError> {
        let (failure, gate) = self.enter("get_editor_name");
        let lookup = {
            let state = self.state.lock();
            if state.unreachable_users.contains(user_id) {
                Err(ApiError::ServerError(format!("lookup of {} failed", user_id)))
            } else {
                state
                    .users
                    .get(user_id)
                    .cloned()
                    .ok_or_else(|| ApiError::NotFound(format!("user {}", user_id)))
            }
        };
        Self::pass_gate(gate).await;
        match failure {
            Some(e) => Err(e),
            None => lookup,
        }
    }

    async fn create_chart(&self, _token: &str, chart: &NewChart) -> Result<Chart, ApiError> {
        let (failure, _) = self.enter("create_chart");
        if let Some(e) = failure {
            return Err(e);
        }
        let mut state = self.state.lock();
        state.next_id += 1;
        let mut created = Self::chart(&format!("chart-{}", state.next_id), &chart.name, &[]);
        created.description = Some(chart.description.clone());
        state.my_chart = Some(created.clone());
        Ok(created)
    }

    async fn update_chart(
        &self,
        _token: &str,
        chart_id: &str,
        update: &ChartUpdate,
    ) -> Result<Chart, ApiError> {
        let (failure, _) = self.enter("update_chart");
        if let Some(e) = failure {
            return Err(e);
        }
        let mut state = self.state.lock();
        let chart = Self::my_chart_mut(&mut state, chart_id)?;
        chart.name = Some(update.name.clone());
        chart.description = Some(update.description.clone());
        chart.published = update.published;
        let updated = chart.clone();

        state.published.retain(|c| c.id != chart_id);
        if updated.published {
            state.published.push(updated.clone());
        }
        Ok(updated)
    }

    async fn delete_chart(&self, _token: &str, chart_id: &str) -> Result<(), ApiError> {
        let (failure, _) = self.enter("delete_chart");
        if let Some(e) = failure {
            return Err(e);
        }
        let mut state = self.state.lock();
        Self::my_chart_mut(&mut state, chart_id)?;
        state.my_chart = None;
        state.published.retain(|c| c.id != chart_id);
        Ok(())
    }

    async fn add_editor(&self, _token: &str, chart_id: &str, email: &str) -> Result<(), ApiError> {
        let (failure, _) = self.enter("add_editor");
        if let Some(e) = failure {
            return Err(e);
        }
        let mut state = self.state.lock();
        let user_id = state
            .users
            .values()
            .find(|u| u.email == email)
            .map(|u| u.id.clone())
            .ok_or_else(|| ApiError::NotFound(format!("{{\"detail\":\"No user with email {}\"}}", email)))?;
        let chart = Self::my_chart_mut(&mut state, chart_id)?;
        if !chart.has_editor(&user_id) {
            chart.editors.push(user_id);
        }
        Ok(())
    }

    async fn remove_editor(
        &self,
        _token: &str,
        chart_id: &str,
        user_id: &str,
    ) -> Result<(), ApiError> {
        let (failure, _) = self.enter("remove_editor");
        if let Some(e) = failure {
            return Err(e);
        }
        let mut state = self.state.lock();
        let chart = Self::my_chart_mut(&mut state, chart_id)?;
        chart.editors.retain(|e| e != user_id);
        Ok(())
    }
}
