//! REST client for the family-tree chart service.
//!
//! Provides `HttpChartApi`, the production `ChartApi` implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::models::{Chart, ChartUpdate, EditorInfo, NewChart};

use super::{ApiError, ChartApi};

/// HTTP client for the chart service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpChartApi {
    client: Client,
    base_url: Url,
}

impl HttpChartApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so ids containing `/`, `?` or `#` stay inside their segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request and return the body of a successful response.
    async fn send(request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.text().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn parse<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, ApiError> {
        serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    /// Parse a list response, treating an empty body or `null` as no items.
    fn parse_list<T: DeserializeOwned>(body: &str, what: &str) -> Result<Vec<T>, ApiError> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let items: Option<Vec<T>> = Self::parse(body, what)?;
        Ok(items.unwrap_or_default())
    }
}

#[async_trait]
impl ChartApi for HttpChartApi {
    async fn get_my_chart(&self, token: &str) -> Result<Option<Chart>, ApiError> {
        let request = self.client.get(self.url(&["charts", "my"])).bearer_auth(token);
        match Self::send(request).await {
            Ok(body) if body.trim().is_empty() => Ok(None),
            Ok(body) => Self::parse(&body, "my chart"),
            Err(ApiError::NotFound(_)) => {
                debug!("No chart for current user");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_edited_charts(&self, token: &str) -> Result<Vec<Chart>, ApiError> {
        let request = self.client.get(self.url(&["charts", "edited"])).bearer_auth(token);
        let body = Self::send(request).await?;
        Self::parse_list(&body, "edited charts")
    }

    async fn get_published_charts(&self) -> Result<Vec<Chart>, ApiError> {
        let body = Self::send(self.client.get(self.url(&["charts", "published"]))).await?;
        Self::parse_list(&body, "published charts")
    }

    async fn get_editor_name(&self, token: &str, user_id: &str) -> Result<EditorInfo, ApiError> {
        let request = self
            .client
            .get(self.url(&["users", user_id, "name"]))
            .bearer_auth(token);
        let body = Self::send(request).await?;
        Self::parse(&body, "editor info")
    }

    async fn create_chart(&self, token: &str, chart: &NewChart) -> Result<Chart, ApiError> {
        let request = self
            .client
            .post(self.url(&["charts"]))
            .bearer_auth(token)
            .json(chart);
        let body = Self::send(request).await?;
        Self::parse(&body, "created chart")
    }

    async fn update_chart(
        &self,
        token: &str,
        chart_id: &str,
        update: &ChartUpdate,
    ) -> Result<Chart, ApiError> {
        let request = self
            .client
            .put(self.url(&["charts", chart_id]))
            .bearer_auth(token)
            .json(update);
        let body = Self::send(request).await?;
        Self::parse(&body, "updated chart")
    }

    async fn delete_chart(&self, token: &str, chart_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&["charts", chart_id]))
            .bearer_auth(token);
        Self::send(request).await?;
        Ok(())
    }

    async fn add_editor(&self, token: &str, chart_id: &str, email: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url(&["charts", chart_id, "editors"]))
            .bearer_auth(token)
            .json(&json!({ "email": email }));
        Self::send(request).await?;
        Ok(())
    }

    async fn remove_editor(
        &self,
        token: &str,
        chart_id: &str,
        user_id: &str,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&["charts", chart_id, "editors", user_id]))
            .bearer_auth(token);
        Self::send(request).await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpChartApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChartApi")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}
