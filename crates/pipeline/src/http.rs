//! HTTP client for the remote adjustments API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use fledger_adjustments::{ForecastPoint, IntervalSnapshot};

use crate::config::PipelineConfig;
use crate::error::ServiceError;
use crate::service::{PersistenceService, ValidationResult, ValidationService};

/// Talks to `{base}/adjustments/validate`, `{base}/adjustments/save` and
/// `{base}/forecast/series`.
#[derive(Debug, Clone)]
pub struct HttpAdjustmentsClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct AdjustmentsRequest<'a> {
    adjustments: &'a [IntervalSnapshot],
}

impl HttpAdjustmentsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build from configuration; `None` when no base URL is configured.
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        let base_url = config.api_base_url.as_deref()?;
        let mut client = Self::new(base_url);
        client.token = config.api_token.clone();
        Some(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the forecast series to load into the store.
    pub async fn fetch_forecast_series(&self) -> Result<Vec<ForecastPoint>, ServiceError> {
        let url = format!("{}/forecast/series", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let body = Self::send_json(req).await?;
        parse_series(body)
    }

    fn post_adjustments(&self, path: &str, batch: &[IntervalSnapshot]) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .client
            .post(&url)
            .json(&AdjustmentsRequest { adjustments: batch });
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(req: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let resp = req.send().await.map_err(|e| ServiceError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Api(status.as_u16(), resp.text().await.unwrap_or_default()));
        }
        Ok(resp)
    }

    async fn send_json(req: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let resp = Self::send(req).await?;
        let text = resp.text().await.map_err(|e| ServiceError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ServiceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ValidationService for HttpAdjustmentsClient {
    async fn validate(&self, batch: &[IntervalSnapshot]) -> Result<Vec<ValidationResult>, ServiceError> {
        let body = Self::send_json(self.post_adjustments("/adjustments/validate", batch)).await?;
        parse_validation_results(body)
    }
}

#[async_trait]
impl PersistenceService for HttpAdjustmentsClient {
    async fn save(&self, batch: &[IntervalSnapshot]) -> Result<(), ServiceError> {
        // Any 2xx is a successful save, whatever the body holds.
        Self::send(self.post_adjustments("/adjustments/save", batch)).await.map(|_| ())
    }
}

/// Read `{ "results": [...] }`, skipping entries that cannot be understood.
fn parse_validation_results(body: Value) -> Result<Vec<ValidationResult>, ServiceError> {
    let Value::Object(mut map) = body else {
        return Err(ServiceError::Parse("validation response is not an object".to_string()));
    };
    let Some(Value::Array(entries)) = map.remove("results") else {
        return Err(ServiceError::Parse("validation response has no results array".to_string()));
    };

    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<ValidationResult>(entry) {
            Ok(result) => results.push(result),
            Err(e) => tracing::debug!(error = %e, "skipping unreadable validation result"),
        }
    }
    Ok(results)
}

/// Read a forecast series: `{ "series": [...] }` or a bare array.
pub fn parse_series(body: Value) -> Result<Vec<ForecastPoint>, ServiceError> {
    let series = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => map.remove("series").unwrap_or(Value::Array(Vec::new())),
        _ => return Err(ServiceError::Parse("forecast series is not an object or array".to_string())),
    };
    serde_json::from_value(series).map_err(|e| ServiceError::Parse(e.to_string()))
}
