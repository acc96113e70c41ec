use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    client::{BackendClient, HttpBackendClient},
    config::{DatasourceSettings, InstanceSettings},
    metrics,
    models::{CheckHealthResult, DataQuery, DataResponse, Frame, QueryDataRequest, QueryDataResponse},
    query::{build_request, shape_response},
    DatasourceError, Result,
};

/// One configured Dynatrace datasource.
///
/// Immutable after construction, so concurrent queries need no locking.
#[derive(Clone)]
pub struct Datasource {
    settings: Arc<DatasourceSettings>,
    client: Arc<dyn BackendClient>,
}

impl Datasource {
    pub fn new(settings: DatasourceSettings) -> Result<Self> {
        let client = HttpBackendClient::new(&settings)?;
        Ok(Self::with_client(settings, Arc::new(client)))
    }

    pub fn from_instance(instance: &InstanceSettings) -> Result<Self> {
        Self::new(DatasourceSettings::from_instance(instance)?)
    }

    pub fn with_client(settings: DatasourceSettings, client: Arc<dyn BackendClient>) -> Self {
        Self {
            settings: Arc::new(settings),
            client,
        }
    }

    pub fn settings(&self) -> &DatasourceSettings {
        &self.settings
    }

    /// Runs every query of the batch concurrently; each gets its own response.
    pub async fn query_data(&self, request: QueryDataRequest) -> QueryDataResponse {
        info!(queries = request.queries.len(), "QueryData called");

        let now = Utc::now();
        let responses = join_all(request.queries.iter().map(|query| self.query(query, now))).await;

        QueryDataResponse {
            results: request
                .queries
                .into_iter()
                .map(|query| query.ref_id)
                .zip(responses)
                .collect(),
        }
    }

    async fn query(&self, query: &DataQuery, now: DateTime<Utc>) -> DataResponse {
        metrics::record_query();
        match self.run_query(query, now).await {
            Ok(frames) => {
                metrics::record_frames(frames.len());
                DataResponse::from_frames(frames)
            }
            Err(e) => {
                warn!(ref_id = %query.ref_id, kind = e.kind(), error = %e, "Query failed");
                metrics::record_query_failure(e.kind());
                DataResponse::from_error(&e)
            }
        }
    }

    /// Builds the backend request, calls the backend and shapes the result.
    pub async fn run_query(&self, query: &DataQuery, now: DateTime<Utc>) -> Result<Vec<Frame>> {
        let model = query.query_model()?;
        let request = build_request(query, &model, now)?;
        let response = self.client.query_metrics(&request).await?;
        shape_response(&response, model.label_chart(), &request.resolution)
    }

    pub async fn check_health(&self) -> CheckHealthResult {
        info!("CheckHealth called");

        let result = if self.settings.api_url.is_empty() {
            CheckHealthResult::error("API URL is not configured")
        } else if self.settings.api_token.is_empty() {
            CheckHealthResult::error("API Token is not configured")
        } else {
            match self.client.health().await {
                Ok(()) => CheckHealthResult::ok("Successfully connected to Dynatrace API"),
                Err(DatasourceError::BackendError { status, body }) => CheckHealthResult::error(
                    format!("Dynatrace API health check failed (status {}): {}", status, body),
                ),
                Err(DatasourceError::BackendUnreachable(message)) => {
                    CheckHealthResult::error(message)
                }
                Err(e) => CheckHealthResult::error(e.to_string()),
            }
        };

        metrics::record_health_check(result.status == crate::models::HealthStatus::Ok);
        result
    }
}
