use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::ServerConfig,
    datasource::Datasource,
    metrics,
    models::{CheckHealthResult, HealthStatus, QueryDataRequest, QueryDataResponse},
    DatasourceError, Result,
};

#[derive(Clone)]
pub struct AppState {
    pub datasource: Datasource,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_data))
        .route("/api/health", get(check_health))
        .route("/metrics", get(export_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn query_data(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryDataRequest>, JsonRejection>,
) -> Result<Json<QueryDataResponse>> {
    let Json(request) = payload.map_err(|e| DatasourceError::InvalidQuery(e.body_text()))?;
    Ok(Json(state.datasource.query_data(request).await))
}

async fn check_health(State(state): State<AppState>) -> (StatusCode, Json<CheckHealthResult>) {
    let result = state.datasource.check_health().await;
    let status = match result.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(result))
}

async fn export_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

pub async fn start_server(config: &ServerConfig, datasource: Datasource) -> Result<()> {
    let app = router(AppState { datasource });
    let addr = config.addr();
    info!("Starting datasource server on {}", addr);

    let listener = TcpListener::bind(addr.as_str())
        .await
        .map_err(|e| DatasourceError::Internal(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DatasourceError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasourceSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(settings: DatasourceSettings) -> Router {
        router(AppState {
            datasource: Datasource::new(settings).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = app(DatasourceSettings::default())
            .oneshot(
                Request::post("/api/query")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"queries\": 3}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_unconfigured() {
        let response = app(DatasourceSettings::default())
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let result: CheckHealthResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(result, CheckHealthResult::error("API URL is not configured"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::init_metrics();
        let response = app(DatasourceSettings::default())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("datasource_queries_total"));
    }
}
