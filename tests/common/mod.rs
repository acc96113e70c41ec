use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const TOKEN: &str = "dt0c01.sample.token1";

/// Query strings the fake backend received, in arrival order.
pub type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// In-process stand-in for the Dynatrace Metrics API v2.
pub struct FakeBackend {
    pub url: String,
    pub seen: Seen,
}

pub async fn spawn_backend(healthy: bool) -> FakeBackend {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/api/v2/metrics/query", get(query_metrics))
        .route(
            "/health",
            get(move || async move {
                if healthy {
                    (StatusCode::OK, "{\"status\":\"ok\"}")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database offline")
                }
            }),
        )
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend {
        url: format!("http://{}", addr),
        seen,
    }
}

/// A base URL nothing listens on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn query_metrics(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Api-Token {}", TOKEN))
        .unwrap_or(false);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            "{\"error\":{\"code\":401,\"message\":\"Invalid API token\"}}",
        )
            .into_response();
    }

    let selector = params.get("metricSelector").cloned().unwrap_or_default();
    seen.lock().unwrap().push(params);

    match selector.as_str() {
        "builtin:host.cpu.usage:splitBy(\"dt.entity.host\")" => Json(json!({
            "totalCount": 2,
            "nextPageKey": null,
            "resolution": "5m",
            "result": [{
                "metricId": "builtin:host.cpu.usage:splitBy(\"dt.entity.host\")",
                "dataPointCountRatio": 0.001,
                "dimensionCountRatio": 0.01,
                "data": [
                    {
                        "dimensions": ["HOST-A"],
                        "dimensionMap": { "dt.entity.host": "HOST-A" },
                        "timestamps": [1700000000000i64, 1700000300000i64, 1700000600000i64],
                        "values": [12.5, null, 14.0]
                    },
                    {
                        "dimensions": ["HOST-B"],
                        "dimensionMap": { "dt.entity.host": "HOST-B" },
                        "timestamps": [1700000000000i64, 1700000300000i64, 1700000600000i64],
                        "values": [50.0, 51.5, 49.0]
                    }
                ]
            }]
        }))
        .into_response(),
        "builtin:host.mem.usage" => Json(json!({
            "totalCount": 1,
            "resolution": "1h",
            "result": [{
                "metricId": "builtin:host.mem.usage",
                "data": [{
                    "dimensions": [],
                    "dimensionMap": {},
                    "timestamps": [1000, 2000],
                    "values": [1.5, 2.5]
                }]
            }]
        }))
        .into_response(),
        "empty" => Json(json!({ "totalCount": 0, "result": [] })).into_response(),
        "broken" => (StatusCode::OK, "{\"result\": [").into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            format!(
                "{{\"error\":{{\"code\":404,\"message\":\"No metrics found matching selector '{}'\"}}}}",
                selector
            ),
        )
            .into_response(),
    }
}
