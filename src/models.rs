use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DatasourceError, QueryStatus};

/// Dimension key/value pairs in the order the backend sent them.
pub type DimensionMap = IndexMap<String, String>;

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn flexible_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TimeValue {
        Millis(i64),
        Rfc3339(DateTime<Utc>),
    }

    match TimeValue::deserialize(deserializer)? {
        TimeValue::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        TimeValue::Rfc3339(time) => Ok(time),
    }
}

/// Query options as sent by the query editor.
///
/// Both legacy (`metricId`, `entitySelector`) and current fields are accepted;
/// unknown fields such as `queryText` or `constant` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryModel {
    pub metric_selector: Option<String>,
    /// Deprecated, superseded by `metric_selector`.
    pub metric_id: Option<String>,
    /// Deprecated, folded into the selector as a `:filter(..)` clause.
    pub entity_selector: Option<String>,
    #[serde(alias = "useDashboardWindow", deserialize_with = "null_as_default")]
    pub use_dashboard_time: bool,
    pub custom_from: Option<String>,
    pub custom_to: Option<String>,
    pub resolution: Option<String>,
    /// Dimension key whose value becomes the series name.
    #[serde(alias = "labelField")]
    pub label_chart: Option<String>,
}

impl QueryModel {
    pub fn label_chart(&self) -> Option<&str> {
        self.label_chart.as_deref().filter(|field| !field.is_empty())
    }
}

/// Dashboard time window supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(deserialize_with = "flexible_time")]
    pub from: DateTime<Utc>,
    #[serde(deserialize_with = "flexible_time")]
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    pub time_range: TimeRange,
    /// Raw editor model, decoded per query so one bad query cannot fail the batch.
    #[serde(default, alias = "json")]
    pub model: serde_json::Value,
}

impl DataQuery {
    pub fn query_model(&self) -> crate::Result<QueryModel> {
        if self.model.is_null() {
            return Ok(QueryModel::default());
        }
        QueryModel::deserialize(&self.model)
            .map_err(|e| DatasourceError::InvalidQuery(format!("json unmarshal: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDataRequest {
    pub queries: Vec<DataQuery>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryDataResponse {
    /// Keyed by `refId`, in request order.
    pub results: IndexMap<String, DataResponse>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DataResponse {
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QueryStatus>,
}

impl DataResponse {
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            error: None,
            status: None,
        }
    }

    pub fn from_error(err: &DatasourceError) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(err.to_string()),
            status: Some(err.status()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One flat time series ready for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub name: String,
    /// Name of the value field, shown as the legend entry.
    pub field: String,
    pub labels: DimensionMap,
    pub points: Vec<Point>,
    pub meta: FrameMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub time: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    pub executed_query_string: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    pub message: String,
}

impl CheckHealthResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }
}

// Dynatrace Metrics API v2 response body.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_count: u64,
    #[serde(default)]
    pub next_page_key: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<MetricResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_point_count_ratio: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dimension_count_ratio: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<MetricData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub dimensions: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dimension_map: DimensionMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamps: Vec<i64>,
    /// `null` entries are gaps in the series.
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<Option<f64>>,
}
