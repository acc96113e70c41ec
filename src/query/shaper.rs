use chrono::{TimeZone, Utc};
use tracing::{debug, warn};

use crate::{
    models::{DimensionMap, Frame, FrameMeta, MetricData, MetricsResponse, Point},
    DatasourceError, Result,
};

/// Display identity of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesName {
    /// Frame-level name.
    pub name: String,
    /// Value-field name, used as the legend entry.
    pub field: String,
    pub labels: DimensionMap,
}

/// Derives the naming of a series from its dimension map.
pub fn series_name(metric_id: &str, dimensions: &DimensionMap, label_chart: Option<&str>) -> SeriesName {
    if dimensions.is_empty() {
        return SeriesName {
            name: metric_id.to_string(),
            field: metric_id.to_string(),
            labels: DimensionMap::new(),
        };
    }

    if let Some(label_chart) = label_chart {
        if let Some(value) = dimensions.get(label_chart) {
            // The legend already carries the value; labels would repeat it.
            return SeriesName {
                name: value.clone(),
                field: value.clone(),
                labels: DimensionMap::new(),
            };
        }
        warn!(
            label_chart,
            available = ?dimensions.keys().collect::<Vec<_>>(),
            "Label field not found in dimensionMap"
        );
    }

    let field = dimensions
        .values()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let pairs = dimensions
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(", ");

    SeriesName {
        name: format!("{}{{{}}}", metric_id, pairs),
        field,
        labels: dimensions.clone(),
    }
}

fn points(metric_id: &str, data: &MetricData) -> Result<Vec<Point>> {
    if data.timestamps.len() != data.values.len() {
        return Err(DatasourceError::DecodeError(format!(
            "metric {} has {} timestamps but {} values",
            metric_id,
            data.timestamps.len(),
            data.values.len()
        )));
    }

    data.timestamps
        .iter()
        .zip(&data.values)
        .map(|(&ts, &value)| -> Result<Point> {
            let time = Utc.timestamp_millis_opt(ts).single().ok_or_else(|| {
                DatasourceError::DecodeError(format!("timestamp out of range: {}", ts))
            })?;
            Ok(Point { time, value })
        })
        .collect()
}

/// Flattens a backend response into one frame per data set.
///
/// Fails with `NoData` when no metric carries a single data set.
pub fn shape_response(
    response: &MetricsResponse,
    label_chart: Option<&str>,
    resolution: &str,
) -> Result<Vec<Frame>> {
    if response.result.iter().all(|result| result.data.is_empty()) {
        return Err(DatasourceError::NoData);
    }

    let mut frames = Vec::new();
    for result in &response.result {
        for data in &result.data {
            debug!(
                metric_id = %result.metric_id,
                dimension_count = data.dimension_map.len(),
                "Processing data set"
            );

            let SeriesName { name, field, labels } =
                series_name(&result.metric_id, &data.dimension_map, label_chart);

            frames.push(Frame {
                name,
                field,
                labels,
                points: points(&result.metric_id, data)?,
                meta: FrameMeta {
                    executed_query_string: format!(
                        "Metric: {}, Resolution: {}",
                        result.metric_id, resolution
                    ),
                },
            });
        }
    }

    Ok(frames)
}
