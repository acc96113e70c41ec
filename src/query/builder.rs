use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::{debug, info};

use crate::{
    models::{DataQuery, QueryModel, TimeRange},
    DatasourceError, Result,
};

pub const DEFAULT_RESOLUTION: &str = "5m";
pub const METRICS_QUERY_PATH: &str = "/api/v2/metrics/query";

/// Everything the backend needs for one metrics query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub metric_selector: String,
    pub from_ms: i64,
    pub to_ms: i64,
    pub resolution: String,
}

impl BackendRequest {
    /// Renders the query URL against `base_url`, encoding every parameter.
    pub fn url(&self, base_url: &str) -> Result<Url> {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), METRICS_QUERY_PATH);
        let from = self.from_ms.to_string();
        let to = self.to_ms.to_string();
        Url::parse_with_params(
            &endpoint,
            &[
                ("metricSelector", self.metric_selector.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("resolution", self.resolution.as_str()),
            ],
        )
        .map_err(|e| DatasourceError::Config(format!("invalid API URL {}: {}", base_url, e)))
    }
}

/// Folds the legacy `metricId`/`entitySelector` pair into a selector.
///
/// A non-empty `metricSelector` always wins.
pub fn normalize_selector(model: &QueryModel) -> Result<String> {
    let selector = match model.metric_selector.as_deref().filter(|s| !s.is_empty()) {
        Some(selector) => selector.to_string(),
        None => {
            let metric_id = model.metric_id.as_deref().unwrap_or_default();
            info!(metric_id, "Using legacy metricId field");
            match model.entity_selector.as_deref().filter(|s| !s.is_empty()) {
                Some(entity_selector) => {
                    info!(entity_selector, "Added entitySelector to metricSelector");
                    format!("{}:filter({})", metric_id, entity_selector)
                }
                None => metric_id.to_string(),
            }
        }
    };

    if selector.is_empty() {
        return Err(DatasourceError::InvalidQuery(
            "metricSelector or metricId is required".to_string(),
        ));
    }

    Ok(selector)
}

/// Parses a millisecond epoch string.
///
/// Anything that is not a base-10 integer, including relative expressions
/// such as `now-1h` or padded digits, resolves to `now`.
pub fn parse_timestamp(value: Option<&str>, now: DateTime<Utc>) -> i64 {
    match value.and_then(|v| v.parse::<i64>().ok()) {
        Some(ms) => ms,
        None => {
            debug!(value, "Unparseable timestamp, falling back to now");
            now.timestamp_millis()
        }
    }
}

pub fn resolve_window(model: &QueryModel, dashboard: &TimeRange, now: DateTime<Utc>) -> (i64, i64) {
    if model.use_dashboard_time {
        (dashboard.from.timestamp_millis(), dashboard.to.timestamp_millis())
    } else {
        (
            parse_timestamp(model.custom_from.as_deref(), now),
            parse_timestamp(model.custom_to.as_deref(), now),
        )
    }
}

pub fn resolve_resolution(model: &QueryModel) -> String {
    model
        .resolution
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_RESOLUTION)
        .to_string()
}

pub fn build_request(query: &DataQuery, model: &QueryModel, now: DateTime<Utc>) -> Result<BackendRequest> {
    let metric_selector = normalize_selector(model)?;
    let (from_ms, to_ms) = resolve_window(model, &query.time_range, now);
    let resolution = resolve_resolution(model);

    info!(
        ref_id = %query.ref_id,
        metric_selector = %metric_selector,
        use_dashboard_time = model.use_dashboard_time,
        from_ms,
        to_ms,
        resolution = %resolution,
        "Query model resolved"
    );

    Ok(BackendRequest {
        metric_selector,
        from_ms,
        to_ms,
        resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn query(model: serde_json::Value) -> (DataQuery, QueryModel) {
        let query = DataQuery {
            ref_id: "A".into(),
            time_range: TimeRange {
                from: at(1_000),
                to: at(9_000),
            },
            model,
        };
        let model = query.query_model().unwrap();
        (query, model)
    }

    #[test]
    fn test_selector_takes_precedence_over_legacy_fields() {
        let (_, model) = query(json!({
            "metricSelector": "builtin:host.cpu.usage:splitBy(\"dt.entity.host\")",
            "metricId": "builtin:host.mem.usage",
            "entitySelector": "type(HOST)"
        }));
        assert_eq!(
            normalize_selector(&model).unwrap(),
            "builtin:host.cpu.usage:splitBy(\"dt.entity.host\")"
        );
    }

    #[test]
    fn test_legacy_metric_id_with_entity_selector() {
        let (_, model) = query(json!({
            "metricId": "builtin:host.cpu.usage",
            "entitySelector": "type(HOST),tag(prod)"
        }));
        assert_eq!(
            normalize_selector(&model).unwrap(),
            "builtin:host.cpu.usage:filter(type(HOST),tag(prod))"
        );
    }

    #[test]
    fn test_legacy_metric_id_alone() {
        let (_, model) = query(json!({ "metricSelector": "", "metricId": "builtin:host.cpu.usage" }));
        assert_eq!(normalize_selector(&model).unwrap(), "builtin:host.cpu.usage");
    }

    #[test]
    fn test_empty_selector_is_invalid() {
        let (_, model) = query(json!({ "metricSelector": "", "metricId": "" }));
        assert!(matches!(
            normalize_selector(&model),
            Err(DatasourceError::InvalidQuery(_))
        ));

        // An entity selector alone still yields a usable selector string.
        let (_, model) = query(json!({ "entitySelector": "type(HOST)" }));
        assert_eq!(normalize_selector(&model).unwrap(), ":filter(type(HOST))");
    }

    #[test]
    fn test_parse_timestamp_falls_back_to_now() {
        let now = at(42_000);
        assert_eq!(parse_timestamp(Some("1700000000000"), now), 1_700_000_000_000);
        // Relative expressions are not interpreted; they silently resolve to now.
        assert_eq!(parse_timestamp(Some("now-1h"), now), 42_000);
        assert_eq!(parse_timestamp(Some("garbage"), now), 42_000);
        assert_eq!(parse_timestamp(Some(""), now), 42_000);
        assert_eq!(parse_timestamp(None, now), 42_000);
        // No whitespace trimming: padded digits are not a base-10 integer.
        assert_eq!(parse_timestamp(Some(" 1000 "), now), 42_000);
        assert_eq!(parse_timestamp(Some("-5"), now), -5);
    }

    #[test]
    fn test_dashboard_window() {
        let (q, model) = query(json!({
            "metricSelector": "m",
            "useDashboardTime": true,
            "customFrom": "5",
            "customTo": "6"
        }));
        assert_eq!(resolve_window(&model, &q.time_range, at(0)), (1_000, 9_000));
    }

    #[test]
    fn test_custom_window_resolves_each_end_independently() {
        let (q, model) = query(json!({
            "metricSelector": "m",
            "useDashboardTime": false,
            "customFrom": "1700000000000",
            "customTo": "now"
        }));
        assert_eq!(
            resolve_window(&model, &q.time_range, at(1_700_000_360_000)),
            (1_700_000_000_000, 1_700_000_360_000)
        );
    }

    #[test]
    fn test_resolution_default_and_passthrough() {
        let (_, model) = query(json!({ "metricSelector": "m" }));
        assert_eq!(resolve_resolution(&model), "5m");

        let (_, model) = query(json!({ "metricSelector": "m", "resolution": "1h" }));
        assert_eq!(resolve_resolution(&model), "1h");

        let (_, model) = query(json!({ "metricSelector": "m", "resolution": "" }));
        assert_eq!(resolve_resolution(&model), "5m");
    }

    #[test]
    fn test_build_request() {
        let (q, model) = query(json!({
            "metricId": "builtin:host.cpu.usage",
            "useDashboardTime": true
        }));
        let request = build_request(&q, &model, at(0)).unwrap();
        assert_eq!(
            request,
            BackendRequest {
                metric_selector: "builtin:host.cpu.usage".into(),
                from_ms: 1_000,
                to_ms: 9_000,
                resolution: "5m".into(),
            }
        );
    }

    #[test]
    fn test_url_encodes_selector() {
        let request = BackendRequest {
            metric_selector: "builtin:host.cpu.usage:filter(eq(\"host\",\"a b\"))".into(),
            from_ms: 1,
            to_ms: 2,
            resolution: "1m".into(),
        };
        let url = request.url("https://dt.example.com/e/abc/").unwrap();

        assert_eq!(url.path(), "/e/abc/api/v2/metrics/query");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "metricSelector".to_string(),
                    "builtin:host.cpu.usage:filter(eq(\"host\",\"a b\"))".to_string()
                ),
                ("from".to_string(), "1".to_string()),
                ("to".to_string(), "2".to_string()),
                ("resolution".to_string(), "1m".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_rejects_garbage_base() {
        let request = BackendRequest {
            metric_selector: "m".into(),
            from_ms: 1,
            to_ms: 2,
            resolution: "1m".into(),
        };
        assert!(matches!(
            request.url("not a url"),
            Err(DatasourceError::Config(_))
        ));
    }
}
