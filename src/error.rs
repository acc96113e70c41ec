use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasourceError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Dynatrace API returned status {status}: {body}")]
    BackendError { status: u16, body: String },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("No data returned from Dynatrace API")]
    NoData,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status attached to a failed query in the host-facing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryStatus {
    BadRequest,
    NotFound,
    Internal,
}

impl DatasourceError {
    pub fn status(&self) -> QueryStatus {
        match self {
            DatasourceError::InvalidQuery(_) => QueryStatus::BadRequest,
            DatasourceError::NoData => QueryStatus::NotFound,
            DatasourceError::BackendUnreachable(_)
            | DatasourceError::BackendError { .. }
            | DatasourceError::DecodeError(_)
            | DatasourceError::Config(_)
            | DatasourceError::Internal(_) => QueryStatus::Internal,
        }
    }

    /// Short label used for the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            DatasourceError::InvalidQuery(_) => "invalid_query",
            DatasourceError::BackendUnreachable(_) => "backend_unreachable",
            DatasourceError::BackendError { .. } => "backend_error",
            DatasourceError::DecodeError(_) => "decode_error",
            DatasourceError::NoData => "no_data",
            DatasourceError::Config(_) => "config",
            DatasourceError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for DatasourceError {
    fn from(err: serde_json::Error) -> Self {
        DatasourceError::DecodeError(err.to_string())
    }
}

impl IntoResponse for DatasourceError {
    fn into_response(self) -> Response {
        let status = match self.status() {
            QueryStatus::BadRequest => StatusCode::BAD_REQUEST,
            QueryStatus::NotFound => StatusCode::NOT_FOUND,
            QueryStatus::Internal => match &self {
                DatasourceError::BackendUnreachable(_) | DatasourceError::BackendError { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DatasourceError>;
