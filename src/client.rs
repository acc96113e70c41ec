use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    config::DatasourceSettings,
    metrics::BackendTimer,
    models::MetricsResponse,
    query::BackendRequest,
    DatasourceError, Result,
};

/// Fixed per-request timeout for backend calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport to the metrics backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Runs one metrics query and decodes the response body.
    async fn query_metrics(&self, request: &BackendRequest) -> Result<MetricsResponse>;

    /// Calls the unauthenticated liveness endpoint.
    async fn health(&self) -> Result<()>;
}

/// Dynatrace Metrics API v2 over HTTPS.
#[derive(Clone)]
pub struct HttpBackendClient {
    api_url: String,
    api_token: String,
    client: reqwest::Client,
}

impl HttpBackendClient {
    pub fn new(settings: &DatasourceSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(concat!("dynatrace-datasource/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT);

        if settings.tls_skip_verify {
            warn!("TLS certificate verification is disabled - this is insecure!");
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(pem) = &settings.tls_certificate {
            for certificate in parse_pem_certificates(pem)? {
                builder = builder.add_root_certificate(certificate);
            }
            info!("Using custom TLS certificate");
        }

        let client = builder
            .build()
            .map_err(|e| DatasourceError::Config(format!("error creating HTTP client: {}", e)))?;

        Ok(Self {
            api_url: settings.api_url.clone(),
            api_token: settings.api_token.clone(),
            client,
        })
    }
}

/// Parses every certificate in a PEM bundle; an empty bundle is an error.
pub fn parse_pem_certificates(pem: &str) -> Result<Vec<reqwest::Certificate>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DatasourceError::Config(format!("failed to parse TLS certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(DatasourceError::Config(
            "failed to parse TLS certificate".to_string(),
        ));
    }

    certs
        .iter()
        .map(|der| {
            reqwest::Certificate::from_der(der.as_ref()).map_err(|e| {
                DatasourceError::Config(format!("failed to parse TLS certificate: {}", e))
            })
        })
        .collect()
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn query_metrics(&self, request: &BackendRequest) -> Result<MetricsResponse> {
        let url = request.url(&self.api_url)?;
        info!(url = %url, "Querying Dynatrace API");

        let _timer = BackendTimer::new();
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Api-Token {}", self.api_token))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                DatasourceError::BackendUnreachable(format!("error executing request: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatasourceError::BackendError {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            DatasourceError::BackendUnreachable(format!("error reading response: {}", e))
        })?;
        let body: MetricsResponse = serde_json::from_slice(&bytes)
            .map_err(|e| DatasourceError::DecodeError(format!("error decoding response: {}", e)))?;

        info!(
            total_count = body.total_count,
            results = body.result.len(),
            "Dynatrace API response"
        );

        Ok(body)
    }

    async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.api_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            DatasourceError::BackendUnreachable(format!("Error connecting to Dynatrace API: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatasourceError::BackendError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
