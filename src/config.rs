use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use tracing::info;

use crate::{DatasourceError, Result};

/// Connection settings for one datasource instance.
///
/// Built once and shared read-only by every query the instance serves.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatasourceSettings {
    pub api_url: String,
    pub api_token: String,
    pub tls_skip_verify: bool,
    /// PEM bundle trusted as root CA, if any.
    pub tls_certificate: Option<String>,
}

// The token must never reach the logs.
impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("api_url", &self.api_url)
            .field("api_token", &if self.api_token.is_empty() { "" } else { "***" })
            .field("tls_skip_verify", &self.tls_skip_verify)
            .field("tls_certificate", &self.tls_certificate.is_some())
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonData {
    api_url: Option<String>,
    tls_skip_verify: Option<bool>,
}

/// Instance settings as the host stores them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSettings {
    pub json_data: serde_json::Value,
    pub decrypted_secure_json_data: HashMap<String, String>,
}

impl DatasourceSettings {
    /// Reads `apiUrl`/`tlsSkipVerify` from the plain settings and
    /// `apiToken`/`tlsCertificate` from the decrypted secure settings.
    pub fn from_instance(instance: &InstanceSettings) -> Result<Self> {
        let json_data = if instance.json_data.is_null() {
            JsonData::default()
        } else {
            JsonData::deserialize(&instance.json_data)
                .map_err(|e| DatasourceError::Config(format!("error unmarshaling settings: {}", e)))?
        };

        let secure = &instance.decrypted_secure_json_data;
        Ok(Self {
            api_url: json_data.api_url.unwrap_or_default(),
            api_token: secure.get("apiToken").cloned().unwrap_or_default(),
            tls_skip_verify: json_data.tls_skip_verify.unwrap_or(false),
            tls_certificate: secure
                .get("tlsCertificate")
                .filter(|pem| !pem.trim().is_empty())
                .cloned(),
        }
        .normalized())
    }

    /// Reads `DT_API_URL`, `DT_API_TOKEN`, `DT_TLS_SKIP_VERIFY` and
    /// `DT_TLS_CERTIFICATE` (a PEM file path or inline PEM).
    pub fn from_env() -> Result<Self> {
        let tls_certificate = match env::var("DT_TLS_CERTIFICATE") {
            Ok(value) if value.contains("-----BEGIN") => Some(value),
            Ok(path) if !path.trim().is_empty() => Some(std::fs::read_to_string(&path).map_err(|e| {
                DatasourceError::Config(format!("Failed to read TLS certificate {}: {}", path, e))
            })?),
            _ => None,
        };

        let settings = Self {
            api_url: env::var("DT_API_URL").unwrap_or_default(),
            api_token: env::var("DT_API_TOKEN").unwrap_or_default(),
            tls_skip_verify: env::var("DT_TLS_SKIP_VERIFY")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            tls_certificate,
        }
        .normalized();

        info!(
            api_url = %settings.api_url,
            token_configured = !settings.api_token.is_empty(),
            tls_skip_verify = settings.tls_skip_verify,
            custom_ca = settings.tls_certificate.is_some(),
            "Datasource settings loaded"
        );

        Ok(settings)
    }

    fn normalized(mut self) -> Self {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        self
    }
}

/// Listener settings for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let port = match env::var("PORT") {
            Ok(port) => port
                .parse()
                .map_err(|e| DatasourceError::Config(format!("invalid PORT {}: {}", port, e)))?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
