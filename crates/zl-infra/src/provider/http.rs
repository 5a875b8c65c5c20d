//! HTTP pairing-provider adapter
//!
//! Thin reqwest client over the provider's five instance endpoints.
//! Raw JSON goes straight through the normalizers in
//! `zl_core::connection::normalize`; nothing above this layer ever
//! sees a provider payload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};

use zl_core::connection::normalize::{extract_instance_id, normalize_pairing, normalize_status};
use zl_core::ids::InstanceName;
use zl_core::ports::errors::ProviderError;
use zl_core::ports::pairing_provider::{InstanceCreated, PairingOutcome, PairingProviderPort};
use zl_core::StatusPayload;

/// Longest error-body excerpt carried into a `ProviderError`.
const ERROR_SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Provider base URL, without a trailing slash
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Lifetime stamped onto pairing codes at fetch time
    pub qr_lifetime: Duration,
}

impl HttpProviderConfig {
    /// Reads the provider location and credentials from the process
    /// environment (a `.env` file is honored when present).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("ZAPLINK_PROVIDER_URL")
            .map_err(|_| anyhow::anyhow!("ZAPLINK_PROVIDER_URL is not set"))?;
        let api_key = std::env::var("ZAPLINK_PROVIDER_API_KEY")
            .map_err(|_| anyhow::anyhow!("ZAPLINK_PROVIDER_API_KEY is not set"))?;
        Ok(Self {
            base_url,
            api_key,
            request_timeout: env_secs("ZAPLINK_REQUEST_TIMEOUT_SECS")
                .unwrap_or(Duration::from_secs(15)),
            qr_lifetime: env_secs("ZAPLINK_QR_LIFETIME_SECS").unwrap_or(Duration::from_secs(60)),
        })
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub struct HttpPairingProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpPairingProvider {
    pub fn new(config: HttpProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ProviderError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self
            .client
            .request(method, &url)
            .header("apikey", &self.config.api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: snippet(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| ProviderError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl PairingProviderPort for HttpPairingProvider {
    async fn create_instance(&self, name: &InstanceName) -> Result<InstanceCreated, ProviderError> {
        let body = json!({ "instanceName": name.as_str(), "qrcode": true });
        let raw = self
            .request(Method::POST, "instance/create", Some(body))
            .await?;
        Ok(InstanceCreated {
            external_instance_id: extract_instance_id(&raw),
        })
    }

    async fn fetch_pairing(&self, name: &InstanceName) -> Result<PairingOutcome, ProviderError> {
        let path = format!("instance/connect/{}", name.as_str());
        let raw = self.request(Method::GET, &path, None).await?;

        if let Some(code) =
            normalize_pairing(&raw, chrono::Utc::now(), self.config.qr_lifetime)
        {
            return Ok(PairingOutcome::Code(code));
        }

        // Already-paired instances answer with their session state
        // instead of a code.
        let status = normalize_status(&raw);
        if status.connected {
            return Ok(PairingOutcome::AlreadyConnected(
                status.profile.unwrap_or_default(),
            ));
        }

        Err(ProviderError::Malformed(
            "no pairing code in connect response".to_string(),
        ))
    }

    async fn check_status(&self, name: &InstanceName) -> Result<StatusPayload, ProviderError> {
        let path = format!("instance/connectionState/{}", name.as_str());
        let raw = self.request(Method::GET, &path, None).await?;
        Ok(normalize_status(&raw))
    }

    async fn disconnect(&self, name: &InstanceName) -> Result<(), ProviderError> {
        let path = format!("instance/logout/{}", name.as_str());
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn delete_instance(&self, name: &InstanceName) -> Result<(), ProviderError> {
        let path = format!("instance/delete/{}", name.as_str());
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(ERROR_SNIPPET_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
