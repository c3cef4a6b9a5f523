//! HTTP cloud data-plane client
//!
//! A thin `reqwest::Client` wrapper implementing
//! [`shadow_core::ports::CloudDataPlane`]: GET/POST/DELETE a shadow
//! document against the cloud shadow service's REST surface.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use shadow_core::domain::{CloudError, ShadowKey};
use shadow_core::ports::{CloudDataPlane, CloudDocument};
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based implementation of the cloud data-plane port.
pub struct HttpCloudDataPlane {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpCloudDataPlane {
    /// Creates a client against `base_url` (e.g.
    /// `https://data.iot.example.com`) authenticating with `auth_token`
    /// as a bearer token.
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build().unwrap_or_default();
        Self { client, base_url: base_url.into(), auth_token: auth_token.into() }
    }

    fn document_url(&self, key: &ShadowKey) -> String {
        match &key.shadow {
            Some(name) => format!("{}/things/{}/shadow?name={}", self.base_url, key.thing, name),
            None => format!("{}/things/{}/shadow", self.base_url, key.thing),
        }
    }

    async fn classify(response: reqwest::Response) -> Result<reqwest::Response, CloudError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => CloudError::NotFound,
            StatusCode::CONFLICT => CloudError::Conflict,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloudError::Unauthorized,
            StatusCode::METHOD_NOT_ALLOWED => CloudError::MethodNotAllowed,
            StatusCode::UNSUPPORTED_MEDIA_TYPE => CloudError::UnsupportedEncoding,
            StatusCode::PAYLOAD_TOO_LARGE => CloudError::RequestEntityTooLarge,
            StatusCode::TOO_MANY_REQUESTS => CloudError::Throttling,
            StatusCode::SERVICE_UNAVAILABLE => CloudError::ServiceUnavailable,
            s if s.is_server_error() => CloudError::InternalFailure,
            s if s.is_client_error() => CloudError::InvalidRequest(body),
            _ => CloudError::Client(format!("unexpected status {status}: {body}")),
        })
    }

    fn transport_error(err: reqwest::Error) -> CloudError {
        if err.is_timeout() {
            CloudError::Timeout
        } else {
            CloudError::ServiceUnavailable
        }
    }
}

#[async_trait::async_trait]
impl CloudDataPlane for HttpCloudDataPlane {
    async fn get_document(&self, key: &ShadowKey) -> Result<CloudDocument, CloudError> {
        let response = self
            .client
            .get(self.document_url(key))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::classify(response).await?;

        let version = parse_version_header(&response);
        let update_time = parse_update_time_header(&response);
        let bytes = response.bytes().await.map_err(Self::transport_error)?.to_vec();

        debug!(key = %key, version, "fetched cloud shadow document");
        Ok(CloudDocument { bytes, version, update_time })
    }

    async fn update_document(&self, key: &ShadowKey, patch_bytes: &[u8]) -> Result<CloudDocument, CloudError> {
        let response = self
            .client
            .post(self.document_url(key))
            .bearer_auth(&self.auth_token)
            .header("content-type", "application/json")
            .body(patch_bytes.to_vec())
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::classify(response).await?;

        let version = parse_version_header(&response);
        let update_time = parse_update_time_header(&response);
        let bytes = response.bytes().await.map_err(Self::transport_error)?.to_vec();

        debug!(key = %key, version, "updated cloud shadow document");
        Ok(CloudDocument { bytes, version, update_time })
    }

    async fn delete_document(&self, key: &ShadowKey) -> Result<u64, CloudError> {
        let response = self
            .client
            .delete(self.document_url(key))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::classify(response).await?;
        let version = parse_version_header(&response);

        debug!(key = %key, version, "deleted cloud shadow document");
        Ok(version)
    }
}

fn parse_version_header(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("x-shadow-version")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn parse_update_time_header(response: &reqwest::Response) -> i64 {
    response
        .headers()
        .get("x-shadow-update-time")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
