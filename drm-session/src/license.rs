use crate::DrmError;
use base64::Engine;
use drm_cenc::SystemId;
use log::debug;
use reqwest::{blocking::Client, header};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// One license round trip.
#[derive(Clone, Debug)]
pub struct LicenseRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    /// Sent as a bearer token.
    pub token: Option<Arc<str>>,
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LicenseResponse {
    pub body: Vec<u8>,
    pub status: u16,
}

/// Network side of license acquisition.
///
/// Timeouts, connection failures and non-2xx responses are all reported as
/// [`DrmError::LicenseTransport`].
pub trait LicenseClient: Send + Sync {
    fn fetch(&self, request: &LicenseRequest) -> Result<LicenseResponse, DrmError>;
}

pub struct HttpLicenseClient {
    client: Client,
}

impl HttpLicenseClient {
    pub fn new() -> Result<Self, DrmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DrmError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl LicenseClient for HttpLicenseClient {
    fn fetch(&self, request: &LicenseRequest) -> Result<LicenseResponse, DrmError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .header(header::CONTENT_TYPE, &request.content_type);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .map_err(|e| DrmError::LicenseTransport {
                status: e.status().map(|x| x.as_u16()),
                message: if e.is_timeout() {
                    format!("timed out after {:?}", request.timeout)
                } else {
                    e.to_string()
                },
            })?;
        let status = response.status();

        if !status.is_success() {
            return Err(DrmError::LicenseTransport {
                status: Some(status.as_u16()),
                message: response.text().unwrap_or_default(),
            });
        }

        let body = response.bytes().map_err(|e| DrmError::LicenseTransport {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        debug!("license response of {} bytes from {}", body.len(), request.url);
        Ok(LicenseResponse {
            body: body.to_vec(),
            status: status.as_u16(),
        })
    }
}

/// `Content-Type` of a bare challenge for `system`.
pub(crate) fn content_type(system: SystemId) -> &'static str {
    match system {
        SystemId::PlayReady => "text/xml; charset=utf-8",
        SystemId::ClearKey | SystemId::Common => "application/json",
        _ => "application/octet-stream",
    }
}

pub(crate) const ENVELOPE_CONTENT_TYPE: &str = "application/json";

/// JSON license request used when the init data carries content metadata.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LicenseEnvelope {
    pub(crate) key_system: String,
    pub(crate) media_usage: String,
    /// Base64 challenge.
    pub(crate) license_request: String,
    pub(crate) content_metadata: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) access_token: Option<String>,
}

#[derive(Deserialize)]
struct EnvelopeResponse {
    license: String,
}

pub(crate) fn wrap_challenge(
    system: SystemId,
    challenge: &[u8],
    content_metadata: &[u8],
    token: Option<&str>,
) -> Result<Vec<u8>, DrmError> {
    let envelope = LicenseEnvelope {
        key_system: system.name().to_owned(),
        media_usage: "stream".to_owned(),
        license_request: base64::engine::general_purpose::STANDARD.encode(challenge),
        content_metadata: String::from_utf8_lossy(content_metadata).into_owned(),
        access_token: token.map(str::to_owned),
    };

    serde_json::to_vec(&envelope).map_err(|e| DrmError::Config(e.to_string()))
}

pub(crate) fn unwrap_license(body: &[u8]) -> Result<Vec<u8>, DrmError> {
    let response = serde_json::from_slice::<EnvelopeResponse>(body)
        .map_err(|e| DrmError::LicenseRejected(format!("invalid license envelope: {e}")))?;

    base64::engine::general_purpose::STANDARD
        .decode(response.license.trim())
        .map_err(|e| DrmError::LicenseRejected(format!("invalid license envelope: {e}")))
}
