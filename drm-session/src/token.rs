use crate::DrmError;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

/// Fetches the access token attached to license requests.
pub trait TokenSource: Send + Sync {
    fn fetch(&self) -> Result<String, DrmError>;
}

/// Token service answering `GET` with `{"status": 0, "token": "..."}`.
pub struct HttpTokenSource {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    status: i64,
    token: Option<String>,
}

impl HttpTokenSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DrmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DrmError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl TokenSource for HttpTokenSource {
    fn fetch(&self) -> Result<String, DrmError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| DrmError::AccessToken(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            return Err(DrmError::AccessToken(format!(
                "token service returned http status {status}"
            )));
        }

        let body = response
            .json::<TokenResponse>()
            .map_err(|e| DrmError::AccessToken(e.to_string()))?;

        match body.token {
            Some(token) if body.status == 0 && !token.is_empty() => Ok(token),
            _ => Err(DrmError::AccessToken(format!(
                "token service returned status {}",
                body.status
            ))),
        }
    }
}

/// Access token of one player. Set once, read by every license request,
/// cleared on teardown.
pub struct AccessToken {
    value: RwLock<Option<Arc<str>>>,
    source: Option<Arc<dyn TokenSource>>,
    fetch_lock: Mutex<()>,
}

impl AccessToken {
    pub fn new(source: Option<Arc<dyn TokenSource>>) -> Self {
        Self {
            value: RwLock::new(None),
            source,
            fetch_lock: Mutex::new(()),
        }
    }

    /// Store `token` unless one is already set. Returns whether it was stored.
    pub fn set(&self, token: &str) -> bool {
        let mut value = self.value.write();

        if value.is_some() {
            debug!("access token already set, keeping it");
            return false;
        }

        *value = Some(Arc::from(token));
        true
    }

    /// The current token without fetching.
    pub fn current(&self) -> Option<Arc<str>> {
        self.value.read().clone()
    }

    /// The current token, fetched from the token source on first use.
    pub fn get(&self) -> Result<Option<Arc<str>>, DrmError> {
        if let Some(token) = self.current() {
            return Ok(Some(token));
        }

        let Some(source) = &self.source else {
            return Ok(None);
        };

        let _guard = self.fetch_lock.lock();

        if let Some(token) = self.current() {
            return Ok(Some(token));
        }

        let token: Arc<str> = Arc::from(source.fetch()?);
        info!("access token fetched ({} bytes)", token.len());
        *self.value.write() = Some(token.clone());
        Ok(Some(token))
    }

    pub fn clear(&self) {
        *self.value.write() = None;
    }
}
