use crate::DrmError;
use drm_cenc::SystemId;
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};

pub const MIN_SESSIONS: usize = 1;
pub const MAX_SESSIONS: usize = 30;

/// Player side DRM settings.
///
/// Every field has a default, so a host only lists what it overrides.
///
/// ```
/// use drm_session::DrmConfig;
///
/// let config = DrmConfig::from_json(r#"{ "max_sessions": 4, "preferred_drm": "playready" }"#).unwrap();
/// assert_eq!(config.max_sessions, 4);
/// assert_eq!(config.cdm_wait_timeout_ms, 2000);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DrmConfig {
    /// Number of cached sessions, clamped to `1..=30`.
    pub max_sessions: usize,
    /// How long to wait for a CDM challenge or key status callback.
    pub cdm_wait_timeout_ms: u64,
    /// How long a key that failed with a key error is not retried.
    pub failed_key_window_ms: u64,
    pub license_timeout_ms: u64,
    /// Extra attempts after a license transport failure.
    pub license_retry_count: u32,
    pub license_retry_wait_ms: u64,
    pub playready_license_url: Option<String>,
    pub widevine_license_url: Option<String>,
    pub clearkey_license_url: Option<String>,
    /// Prefer the configured license server over the one the CDM asks for.
    pub license_server_override: bool,
    pub license_headers: BTreeMap<String, String>,
    /// Never attach the access token to license requests.
    pub anonymous_license_request: bool,
    /// Require HDCP 2.2 before decrypting UHD PlayReady content.
    pub enable_playready_output_protection: bool,
    pub preferred_drm: Option<String>,
    /// Pause between stopping the CDM helper and terminating the player.
    pub fatal_flush_delay_ms: u64,
    /// CDM helper processes stopped on hardware failure, first running one wins.
    pub cdm_helper_processes: Vec<String>,
    /// Endpoint returning `{"status": 0, "token": "..."}`.
    pub token_url: Option<String>,
}

impl Default for DrmConfig {
    fn default() -> Self {
        Self {
            max_sessions: 2,
            cdm_wait_timeout_ms: 2000,
            failed_key_window_ms: 30_000,
            license_timeout_ms: 10_000,
            license_retry_count: 0,
            license_retry_wait_ms: 500,
            playready_license_url: None,
            widevine_license_url: None,
            clearkey_license_url: None,
            license_server_override: false,
            license_headers: BTreeMap::new(),
            anonymous_license_request: false,
            enable_playready_output_protection: false,
            preferred_drm: None,
            fatal_flush_delay_ms: 5000,
            cdm_helper_processes: vec!["WPEcdmi".to_owned(), "WPEFramework".to_owned()],
            token_url: None,
        }
    }
}

impl DrmConfig {
    pub fn from_json(data: &str) -> Result<Self, DrmError> {
        let config = serde_json::from_str::<Self>(data)
            .map_err(|e| DrmError::Config(e.to_string()))?;
        config.validated()
    }

    /// Clamp the session count and check values that cannot be clamped.
    pub fn validated(mut self) -> Result<Self, DrmError> {
        self.max_sessions = self.max_sessions.clamp(MIN_SESSIONS, MAX_SESSIONS);

        if self.cdm_wait_timeout_ms == 0 {
            return Err(DrmError::Config(
                "cdm_wait_timeout_ms must be greater than zero".to_owned(),
            ));
        }

        if let Some(drm) = &self.preferred_drm {
            Self::parse_drm(drm)?;
        }

        Ok(self)
    }

    pub fn cdm_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.cdm_wait_timeout_ms)
    }

    pub fn failed_key_window(&self) -> Duration {
        Duration::from_millis(self.failed_key_window_ms)
    }

    pub fn license_timeout(&self) -> Duration {
        Duration::from_millis(self.license_timeout_ms)
    }

    pub fn license_retry_wait(&self) -> Duration {
        Duration::from_millis(self.license_retry_wait_ms)
    }

    pub fn fatal_flush_delay(&self) -> Duration {
        Duration::from_millis(self.fatal_flush_delay_ms)
    }

    /// Configured license server for `system`.
    pub fn license_server_url(&self, system: SystemId) -> Option<&str> {
        match system {
            SystemId::PlayReady => self.playready_license_url.as_deref(),
            SystemId::Widevine => self.widevine_license_url.as_deref(),
            SystemId::ClearKey | SystemId::Common => self.clearkey_license_url.as_deref(),
            SystemId::Other(_) => None,
        }
    }

    pub fn preferred_system(&self) -> Option<SystemId> {
        self.preferred_drm
            .as_deref()
            .and_then(|x| Self::parse_drm(x).ok())
    }

    fn parse_drm(drm: &str) -> Result<SystemId, DrmError> {
        match drm.to_ascii_lowercase().as_str() {
            "playready" => Ok(SystemId::PlayReady),
            "widevine" => Ok(SystemId::Widevine),
            "clearkey" => Ok(SystemId::ClearKey),
            x => x
                .parse()
                .map_err(|_| DrmError::Config(format!("unknown preferred drm '{drm}'"))),
        }
    }
}
