use crate::{cdm::KeyStatus, session::KeyState};
use drm_cenc::{ContentKeyId, SystemId};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Status returned when the display link does not meet the key's output
/// protection requirement.
pub const HDCP_OUTPUT_PROTECTION_FAILURE: i32 = 4327;
/// Status returned when UHD content needs HDCP 2.2 and the link has less.
pub const HDCP_COMPLIANCE_CHECK_FAILURE: i32 = 4325;

/// Failures surfaced by sessions, the cache and the manager.
///
/// Cloneable so that tracks waiting on another track's negotiation receive
/// the same failure.
#[derive(Clone, Debug, Error)]
pub enum DrmError {
    #[error("cannot parse init data: {0}")]
    Parse(#[source] Arc<drm_cenc::Error>),

    #[error("'{0}' is not a supported protection system")]
    UnsupportedSystem(String),

    #[error("no CDM available for {0}")]
    NoCdm(SystemId),

    #[error("key {key} failed recently with status {code}, not retrying yet")]
    RecentFailureSuppressed { key: ContentKeyId, code: i32 },

    #[error("CDM did not produce a license challenge within {0:?}")]
    ChallengeTimeout(Duration),

    #[error("CDM produced an empty license challenge")]
    EmptyChallenge,

    #[error("license request failed{}: {}", .status.map(|x| format!(" with http status {x}")).unwrap_or_default(), .message)]
    LicenseTransport { status: Option<u16>, message: String },

    #[error("license rejected: {0}")]
    LicenseRejected(String),

    #[error("cannot get access token: {0}")]
    AccessToken(String),

    #[error("key is not usable, CDM reported {0:?}")]
    KeyStatus(KeyStatus),

    #[error("output protection failure")]
    HdcpOutputProtection,

    #[error("HDCP 2.2 compliance check failed")]
    HdcpCompliance,

    #[error("CDM hardware failure")]
    HardwareFatal,

    #[error("session is not ready for decryption (state {0:?})")]
    SessionNotReady(KeyState),

    #[error("session was cleared while waiting for the CDM")]
    SessionClosed,

    #[error("decrypt failed with status {0}")]
    DecryptFailed(i32),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<drm_cenc::Error> for DrmError {
    fn from(value: drm_cenc::Error) -> Self {
        Self::Parse(Arc::new(value))
    }
}

/// Playback failure category reported to the host application.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybackError {
    CorruptDrmData,
    UnsupportedStreamType,
    DrmInitFailed,
    DrmChallengeFailed,
    LicenseRequestFailed,
    FailedToGetAccessToken,
    DrmKeyUpdateFailed,
    HdcpOutputProtectionFailure,
    HdcpComplianceFailure,
    DrmSelfAbort,
    DrmDecryptFailed,
}

impl DrmError {
    /// Numeric status. `0` is never returned, HDCP failures use their fixed
    /// codes and CDM decrypt codes pass through.
    pub fn code(&self) -> i32 {
        match self {
            Self::HdcpOutputProtection => HDCP_OUTPUT_PROTECTION_FAILURE,
            Self::HdcpCompliance => HDCP_COMPLIANCE_CHECK_FAILURE,
            Self::DecryptFailed(code) if *code != 0 => *code,
            Self::DecryptFailed(_) => -1,
            Self::Parse(_) => -2,
            Self::UnsupportedSystem(_) => -3,
            Self::NoCdm(_) => -4,
            Self::RecentFailureSuppressed { .. } => -5,
            Self::ChallengeTimeout(_) => -6,
            Self::EmptyChallenge => -7,
            Self::LicenseTransport { .. } => -8,
            Self::LicenseRejected(_) => -9,
            Self::AccessToken(_) => -10,
            Self::KeyStatus(_) => -11,
            Self::HardwareFatal => -12,
            Self::SessionNotReady(_) => -13,
            Self::SessionClosed => -14,
            Self::Config(_) => -15,
        }
    }

    pub fn playback_error(&self) -> PlaybackError {
        match self {
            Self::Parse(_) => PlaybackError::CorruptDrmData,
            Self::UnsupportedSystem(_) | Self::NoCdm(_) => PlaybackError::UnsupportedStreamType,
            Self::RecentFailureSuppressed { .. } | Self::SessionClosed | Self::Config(_) => {
                PlaybackError::DrmInitFailed
            }
            Self::ChallengeTimeout(_) | Self::EmptyChallenge => PlaybackError::DrmChallengeFailed,
            Self::LicenseTransport { .. } => PlaybackError::LicenseRequestFailed,
            Self::AccessToken(_) => PlaybackError::FailedToGetAccessToken,
            Self::LicenseRejected(_) | Self::KeyStatus(_) => PlaybackError::DrmKeyUpdateFailed,
            Self::HdcpOutputProtection => PlaybackError::HdcpOutputProtectionFailure,
            Self::HdcpCompliance => PlaybackError::HdcpComplianceFailure,
            Self::HardwareFatal => PlaybackError::DrmSelfAbort,
            Self::SessionNotReady(_) | Self::DecryptFailed(_) => PlaybackError::DrmDecryptFailed,
        }
    }

    /// Everything except a hardware failure can be handled by the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::HardwareFatal)
    }

    /// Failures caused by the key itself, which a retry of the same key
    /// will hit again.
    pub(crate) fn is_key_failure(&self) -> bool {
        matches!(
            self,
            Self::LicenseRejected(_)
                | Self::KeyStatus(_)
                | Self::HdcpOutputProtection
                | Self::HdcpCompliance
        )
    }
}
