//! Interface to an external Content Decryption Module.
//!
//! The traits follow the OpenCDM model: a system opens sessions from init
//! data, and each session reports its challenge and key statuses through a
//! callback sink, possibly from another thread.

use drm_cenc::decrypt::SubsampleEntry;
use std::sync::Arc;
use thiserror::Error;

/// Usability of a content key as reported by the CDM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyStatus {
    Usable,
    Expired,
    Released,
    OutputRestricted,
    OutputRestrictedHdcp22,
    OutputDownscaled,
    StatusPending,
    InternalError,
    HwError,
}

#[derive(Clone, Debug, Error)]
#[error("CDM error {code}: {message}")]
pub struct CdmError {
    pub code: i32,
    pub message: String,
}

impl CdmError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Callback sink handed to the CDM when a session is opened.
pub trait CdmEvents: Send + Sync {
    /// License challenge and the license server the CDM wants it sent to.
    fn on_challenge(&self, destination_url: &str, challenge: &[u8]);
    fn on_key_update(&self, key_id: &[u8], status: KeyStatus);
    /// All key updates of a license have been delivered.
    fn on_keys_updated(&self);
    fn on_error(&self, message: &str);
}

pub trait CdmSystem: Send + Sync {
    fn is_supported(&self, key_system: &str) -> bool;

    /// Construct a CDM session. The challenge arrives later through
    /// [`CdmEvents::on_challenge`].
    fn open_session(
        &self,
        key_system: &str,
        init_data: &[u8],
        events: Arc<dyn CdmEvents>,
    ) -> Result<Box<dyn CdmSession>, CdmError>;
}

pub trait CdmSession: Send {
    /// Hand the license response to the CDM.
    fn update(&mut self, license: &[u8]) -> Result<(), CdmError>;
    fn key_status(&self, key_id: &[u8]) -> KeyStatus;
    /// Decrypt `payload` in place.
    fn decrypt(
        &mut self,
        key_id: &[u8],
        iv: &[u8],
        payload: &mut [u8],
        subsamples: &[SubsampleEntry],
    ) -> Result<(), CdmError>;
    fn close(&mut self);
}
