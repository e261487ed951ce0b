//! Per content key decryption sessions.

mod clearkey;
mod ocdm;
mod stats;

pub use clearkey::ClearKeySession;
pub use ocdm::OcdmSession;

use crate::{
    DrmError,
    cdm::{CdmSystem, KeyStatus},
    config::DrmConfig,
    context::DrmContext,
    fatal::FatalExit,
    output::OutputProtection,
};
use drm_cenc::{SystemId, decrypt::SubsampleEntry};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

/// Shared handle to a session; the cache and every track using the key
/// hold one.
pub type SessionHandle = Arc<dyn DrmSession>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum KeyState {
    /// Created, or cleared and ready to be generated again.
    Init = 0,
    /// Challenge produced, waiting for the license.
    Pending = 1,
    /// Key usable for decryption.
    Ready = 2,
    Error = 3,
    /// Released for good, never reused.
    Closed = 4,
}

/// License challenge produced by the CDM.
#[derive(Clone, Debug, PartialEq)]
pub struct Challenge {
    pub payload: Vec<u8>,
    /// License server the CDM asked for, may be empty.
    pub destination_url: String,
}

/// One decryption session, bound to a single content key of one protection
/// system.
pub trait DrmSession: Send + Sync {
    fn system(&self) -> SystemId;

    /// Open the CDM session. A CDM refusal is only logged, it shows up as a
    /// missing challenge in [`DrmSession::build_challenge`].
    fn generate(&self, init_data: &[u8]);

    /// Wait for the CDM challenge and move to [`KeyState::Pending`].
    fn build_challenge(&self) -> Result<Challenge, DrmError>;

    /// Hand the license to the CDM and wait for the key status.
    fn process_license(&self, license: &[u8]) -> Result<(), DrmError>;

    /// Decrypt one sample in place. Fails without calling the CDM unless
    /// the session is [`KeyState::Ready`].
    fn decrypt(
        &self,
        key_id: &[u8],
        iv: &[u8],
        payload: &mut [u8],
        subsamples: &[SubsampleEntry],
    ) -> Result<(), DrmError>;

    fn state(&self) -> KeyState;

    /// Release the CDM session and keys and go back to [`KeyState::Init`].
    /// Threads blocked in this session return [`DrmError::SessionClosed`].
    fn clear(&self);

    /// [`DrmSession::clear`] and mark the session [`KeyState::Closed`].
    fn close(&self);
}

/// Builds sessions for the cache. Construction must not talk to the CDM.
pub trait SessionFactory: Send + Sync {
    fn create(&self, system: SystemId) -> Result<SessionHandle, DrmError>;
}

/// Picks the backend from the protection system id.
pub struct BackendFactory {
    config: Arc<DrmConfig>,
    cdm: Option<Arc<dyn CdmSystem>>,
    output: Arc<dyn OutputProtection>,
    fatal: Arc<FatalExit>,
}

impl BackendFactory {
    pub fn new(context: &DrmContext) -> Self {
        Self {
            config: context.config.clone(),
            cdm: context.cdm.clone(),
            output: context.output.clone(),
            fatal: context.fatal.clone(),
        }
    }
}

impl SessionFactory for BackendFactory {
    fn create(&self, system: SystemId) -> Result<SessionHandle, DrmError> {
        match system {
            SystemId::PlayReady | SystemId::Widevine => {
                let key_system = system.key_system().unwrap_or_default();
                let cdm = self
                    .cdm
                    .as_ref()
                    .filter(|x| x.is_supported(key_system))
                    .ok_or(DrmError::NoCdm(system))?;

                Ok(Arc::new(OcdmSession::new(
                    system,
                    cdm.clone(),
                    self.output.clone(),
                    self.fatal.clone(),
                    &self.config,
                )))
            }
            SystemId::ClearKey | SystemId::Common => {
                Ok(Arc::new(ClearKeySession::new(self.config.cdm_wait_timeout())))
            }
            SystemId::Other(_) => Err(DrmError::UnsupportedSystem(system.to_string())),
        }
    }
}

pub(crate) struct AtomicKeyState(AtomicU8);

impl AtomicKeyState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(KeyState::Init as u8))
    }

    pub(crate) fn load(&self) -> KeyState {
        match self.0.load(Ordering::Acquire) {
            0 => KeyState::Init,
            1 => KeyState::Pending,
            2 => KeyState::Ready,
            3 => KeyState::Error,
            _ => KeyState::Closed,
        }
    }

    pub(crate) fn store(&self, state: KeyState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `state` unless the session was closed meanwhile.
    pub(crate) fn advance(&self, state: KeyState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |x| {
                (x != KeyState::Closed as u8).then_some(state as u8)
            });
    }
}

/// Drop the `"<type>:Type:"` request type prefix some CDMs put in front of
/// the challenge. A prefix that is empty is not one.
pub(crate) fn strip_request_type(payload: Vec<u8>) -> Vec<u8> {
    const DELIMITER: &[u8] = b":Type:";

    match payload
        .windows(DELIMITER.len())
        .position(|x| x == DELIMITER)
    {
        Some(0) | None => payload,
        Some(position) => payload[position + DELIMITER.len()..].to_vec(),
    }
}

/// Error for a key status that is not [`KeyStatus::Usable`].
pub(crate) fn key_status_error(status: KeyStatus) -> DrmError {
    match status {
        KeyStatus::OutputRestricted => DrmError::HdcpOutputProtection,
        KeyStatus::OutputRestrictedHdcp22 => DrmError::HdcpCompliance,
        KeyStatus::HwError => DrmError::HardwareFatal,
        x => DrmError::KeyStatus(x),
    }
}
