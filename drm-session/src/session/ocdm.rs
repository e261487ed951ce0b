use super::{
    AtomicKeyState, Challenge, DrmSession, KeyState, key_status_error, stats::DecryptStats,
    strip_request_type,
};
use crate::{
    DrmError,
    cdm::{CdmEvents, CdmSession, CdmSystem, KeyStatus},
    config::DrmConfig,
    fatal::FatalExit,
    output::OutputProtection,
    signal::{Signal, Wait},
};
use drm_cenc::{SystemId, decrypt::SubsampleEntry};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Session backed by an external OpenCDM style CDM, used for PlayReady and
/// Widevine.
pub struct OcdmSession {
    system: SystemId,
    cdm: Arc<dyn CdmSystem>,
    output: Arc<dyn OutputProtection>,
    fatal: Arc<FatalExit>,
    wait_timeout: Duration,
    output_protection: bool,
    state: AtomicKeyState,
    events: Mutex<Arc<SessionEvents>>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    handle: Option<Box<dyn CdmSession>>,
    stats: DecryptStats,
}

/// Callback sink of one generation of the session. A fresh one is made on
/// every [`DrmSession::generate`] so callbacks of a released CDM session
/// cannot reach the next one.
struct SessionEvents {
    challenge: Signal<Challenge>,
    keys_updated: Signal<()>,
    key_status: Mutex<KeyStatus>,
}

impl SessionEvents {
    fn new() -> Self {
        Self {
            challenge: Signal::new(),
            keys_updated: Signal::new(),
            key_status: Mutex::new(KeyStatus::InternalError),
        }
    }

    fn close(&self) {
        self.challenge.close();
        self.keys_updated.close();
    }
}

impl CdmEvents for SessionEvents {
    fn on_challenge(&self, destination_url: &str, challenge: &[u8]) {
        debug!(
            "CDM challenge of {} bytes for '{}'",
            challenge.len(),
            destination_url
        );
        self.challenge.post(Challenge {
            payload: challenge.to_vec(),
            destination_url: destination_url.to_owned(),
        });
    }

    fn on_key_update(&self, key_id: &[u8], status: KeyStatus) {
        debug!("key {} status {:?}", hex::encode(key_id), status);
        *self.key_status.lock() = status;
    }

    fn on_keys_updated(&self) {
        self.keys_updated.post(());
    }

    fn on_error(&self, message: &str) {
        warn!("CDM error: {message}");
    }
}

impl OcdmSession {
    pub fn new(
        system: SystemId,
        cdm: Arc<dyn CdmSystem>,
        output: Arc<dyn OutputProtection>,
        fatal: Arc<FatalExit>,
        config: &DrmConfig,
    ) -> Self {
        Self {
            system,
            cdm,
            output,
            fatal,
            wait_timeout: config.cdm_wait_timeout(),
            output_protection: system == SystemId::PlayReady
                && config.enable_playready_output_protection,
            state: AtomicKeyState::new(),
            events: Mutex::new(Arc::new(SessionEvents::new())),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn events(&self) -> Arc<SessionEvents> {
        self.events.lock().clone()
    }

    fn fail(&self, error: DrmError) -> DrmError {
        self.state.advance(KeyState::Error);
        error
    }

    fn release(&self) {
        self.events().close();

        let mut inner = self.inner.lock();

        if let Some(mut handle) = inner.handle.take() {
            handle.close();
            debug!("{} CDM session released", self.system);
        }
    }
}

impl DrmSession for OcdmSession {
    fn system(&self) -> SystemId {
        self.system
    }

    fn generate(&self, init_data: &[u8]) {
        if self.state.load() == KeyState::Closed {
            warn!("{} session is closed, not generating", self.system);
            return;
        }

        let events = Arc::new(SessionEvents::new());
        let previous = std::mem::replace(&mut *self.events.lock(), events.clone());
        previous.close();

        let mut inner = self.inner.lock();

        if let Some(mut handle) = inner.handle.take() {
            handle.close();
        }

        let mut handle = match self.cdm.open_session(
            self.system.key_system().unwrap_or_default(),
            init_data,
            events.clone(),
        ) {
            Ok(x) => x,
            Err(e) => {
                error!("could not create {} CDM session: {e}", self.system);
                return;
            }
        };

        // Closed while the CDM session was being opened.
        if self.state.load() == KeyState::Closed {
            handle.close();
            events.close();
            debug!("{} session closed during generate", self.system);
            return;
        }

        inner.handle = Some(handle);
    }

    fn build_challenge(&self) -> Result<Challenge, DrmError> {
        match self.events().challenge.wait_timeout(self.wait_timeout) {
            Wait::Value(challenge) => {
                let payload = strip_request_type(challenge.payload);

                if payload.is_empty() {
                    return Err(self.fail(DrmError::EmptyChallenge));
                }

                info!(
                    "{} challenge ready, destination url is '{}'",
                    self.system, challenge.destination_url
                );
                self.state.advance(KeyState::Pending);
                Ok(Challenge {
                    payload,
                    destination_url: challenge.destination_url,
                })
            }
            Wait::Timeout => Err(self.fail(DrmError::ChallengeTimeout(self.wait_timeout))),
            Wait::Closed => Err(DrmError::SessionClosed),
        }
    }

    fn process_license(&self, license: &[u8]) -> Result<(), DrmError> {
        let events = self.events();

        {
            let mut inner = self.inner.lock();
            let Some(handle) = inner.handle.as_mut() else {
                return Err(DrmError::SessionClosed);
            };

            if let Err(e) = handle.update(license) {
                return Err(self.fail(DrmError::LicenseRejected(e.to_string())));
            }
        }

        match events.keys_updated.wait_timeout(self.wait_timeout) {
            Wait::Value(()) => debug!("{} key status updated", self.system),
            Wait::Timeout => warn!(
                "{} key status not updated within {:?}",
                self.system, self.wait_timeout
            ),
            Wait::Closed => return Err(DrmError::SessionClosed),
        }

        let status = *events.key_status.lock();

        if status == KeyStatus::Usable {
            info!("{} key usable", self.system);
            self.state.advance(KeyState::Ready);
            return Ok(());
        }

        warn!("{} license processed, key status {:?}", self.system, status);

        if status == KeyStatus::HwError {
            self.fatal
                .trigger(&format!("{} CDM reported a hardware error", self.system));
        }

        Err(self.fail(key_status_error(status)))
    }

    fn decrypt(
        &self,
        key_id: &[u8],
        iv: &[u8],
        payload: &mut [u8],
        subsamples: &[SubsampleEntry],
    ) -> Result<(), DrmError> {
        let state = self.state.load();

        if state != KeyState::Ready {
            return Err(DrmError::SessionNotReady(state));
        }

        if self.output_protection && self.output.is_source_uhd() && !self.output.is_hdcp_2_2() {
            warn!("UHD source but not HDCP 2.2, failing decrypt");
            return Err(DrmError::HdcpCompliance);
        }

        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(handle) = inner.handle.as_mut() else {
            return Err(DrmError::SessionNotReady(self.state.load()));
        };

        let start = Instant::now();
        let result = handle.decrypt(key_id, iv, payload, subsamples);
        inner
            .stats
            .record(self.system.name(), payload.len(), start.elapsed());

        result.map_err(|e| {
            let status = handle.key_status(key_id);
            info!("decrypt returned {} key status is {:?}", e.code, status);

            match status {
                KeyStatus::OutputRestricted => DrmError::HdcpOutputProtection,
                KeyStatus::OutputRestrictedHdcp22 => DrmError::HdcpCompliance,
                _ => DrmError::DecryptFailed(e.code),
            }
        })
    }

    fn state(&self) -> KeyState {
        self.state.load()
    }

    fn clear(&self) {
        self.release();
        self.state.advance(KeyState::Init);
    }

    fn close(&self) {
        self.state.store(KeyState::Closed);
        self.release();
    }
}

impl Drop for OcdmSession {
    fn drop(&mut self) {
        if let Some(mut handle) = self.inner.get_mut().handle.take() {
            handle.close();
        }
    }
}
