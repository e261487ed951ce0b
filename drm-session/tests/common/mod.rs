#![allow(dead_code)]

use drm_session::{
    DrmConfig, DrmContext, DrmError, DrmSessionManager,
    cdm::{CdmError, CdmEvents, CdmSession, CdmSystem, KeyStatus},
    drm_cenc::{
        SystemId,
        decrypt::SubsampleEntry,
        pssh::{PsshBox, playready},
    },
    fatal::FatalRecovery,
    license::{LicenseClient, LicenseRequest, LicenseResponse},
    output::StaticOutputProtection,
};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

pub const DESTINATION_URL: &str = "https://license.example.com/cdm";

/// Holds decrypts back until opened.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
    entered: AtomicBool,
}

impl Gate {
    pub fn wait(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock();

        while !*open {
            self.cond.wait(&mut open);
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    /// Whether a decrypt is blocked on the gate or went through it.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

/// How the fake CDM answers.
#[derive(Clone, Debug)]
pub struct Behavior {
    pub send_challenge: bool,
    pub challenge: Vec<u8>,
    pub destination_url: String,
    pub status_after_update: KeyStatus,
    pub send_keys_updated: bool,
    pub decrypt_result: Result<(), i32>,
    pub status_after_decrypt_failure: KeyStatus,
    /// Decrypts of this key id wait on the gate.
    pub decrypt_gate: Option<(Vec<u8>, Arc<Gate>)>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            send_challenge: true,
            challenge: b"challenge".to_vec(),
            destination_url: DESTINATION_URL.to_owned(),
            status_after_update: KeyStatus::Usable,
            send_keys_updated: true,
            decrypt_result: Ok(()),
            status_after_decrypt_failure: KeyStatus::Usable,
            decrypt_gate: None,
        }
    }
}

#[derive(Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub updates: AtomicUsize,
    pub decrypts: AtomicUsize,
    pub last_license: Mutex<Vec<u8>>,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }
}

pub struct FakeCdm {
    pub counters: Arc<Counters>,
    pub behavior: Mutex<Behavior>,
}

impl FakeCdm {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            behavior: Mutex::new(behavior),
        }
    }
}

impl CdmSystem for FakeCdm {
    fn is_supported(&self, key_system: &str) -> bool {
        key_system == "com.microsoft.playready" || key_system == "com.widevine.alpha"
    }

    fn open_session(
        &self,
        _: &str,
        _: &[u8],
        events: Arc<dyn CdmEvents>,
    ) -> Result<Box<dyn CdmSession>, CdmError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();

        if behavior.send_challenge {
            events.on_challenge(&behavior.destination_url, &behavior.challenge);
        }

        Ok(Box::new(FakeCdmSession {
            behavior,
            events,
            counters: self.counters.clone(),
        }))
    }
}

struct FakeCdmSession {
    behavior: Behavior,
    events: Arc<dyn CdmEvents>,
    counters: Arc<Counters>,
}

impl CdmSession for FakeCdmSession {
    fn update(&mut self, license: &[u8]) -> Result<(), CdmError> {
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        *self.counters.last_license.lock() = license.to_vec();

        self.events
            .on_key_update(b"key", self.behavior.status_after_update);

        if self.behavior.send_keys_updated {
            self.events.on_keys_updated();
        }

        Ok(())
    }

    fn key_status(&self, _: &[u8]) -> KeyStatus {
        self.behavior.status_after_decrypt_failure
    }

    fn decrypt(
        &mut self,
        key_id: &[u8],
        _: &[u8],
        _: &mut [u8],
        _: &[SubsampleEntry],
    ) -> Result<(), CdmError> {
        if let Some((gated, gate)) = &self.behavior.decrypt_gate {
            if gated == key_id {
                gate.wait();
            }
        }

        self.counters.decrypts.fetch_add(1, Ordering::SeqCst);
        self.behavior
            .decrypt_result
            .map_err(|code| CdmError::new(code, "decrypt failed"))
    }

    fn close(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeLicenseClient {
    pub requests: Mutex<Vec<LicenseRequest>>,
    pub delay: Duration,
    /// License body, or the http status to fail with.
    pub response: Mutex<Result<Vec<u8>, u16>>,
}

impl FakeLicenseClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            requests: Mutex::new(vec![]),
            delay,
            response: Mutex::new(Ok(b"license".to_vec())),
        }
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last(&self) -> Option<LicenseRequest> {
        self.requests.lock().last().cloned()
    }
}

impl LicenseClient for FakeLicenseClient {
    fn fetch(&self, request: &LicenseRequest) -> Result<LicenseResponse, DrmError> {
        self.requests.lock().push(request.clone());
        thread::sleep(self.delay);

        match &*self.response.lock() {
            Ok(body) => Ok(LicenseResponse {
                body: body.clone(),
                status: 200,
            }),
            Err(status) => Err(DrmError::LicenseTransport {
                status: Some(*status),
                message: "unavailable".to_owned(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeFatal {
    pub stops: AtomicUsize,
    pub terminations: AtomicUsize,
}

impl FatalRecovery for FakeFatal {
    fn stop_cdm_helpers(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub manager: DrmSessionManager,
    pub cdm: Arc<FakeCdm>,
    pub license: Arc<FakeLicenseClient>,
    pub fatal: Arc<FakeFatal>,
    pub output: Arc<StaticOutputProtection>,
}

impl Harness {
    pub fn counters(&self) -> &Counters {
        &self.cdm.counters
    }
}

/// Test friendly defaults: short waits and no fatal flush delay.
pub fn config() -> DrmConfig {
    DrmConfig {
        cdm_wait_timeout_ms: 500,
        fatal_flush_delay_ms: 0,
        license_retry_wait_ms: 0,
        ..Default::default()
    }
}

pub fn harness(config: DrmConfig, behavior: Behavior) -> Harness {
    harness_with_delay(config, behavior, Duration::ZERO)
}

pub fn harness_with_delay(config: DrmConfig, behavior: Behavior, delay: Duration) -> Harness {
    let cdm = Arc::new(FakeCdm::new(behavior));
    let license = Arc::new(FakeLicenseClient::new(delay));
    let fatal = Arc::new(FakeFatal::default());
    let output = Arc::new(StaticOutputProtection::new(true));

    let context = DrmContext::builder(config)
        .cdm(cdm.clone())
        .license_client(license.clone())
        .fatal_recovery(fatal.clone())
        .output_protection(output.clone())
        .build()
        .unwrap();

    Harness {
        manager: DrmSessionManager::new(context),
        cdm,
        license,
        fatal,
        output,
    }
}

pub fn widevine() -> String {
    SystemId::Widevine.uuid()
}

pub fn playready() -> String {
    SystemId::PlayReady.uuid()
}

/// Widevine `pssh` box whose key id is sixteen `kid` bytes.
pub fn widevine_init(kid: u8) -> Vec<u8> {
    PsshBox::build(SystemId::Widevine, &[[kid; 16]], &[]).raw
}

/// PlayReady object carrying `kid`, and content metadata when given.
pub fn playready_init(kid: &str, metadata: Option<&str>) -> Vec<u8> {
    let policy = metadata
        .map(|x| format!(r#"<CUSTOMATTRIBUTES><ckm:policy xmlns:ckm="urn:ccp:ckm">{x}</ckm:policy></CUSTOMATTRIBUTES>"#))
        .unwrap_or_default();

    playready::build(&format!(
        r#"<WRMHEADER xmlns="http://schemas.microsoft.com/DRM/2007/03/PlayReadyHeader" version="4.0.0.0"><DATA><KID>{kid}</KID>{policy}</DATA></WRMHEADER>"#
    ))
}
