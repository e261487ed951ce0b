use super::{AtomicKeyState, Challenge, DrmSession, KeyState, stats::DecryptStats};
use crate::{
    DrmError,
    cdm::KeyStatus,
    signal::{Signal, Wait},
};
use base64::Engine;
use drm_cenc::{
    SystemId,
    decrypt::{SampleDecrypter, SubsampleEntry},
    pssh::PsshBox,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// W3C Clear Key, run in process.
///
/// The challenge is a JSON license request listing the wanted key ids and
/// the license is a JSON Web Key set.
pub struct ClearKeySession {
    wait_timeout: Duration,
    state: AtomicKeyState,
    challenge: Mutex<Arc<Signal<Challenge>>>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    key_ids: Vec<Vec<u8>>,
    keys: HashMap<Vec<u8>, SampleDecrypter>,
    stats: DecryptStats,
}

#[derive(Deserialize, Serialize)]
struct KeyRequest {
    kids: Vec<String>,
    #[serde(rename = "type", default)]
    type_: String,
}

#[derive(Deserialize)]
struct JsonWebKeySet {
    keys: Vec<JsonWebKey>,
}

#[derive(Deserialize)]
struct JsonWebKey {
    kty: String,
    kid: String,
    k: String,
}

impl ClearKeySession {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            state: AtomicKeyState::new(),
            challenge: Mutex::new(Arc::new(Signal::new())),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn signal(&self) -> Arc<Signal<Challenge>> {
        self.challenge.lock().clone()
    }

    fn fail(&self, error: DrmError) -> DrmError {
        self.state.advance(KeyState::Error);
        error
    }

    fn release(&self) {
        self.signal().close();

        let mut inner = self.inner.lock();
        inner.key_ids.clear();
        inner.keys.clear();
    }

    /// Key ids from a `pssh` box or from `keyids` JSON init data.
    fn key_ids(init_data: &[u8]) -> Option<Vec<Vec<u8>>> {
        if let Ok(pssh) = PsshBox::parse(init_data) {
            return Some(pssh.key_ids.iter().map(|x| x.to_vec()).collect());
        }

        let request = serde_json::from_slice::<KeyRequest>(init_data).ok()?;
        request.kids.iter().map(|x| decode(x).ok()).collect()
    }
}

impl DrmSession for ClearKeySession {
    fn system(&self) -> SystemId {
        SystemId::ClearKey
    }

    fn generate(&self, init_data: &[u8]) {
        if self.state.load() == KeyState::Closed {
            warn!("clearkey session is closed, not generating");
            return;
        }

        let signal = Arc::new(Signal::new());
        std::mem::replace(&mut *self.challenge.lock(), signal.clone()).close();

        let Some(key_ids) = Self::key_ids(init_data).filter(|x| !x.is_empty()) else {
            warn!("clearkey init data carries no key ids");
            return;
        };

        let request = KeyRequest {
            kids: key_ids.iter().map(|x| encode(x)).collect(),
            type_: "temporary".to_owned(),
        };

        match serde_json::to_vec(&request) {
            Ok(payload) => {
                let mut inner = self.inner.lock();

                if self.state.load() == KeyState::Closed {
                    signal.close();
                    return;
                }

                inner.key_ids = key_ids;
                signal.post(Challenge {
                    payload,
                    destination_url: String::new(),
                });
            }
            Err(e) => warn!("cannot build clearkey license request: {e}"),
        }
    }

    fn build_challenge(&self) -> Result<Challenge, DrmError> {
        match self.signal().wait_timeout(self.wait_timeout) {
            Wait::Value(challenge) => {
                self.state.advance(KeyState::Pending);
                Ok(challenge)
            }
            Wait::Timeout => Err(self.fail(DrmError::ChallengeTimeout(self.wait_timeout))),
            Wait::Closed => Err(DrmError::SessionClosed),
        }
    }

    fn process_license(&self, license: &[u8]) -> Result<(), DrmError> {
        let set = serde_json::from_slice::<JsonWebKeySet>(license)
            .map_err(|e| self.fail(DrmError::LicenseRejected(e.to_string())))?;

        let mut inner = self.inner.lock();

        for jwk in set.keys {
            if jwk.kty != "oct" {
                debug!("skipping json web key of type '{}'", jwk.kty);
                continue;
            }

            let (Ok(kid), Ok(k)) = (decode(&jwk.kid), decode(&jwk.k)) else {
                return Err(self.fail(DrmError::LicenseRejected(
                    "json web key is not base64url".to_owned(),
                )));
            };

            let Ok(key) = <[u8; 16]>::try_from(k.as_slice()) else {
                return Err(self.fail(DrmError::LicenseRejected(format!(
                    "key {} is {} bytes, expected 16",
                    hex::encode(&kid),
                    k.len()
                ))));
            };

            inner
                .keys
                .insert(kid, SampleDecrypter::new(key));
        }

        if inner.key_ids.is_empty() {
            return Err(DrmError::SessionClosed);
        }

        if let Some(missing) = inner.key_ids.iter().find(|x| !inner.keys.contains_key(*x)) {
            warn!("license has no key for {}", hex::encode(missing));
            return Err(self.fail(DrmError::KeyStatus(KeyStatus::InternalError)));
        }

        info!("clearkey {} key(s) usable", inner.keys.len());
        self.state.advance(KeyState::Ready);
        Ok(())
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

        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(decrypter) = inner.keys.get(key_id) else {
            return Err(DrmError::KeyStatus(KeyStatus::InternalError));
        };

        let start = Instant::now();
        let result = decrypter.decrypt_sample(iv, payload, subsamples);
        inner.stats.record("clearkey", payload.len(), start.elapsed());

        result.map_err(|e| {
            warn!("clearkey decrypt failed: {e}");
            DrmError::DecryptFailed(-1)
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

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data.trim_end_matches('='))
}
