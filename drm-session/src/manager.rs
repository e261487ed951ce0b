use crate::{
    DrmConfig, DrmError,
    cache::{Lookup, SessionCache},
    context::DrmContext,
    license::{self, LicenseRequest, LicenseResponse},
    session::{BackendFactory, Challenge, KeyState, SessionHandle},
};
use drm_cenc::{
    ContentKeyId, SystemId, decrypt::SubsampleEntry, extract_content_metadata, extract_key_id,
};
use log::{debug, info, warn};
use std::{sync::Arc, thread};

/// Entry point of the player's tracks into DRM.
///
/// Sessions are shared per content key: tracks asking for a key that is
/// already negotiated get the same session, and concurrent requests for a
/// key being negotiated wait for that negotiation instead of starting
/// their own.
pub struct DrmSessionManager {
    context: DrmContext,
    cache: SessionCache,
}

impl DrmSessionManager {
    pub fn new(context: DrmContext) -> Self {
        let factory = Arc::new(BackendFactory::new(&context));
        let cache = SessionCache::new(
            context.config.max_sessions,
            context.config.failed_key_window(),
            factory,
        );

        Self { context, cache }
    }

    pub fn config(&self) -> &DrmConfig {
        &self.context.config
    }

    pub fn context(&self) -> &DrmContext {
        &self.context
    }

    /// Ready session for the key in `init_data`, negotiating a license if no
    /// track has done so yet.
    ///
    /// `system_id` is a dashed or plain uuid, or an EME key system string.
    pub fn create_session(
        &self,
        system_id: &str,
        init_data: &[u8],
        track: &str,
    ) -> Result<SessionHandle, DrmError> {
        let system = system_id
            .parse::<SystemId>()
            .map_err(|_| DrmError::UnsupportedSystem(system_id.to_owned()))?;
        let key = extract_key_id(system, init_data)?;

        let ticket = match self.cache.lookup_or_create(&key, system, init_data)? {
            Lookup::Cached(session) => {
                debug!("{track}: {system} key {key} already negotiated");
                return Ok(session);
            }
            Lookup::Created(ticket) => ticket,
        };

        info!("{track}: negotiating {system} license for key {key}");
        let metadata = extract_content_metadata(system, init_data);

        if let Err(e) = self.negotiate(system, ticket.session(), ticket.init_data(), &metadata) {
            warn!("{track}: {system} license for key {key} failed: {e}");

            if e.is_key_failure() {
                self.cache.record_failure(&key, e.code());
            }

            ticket.fail(e.clone());
            return Err(e);
        }

        match ticket.session().state() {
            KeyState::Ready => {
                info!("{track}: {system} key {key} is ready");
                Ok(ticket.complete())
            }
            state => {
                debug!("{track}: session of key {key} left in state {state:?}");
                ticket.fail(DrmError::SessionClosed);
                Err(DrmError::SessionClosed)
            }
        }
    }

    fn negotiate(
        &self,
        system: SystemId,
        session: &SessionHandle,
        init_data: &[u8],
        metadata: &[u8],
    ) -> Result<(), DrmError> {
        session.generate(init_data);
        let challenge = session.build_challenge()?;
        let response = self.get_license(system, &challenge, metadata)?;
        session.process_license(&response.body)
    }

    /// Post `challenge` to the license server and return the license.
    ///
    /// With content metadata the challenge travels inside a JSON envelope
    /// and the returned body is the unwrapped license. Transport failures
    /// are retried as configured, other failures are not.
    pub fn get_license(
        &self,
        system: SystemId,
        challenge: &Challenge,
        content_metadata: &[u8],
    ) -> Result<LicenseResponse, DrmError> {
        let config = &self.context.config;
        let url = self.license_url(system, &challenge.destination_url)?;

        let token = if config.anonymous_license_request {
            None
        } else {
            self.context.token.get()?
        };

        let envelope = !content_metadata.is_empty();
        let request = if envelope {
            LicenseRequest {
                url,
                body: license::wrap_challenge(
                    system,
                    &challenge.payload,
                    content_metadata,
                    token.as_deref(),
                )?,
                content_type: license::ENVELOPE_CONTENT_TYPE.to_owned(),
                headers: Self::headers(config),
                token: None,
                timeout: config.license_timeout(),
            }
        } else {
            LicenseRequest {
                url,
                body: challenge.payload.clone(),
                content_type: license::content_type(system).to_owned(),
                headers: Self::headers(config),
                token,
                timeout: config.license_timeout(),
            }
        };

        debug!(
            "requesting {system} license from {} ({} bytes)",
            request.url,
            request.body.len()
        );

        let mut attempt = 0;
        let mut response = loop {
            match self.context.license_client.fetch(&request) {
                Ok(x) => break x,
                Err(e @ DrmError::LicenseTransport { .. })
                    if attempt < config.license_retry_count =>
                {
                    attempt += 1;
                    warn!(
                        "{e}, retrying ({attempt}/{})",
                        config.license_retry_count
                    );
                    thread::sleep(config.license_retry_wait());
                }
                Err(e) => return Err(e),
            }
        };

        if envelope && !response.body.is_empty() {
            response.body = license::unwrap_license(&response.body)?;
        }

        if response.body.is_empty() {
            return Err(DrmError::LicenseRejected(
                "license server returned an empty body".to_owned(),
            ));
        }

        Ok(response)
    }

    fn headers(config: &DrmConfig) -> Vec<(String, String)> {
        config
            .license_headers
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    /// License server for `system`. The configured url wins when overriding
    /// is enabled or the CDM did not name a server.
    pub fn license_url(&self, system: SystemId, destination_url: &str) -> Result<String, DrmError> {
        let config = &self.context.config;

        match config.license_server_url(system) {
            Some(url) if config.license_server_override || destination_url.is_empty() => {
                Ok(url.to_owned())
            }
            _ if !destination_url.is_empty() => Ok(destination_url.to_owned()),
            _ => Err(DrmError::Config(format!(
                "no license server url for {system}"
            ))),
        }
    }

    /// Decrypt one sample in place and return `0` or the failure status.
    pub fn decrypt(
        &self,
        session: &SessionHandle,
        key_id: &[u8],
        iv: &[u8],
        payload: &mut [u8],
        subsamples: &[SubsampleEntry],
    ) -> i32 {
        match session.decrypt(key_id, iv, payload, subsamples) {
            Ok(()) => 0,
            Err(e) => {
                warn!("{} decrypt failed: {e}", session.system());
                e.code()
            }
        }
    }

    /// Store the access token unless one is already set.
    pub fn set_access_token(&self, token: &str) -> bool {
        self.context.token.set(token)
    }

    pub fn access_token(&self) -> Result<Option<Arc<str>>, DrmError> {
        self.context.token.get()
    }

    pub fn clear_access_token(&self) {
        self.context.token.clear();
    }

    /// Pick the system to use among the ones a stream offers: the
    /// preferred one if offered, else the first this player can handle.
    pub fn select_system(&self, offered: &[SystemId]) -> Option<SystemId> {
        if let Some(preferred) = self.context.config.preferred_system() {
            if let Some(x) = offered.iter().find(|x| preferred.accepts(**x)) {
                return Some(*x);
            }
        }

        offered.iter().copied().find(|x| match x {
            SystemId::ClearKey | SystemId::Common => true,
            SystemId::PlayReady | SystemId::Widevine => self.context.cdm.as_ref().is_some_and(
                |cdm| cdm.is_supported(x.key_system().unwrap_or_default()),
            ),
            SystemId::Other(_) => false,
        })
    }

    pub fn session_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, key: &ContentKeyId) -> bool {
        self.cache.contains(key)
    }

    /// Close every session and forget the failed key. Handles still held by
    /// tracks stay valid but refuse to decrypt.
    pub fn clear_session_data(&self) {
        self.cache.clear();
        debug!("session data cleared");
    }
}

impl Drop for DrmSessionManager {
    fn drop(&mut self) {
        self.clear_session_data();
    }
}
