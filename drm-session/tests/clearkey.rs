use base64::Engine;
use drm_session::{
    DrmConfig, DrmContext, DrmError, DrmSessionManager, KeyState,
    drm_cenc::{
        SystemId,
        decrypt::{SampleDecrypter, SubsampleEntry},
        pssh::PsshBox,
    },
    license::{LicenseClient, LicenseRequest, LicenseResponse},
};
use serde_json::{Value, json};
use std::{error::Error, sync::Arc, sync::LazyLock};

const KID: [u8; 16] = [
    0x9e, 0xb4, 0x05, 0x0d, 0xe4, 0x4b, 0x47, 0x80, 0x2b, 0x5c, 0x7a, 0x4d, 0x1f, 0x6e, 0x12, 0x33,
];
const KEY: [u8; 16] = [
    0x16, 0x6b, 0xb2, 0x1c, 0x8a, 0xd3, 0x7e, 0x4f, 0x90, 0xa1, 0x55, 0x0c, 0x3d, 0xe8, 0x27, 0x61,
];
const IV: [u8; 8] = [0x0a, 0x61, 0x0f, 0x8f, 0x00, 0x00, 0x00, 0x00];

static INIT_DATA: LazyLock<Vec<u8>> =
    LazyLock::new(|| PsshBox::build(SystemId::Common, &[KID], &[]).raw);

fn b64url(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Answers clear key license requests with the keys it knows.
struct JwkServer {
    keys: Vec<([u8; 16], [u8; 16])>,
}

impl LicenseClient for JwkServer {
    fn fetch(&self, request: &LicenseRequest) -> Result<LicenseResponse, DrmError> {
        assert_eq!(request.content_type, "application/json");

        let body = serde_json::from_slice::<Value>(&request.body)
            .map_err(|e| DrmError::LicenseRejected(e.to_string()))?;
        let wanted = body["kids"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let keys = self
            .keys
            .iter()
            .filter(|(kid, _)| wanted.contains(&Value::from(b64url(kid))))
            .map(|(kid, key)| json!({ "kty": "oct", "kid": b64url(kid), "k": b64url(key) }))
            .collect::<Vec<_>>();

        Ok(LicenseResponse {
            body: serde_json::to_vec(&json!({ "keys": keys, "type": "temporary" }))
                .map_err(|e| DrmError::LicenseRejected(e.to_string()))?,
            status: 200,
        })
    }
}

fn manager(keys: Vec<([u8; 16], [u8; 16])>) -> Result<DrmSessionManager, DrmError> {
    let config = DrmConfig {
        clearkey_license_url: Some("https://ck.example.com/license".to_owned()),
        ..Default::default()
    };
    let context = DrmContext::builder(config)
        .license_client(Arc::new(JwkServer { keys }))
        .build()?;

    Ok(DrmSessionManager::new(context))
}

#[test]
fn clearkey_end_to_end() -> Result<(), Box<dyn Error>> {
    let manager = manager(vec![([0x01; 16], [0x02; 16]), (KID, KEY)])?;
    let session = manager.create_session("org.w3.clearkey", &INIT_DATA, "video")?;
    assert_eq!(session.state(), KeyState::Ready);

    let plain = (0..96_u8).collect::<Vec<_>>();
    let subsamples = [SubsampleEntry::new(16, 32), SubsampleEntry::new(8, 40)];

    // ctr is symmetric, so the reference decrypter also encrypts.
    let mut sample = plain.clone();
    SampleDecrypter::new(KEY).decrypt_sample(&IV, &mut sample, &subsamples)?;
    assert_ne!(sample, plain);
    assert_eq!(sample[..16], plain[..16]);

    assert_eq!(manager.decrypt(&session, &KID, &IV, &mut sample, &subsamples), 0);
    assert_eq!(sample, plain);

    let mut other = plain.clone();
    assert_ne!(manager.decrypt(&session, &[0x01; 16], &IV, &mut other, &[]), 0);
    Ok(())
}

#[test]
fn clearkey_missing_key_is_a_key_failure() -> Result<(), Box<dyn Error>> {
    let manager = manager(vec![([0x01; 16], [0x02; 16])])?;
    let system = SystemId::ClearKey.uuid();

    let error = manager
        .create_session(&system, &INIT_DATA, "video")
        .err()
        .ok_or("license without the key was accepted")?;
    assert!(matches!(error, DrmError::KeyStatus(_)));

    assert!(matches!(
        manager.create_session(&system, &INIT_DATA, "audio"),
        Err(DrmError::RecentFailureSuppressed { .. })
    ));
    Ok(())
}
