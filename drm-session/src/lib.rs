//! Content protection for an adaptive streaming player.
//!
//! [`DrmSessionManager`] turns init data into ready decryption sessions:
//! it extracts the content key id, shares one session per key between
//! tracks, negotiates licenses through a CDM and a license server, and
//! authorizes every sample decrypt.
//!
//! PlayReady and Widevine run on an external CDM plugged in through
//! [`cdm::CdmSystem`]. Clear Key runs in process.
//!
//! # Optional Features
//!
//! - **native-tls** (default): Enables TLS functionality provided by `native-tls`.
//! - **rustls-tls-native-roots**: Enables TLS functionality provided by `rustls`, while using root certificates from the `rustls-native-certs` crate.
//! - **rustls-tls-webpki-roots**: Enables TLS functionality provided by `rustls`, while using root certificates from the `webpki-roots` crate.

pub mod cache;
pub mod cdm;
pub mod config;
pub mod context;
pub mod error;
pub mod fatal;
pub mod license;
pub mod manager;
pub mod output;
pub mod session;
pub mod token;

mod signal;

pub use config::DrmConfig;
pub use context::{DrmContext, DrmContextBuilder};
pub use drm_cenc;
pub use error::{
    DrmError, HDCP_COMPLIANCE_CHECK_FAILURE, HDCP_OUTPUT_PROTECTION_FAILURE, PlaybackError,
};
pub use manager::DrmSessionManager;
pub use session::{DrmSession, KeyState, SessionHandle};
