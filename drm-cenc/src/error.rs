use crate::SystemId;
use thiserror::Error;

/// The errors that may occur when parsing init data or decrypting samples.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {wanted} bytes at offset {offset}, data is truncated")]
    UnexpectedEof { offset: u64, wanted: u64 },

    #[error("expected a 'pssh' box but found '{0}'")]
    NotPssh(String),

    #[error("invalid pssh box size {size} for {available} bytes of data")]
    InvalidBoxSize { size: u64, available: usize },

    #[error("unsupported pssh box version {0}")]
    UnsupportedVersion(u8),

    #[error("pssh box belongs to {found} but {expected} init data was expected")]
    SystemMismatch { expected: SystemId, found: SystemId },

    #[error("could not find '{start}' or '{end}' in init data")]
    MissingMarker {
        start: &'static str,
        end: &'static str,
    },

    #[error("init data does not carry a content key id")]
    MissingKeyId,

    #[error("unknown protection system '{0}'")]
    UnknownSystemId(String),

    #[error("invalid playready object: {0}")]
    PlayReady(String),

    #[error("cannot decode playready header xml: {0}")]
    XmlDecode(#[from] quick_xml::DeError),

    #[error("cannot decode utf-16 playready header: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),

    #[error("cannot decode widevine pssh data: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid mp4 box name: {0}")]
    BoxName(#[from] std::string::FromUtf8Error),

    #[cfg(feature = "decrypt")]
    #[error("invalid IV size: expected 8 or 16 bytes, got {0} bytes")]
    InvalidIvSize(usize),

    #[cfg(feature = "decrypt")]
    #[error("subsample map covers {covered} bytes but the sample is only {available} bytes")]
    SubsampleOverflow { covered: usize, available: usize },
}

/// A `Result` alias where the `Err` case is `drm_cenc::Error`.
pub type Result<T> = std::result::Result<T, Error>;
