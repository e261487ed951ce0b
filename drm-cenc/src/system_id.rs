use crate::{Error, InitDataLayout};
use std::{fmt, str::FromStr};

const PLAYREADY: [u8; 16] = [
    0x9a, 0x04, 0xf0, 0x79, 0x98, 0x40, 0x42, 0x86, 0xab, 0x92, 0xe6, 0x5b, 0xe0, 0x88, 0x5f, 0x95,
];
const WIDEVINE: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];
const CLEARKEY: [u8; 16] = [
    0xe2, 0x71, 0x9d, 0x58, 0xa9, 0x85, 0xb3, 0xc9, 0x78, 0x1a, 0xb0, 0x30, 0xaf, 0x78, 0xd3, 0x0e,
];
const COMMON: [u8; 16] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb, 0x4b,
];

pub const PLAYREADY_KEY_SYSTEM: &str = "com.microsoft.playready";
pub const WIDEVINE_KEY_SYSTEM: &str = "com.widevine.alpha";
pub const CLEARKEY_KEY_SYSTEM: &str = "org.w3.clearkey";

/// Protection system id as carried by `pssh` boxes and manifests.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SystemId {
    PlayReady,
    Widevine,
    ClearKey,
    /// W3C common pssh format, used by clear key content.
    Common,
    Other([u8; 16]),
}

impl SystemId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        match bytes {
            PLAYREADY => Self::PlayReady,
            WIDEVINE => Self::Widevine,
            CLEARKEY => Self::ClearKey,
            COMMON => Self::Common,
            x => Self::Other(x),
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        match self {
            Self::PlayReady => PLAYREADY,
            Self::Widevine => WIDEVINE,
            Self::ClearKey => CLEARKEY,
            Self::Common => COMMON,
            Self::Other(x) => x,
        }
    }

    /// EME key system string, if this system has one.
    pub fn key_system(self) -> Option<&'static str> {
        match self {
            Self::PlayReady => Some(PLAYREADY_KEY_SYSTEM),
            Self::Widevine => Some(WIDEVINE_KEY_SYSTEM),
            Self::ClearKey | Self::Common => Some(CLEARKEY_KEY_SYSTEM),
            Self::Other(_) => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PlayReady => "playready",
            Self::Widevine => "widevine",
            Self::ClearKey => "clearkey",
            Self::Common => "common",
            Self::Other(_) => "unknown",
        }
    }

    /// How key ids are embedded in this system's init data.
    pub fn layout(self) -> InitDataLayout {
        match self {
            Self::PlayReady => InitDataLayout::DelimiterTagged,
            _ => InitDataLayout::FixedOffset,
        }
    }

    /// Whether a `pssh` box carrying `other` is acceptable init data for `self`.
    pub fn accepts(self, other: SystemId) -> bool {
        self == other || (self == Self::ClearKey && other == Self::Common)
    }

    pub fn uuid(self) -> String {
        let x = hex::encode(self.to_bytes());
        format!(
            "{}-{}-{}-{}-{}",
            &x[..8],
            &x[8..12],
            &x[12..16],
            &x[16..20],
            &x[20..]
        )
    }
}

impl FromStr for SystemId {
    type Err = Error;

    /// Accepts a dashed uuid, 32 hex characters, an optional `urn:uuid:`
    /// prefix, or an EME key system string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        match s.to_ascii_lowercase().as_str() {
            PLAYREADY_KEY_SYSTEM => return Ok(Self::PlayReady),
            WIDEVINE_KEY_SYSTEM => return Ok(Self::Widevine),
            CLEARKEY_KEY_SYSTEM => return Ok(Self::ClearKey),
            _ => (),
        }

        let value = s
            .strip_prefix("urn:uuid:")
            .unwrap_or(s)
            .replace('-', "");
        let mut bytes = [0; 16];

        hex::decode_to_slice(&value, &mut bytes)
            .map_err(|_| Error::UnknownSystemId(s.to_owned()))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(_) => write!(f, "{}", self.uuid()),
            x => write!(f, "{}", x.name()),
        }
    }
}
