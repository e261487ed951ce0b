//! Content key id extraction from protection system init data.
//!
//! The layout used to find the key id is picked from the [`SystemId`] alone,
//! the init data itself is never sniffed.

use crate::{Error, Result, SystemId, pssh::PsshBox, pssh::widevine};
use std::fmt;

pub const KEYID_TAG_START: &str = "<KID>";
pub const KEYID_TAG_END: &str = "</KID>";
pub const CONTENT_METADATA_TAG_START: &str = "<ckm:policy xmlns:ckm=\"urn:ccp:ckm\">";
pub const CONTENT_METADATA_TAG_END: &str = "</ckm:policy>";

/// How a protection system embeds key ids inside its init data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitDataLayout {
    /// A `pssh` box read at fixed offsets.
    FixedOffset,
    /// Text found between literal start and end markers.
    DelimiterTagged,
}

/// Opaque content key identifier, compared by content.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ContentKeyId(Vec<u8>);

impl ContentKeyId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(x) if !x.is_empty() && x.chars().all(|c| c.is_ascii_graphic()) => f.write_str(x),
            _ => f.write_str(&self.to_hex()),
        }
    }
}

impl From<Vec<u8>> for ContentKeyId {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<[u8; 16]> for ContentKeyId {
    fn from(value: [u8; 16]) -> Self {
        Self(value.to_vec())
    }
}

impl AsRef<[u8]> for ContentKeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Extract the content key id that a CDM session for `system` will need.
///
/// # Example
///
/// ```
/// use drm_cenc::{SystemId, extract_key_id};
///
/// let init = "<WRMHEADER><DATA><KID>ABCD1234</KID></DATA></WRMHEADER>";
/// let key = extract_key_id(SystemId::PlayReady, init.as_bytes()).unwrap();
/// assert_eq!(key.as_bytes(), b"ABCD1234");
/// ```
pub fn extract_key_id(system: SystemId, init_data: &[u8]) -> Result<ContentKeyId> {
    match system.layout() {
        InitDataLayout::DelimiterTagged => {
            let key = extract_delimited(init_data, KEYID_TAG_START, KEYID_TAG_END).ok_or(
                Error::MissingMarker {
                    start: KEYID_TAG_START,
                    end: KEYID_TAG_END,
                },
            )?;

            if key.is_empty() {
                return Err(Error::MissingKeyId);
            }

            Ok(ContentKeyId(key))
        }
        InitDataLayout::FixedOffset => {
            let pssh = PsshBox::parse(init_data)?;

            if !system.accepts(pssh.system_id) {
                return Err(Error::SystemMismatch {
                    expected: system,
                    found: pssh.system_id,
                });
            }

            if let Some(kid) = pssh.key_ids.first() {
                return Ok(ContentKeyId::from(*kid));
            }

            if pssh.system_id == SystemId::Widevine {
                let data = widevine::parse(&pssh.data)?;

                if let Some(kid) = data.key_ids.into_iter().find(|x| !x.is_empty()) {
                    return Ok(ContentKeyId(kid));
                }
            }

            Err(Error::MissingKeyId)
        }
    }
}

/// Content metadata embedded in PlayReady init data.
///
/// Returns an empty buffer when the markers are absent or the system does
/// not carry metadata.
pub fn extract_content_metadata(system: SystemId, init_data: &[u8]) -> Vec<u8> {
    match system.layout() {
        InitDataLayout::DelimiterTagged => extract_delimited(
            init_data,
            CONTENT_METADATA_TAG_START,
            CONTENT_METADATA_TAG_END,
        )
        .unwrap_or_default(),
        InitDataLayout::FixedOffset => vec![],
    }
}

/// Bytes between the first `start` marker and the following `end` marker.
///
/// NUL bytes are dropped before searching, which turns UTF-16LE headers
/// into plain ASCII text.
pub fn extract_delimited(data: &[u8], start: &str, end: &str) -> Option<Vec<u8>> {
    let text: Vec<u8> = data.iter().copied().filter(|x| *x != 0).collect();
    let begin = find(&text, start.as_bytes())? + start.len();
    let len = find(&text[begin..], end.as_bytes())?;
    Some(text[begin..begin + len].to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
