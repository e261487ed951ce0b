/*
    REFERENCES
    ----------

    1. https://learn.microsoft.com/en-us/playready/specifications/playready-header-specification

*/

//! PlayReady object, the data carried inside PlayReady `pssh` boxes.

use crate::{Error, Reader, Result};
use base64::Engine;
use serde::Deserialize;

const RIGHTS_MANAGEMENT_HEADER: u16 = 1;

/// The WRM header of a PlayReady object.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayReadyHeader {
    pub version: String,
    /// Key ids as they appear in the header (little endian GUID bytes).
    pub kids: Vec<Vec<u8>>,
    pub la_url: Option<String>,
    /// The header text as UTF-8.
    pub xml: String,
}

/// Parse the rights management headers of a PlayReady object.
pub fn parse(data: &[u8]) -> Result<Vec<PlayReadyHeader>> {
    let mut reader = Reader::new_little_endian(data);
    let size = reader.read_u32()?;

    if size as usize != data.len() {
        return Err(Error::PlayReady(format!(
            "object length {} does not match data length {}",
            size,
            data.len()
        )));
    }

    let count = reader.read_u16()?;
    let mut headers = vec![];

    for _ in 0..count {
        let record_type = reader.read_u16()?;
        let record_len = reader.read_u16()?;
        let record_data = reader.read_bytes_u16(record_len as usize)?;

        match record_type {
            RIGHTS_MANAGEMENT_HEADER => {
                let xml = String::from_utf16(&record_data)?;
                let wrm_header = quick_xml::de::from_str::<WrmHeader>(&xml)?;
                headers.push(PlayReadyHeader {
                    kids: wrm_header.kids()?,
                    la_url: wrm_header.data.as_ref().and_then(|x| x.la_url.clone()),
                    version: wrm_header.version,
                    xml,
                });
            }
            2 | 3 => (),
            x => return Err(Error::PlayReady(format!("invalid record type {x}"))),
        }
    }

    if reader.has_more_data() {
        return Err(Error::PlayReady("extra data after object records".to_owned()));
    }

    Ok(headers)
}

/// Wrap a WRM header into a PlayReady object.
pub fn build(xml: &str) -> Vec<u8> {
    let record: Vec<u8> = xml.encode_utf16().flat_map(|x| x.to_le_bytes()).collect();
    let mut data = ((record.len() + 10) as u32).to_le_bytes().to_vec();
    data.extend_from_slice(&1_u16.to_le_bytes());
    data.extend_from_slice(&RIGHTS_MANAGEMENT_HEADER.to_le_bytes());
    data.extend_from_slice(&(record.len() as u16).to_le_bytes());
    data.extend(record);
    data
}

#[derive(Deserialize)]
#[serde(rename = "WRMHEADER")]
struct WrmHeader {
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "DATA")]
    data: Option<Data>,
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "KID")]
    kid: Option<String>,
    #[serde(rename = "LA_URL")]
    la_url: Option<String>,
    #[serde(rename = "PROTECTINFO")]
    protect_info: Option<ProtectInfo>,
}

#[derive(Deserialize)]
struct ProtectInfo {
    #[serde(rename = "KID")]
    kid: Option<KeyId>,
    #[serde(rename = "KIDS", default)]
    kids: Option<KeyIds>,
}

#[derive(Deserialize)]
struct KeyId {
    #[serde(rename = "@VALUE")]
    value: String,
}

#[derive(Deserialize)]
struct KeyIds {
    #[serde(rename = "KID", default)]
    kids: Vec<KeyId>,
}

impl WrmHeader {
    fn kids(&self) -> Result<Vec<Vec<u8>>> {
        let mut kids = vec![];

        match (self.version.as_str(), &self.data) {
            (_, None) => (),
            ("4.0.0.0", Some(data)) => kids.extend(data.kid.clone()),
            ("4.1.0.0", Some(data)) => {
                if let Some(ProtectInfo { kid: Some(x), .. }) = &data.protect_info {
                    kids.push(x.value.clone());
                }
            }
            ("4.2.0.0" | "4.3.0.0", Some(data)) => {
                if let Some(info) = &data.protect_info {
                    kids.extend(info.kid.iter().map(|x| x.value.clone()));
                    kids.extend(
                        info.kids
                            .iter()
                            .flat_map(|x| x.kids.iter().map(|x| x.value.clone())),
                    );
                }
            }
            (x, _) => {
                return Err(Error::PlayReady(format!("unsupported header version v{x}")));
            }
        }

        kids.iter()
            .map(|x| {
                base64::engine::general_purpose::STANDARD
                    .decode(x.trim())
                    .map_err(Error::from)
            })
            .collect()
    }
}
