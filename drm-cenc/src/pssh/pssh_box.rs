/*
    REFERENCES
    ----------

    1. https://github.com/shaka-project/shaka-player/blob/4e933116984beb630d31ce7a0b8c9bc6f8b48c06/lib/util/pssh.js
    2. https://w3c.github.io/encrypted-media/format-registry/initdata/cenc.html

*/

use crate::{Error, Mp4Parser, ParsedBox, Reader, Result, SystemId, parser};
use base64::Engine;
use std::{cell::RefCell, rc::Rc};

/// One `pssh` box.
///
/// Field offsets inside a box with a 32-bit size:
///
/// | offset | size | field |
/// |--------|------|-------|
/// | 0  | 4  | box size |
/// | 4  | 4  | `pssh` |
/// | 8  | 1  | version |
/// | 9  | 3  | flags |
/// | 12 | 16 | system id |
/// | 28 | 4  | key id count (version 1 only) |
/// | 32 | 16 × count | key ids (version 1 only) |
/// | .. | 4  | data size |
/// | .. | n  | system specific data |
#[derive(Clone, Debug, PartialEq)]
pub struct PsshBox {
    pub version: u8,
    pub flags: u32,
    pub system_id: SystemId,
    /// Key ids listed in the box header (version 1 boxes only).
    pub key_ids: Vec<[u8; 16]>,
    /// System specific data.
    pub data: Vec<u8>,
    /// The complete box.
    pub raw: Vec<u8>,
}

impl PsshBox {
    /// Parse a single complete `pssh` box.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new_big_endian(bytes);
        let size = reader.read_u32()? as u64;

        if size < 32 || size > bytes.len() as u64 {
            return Err(Error::InvalidBoxSize {
                size,
                available: bytes.len(),
            });
        }

        let box_type = reader.read_bytes_u8(4)?;

        if box_type != b"pssh" {
            return Err(Error::NotPssh(String::from_utf8_lossy(&box_type).into_owned()));
        }

        let version_and_flags = reader.read_u32()?;
        let version = (version_and_flags >> 24) as u8;

        if version > 1 {
            return Err(Error::UnsupportedVersion(version));
        }

        let system_id = SystemId::from_bytes(reader.read_array_16()?);
        let mut key_ids = vec![];

        if version > 0 {
            let count = reader.read_u32()?;

            for _ in 0..count {
                key_ids.push(reader.read_array_16()?);
            }
        }

        let data_size = reader.read_u32()?;
        let data = reader.read_bytes_u8(data_size as usize)?;

        if reader.get_position() > size {
            return Err(Error::InvalidBoxSize {
                size,
                available: reader.get_position() as usize,
            });
        }

        Ok(Self {
            version,
            flags: version_and_flags & 0xFFFFFF,
            system_id,
            key_ids,
            data,
            raw: bytes[..size as usize].to_vec(),
        })
    }

    /// Collect every `pssh` box of an init segment (`moov`) or media
    /// segment (`moof`).
    pub fn from_init(data: &[u8]) -> Result<Vec<Self>> {
        let boxes = Rc::new(RefCell::new(vec![]));
        let boxes_c = boxes.clone();

        Mp4Parser::new()
            .base_box("moov", Rc::new(parser::children))
            .base_box("moof", Rc::new(parser::children))
            .full_box(
                "pssh",
                Rc::new(move |box_: ParsedBox| {
                    let pssh = Self::parse(&box_.data)?;

                    if !boxes_c.borrow().contains(&pssh) {
                        boxes_c.borrow_mut().push(pssh);
                    }

                    Ok(())
                }),
            )
            .parse(data, true)?;

        Ok(boxes.take())
    }

    /// Decode a base64 `pssh` box, as found in DASH `cenc:pssh` elements.
    pub fn from_base64(input: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(input.trim())?;
        Self::parse(&bytes)
    }

    pub fn as_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.raw)
    }

    /// Build a box from its parts.
    pub fn build(system_id: SystemId, key_ids: &[[u8; 16]], data: &[u8]) -> Self {
        let version = if key_ids.is_empty() { 0 } else { 1 };
        let mut raw = vec![0, 0, 0, 0];
        raw.extend_from_slice(b"pssh");
        raw.extend_from_slice(&((version as u32) << 24).to_be_bytes());
        raw.extend_from_slice(&system_id.to_bytes());

        if version > 0 {
            raw.extend_from_slice(&(key_ids.len() as u32).to_be_bytes());

            for kid in key_ids {
                raw.extend_from_slice(kid);
            }
        }

        raw.extend_from_slice(&(data.len() as u32).to_be_bytes());
        raw.extend_from_slice(data);

        let size = (raw.len() as u32).to_be_bytes();
        raw[..4].copy_from_slice(&size);

        Self {
            version,
            flags: 0,
            system_id,
            key_ids: key_ids.to_vec(),
            data: data.to_vec(),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_1() {
        let built = PsshBox::build(SystemId::Common, &[[0x11; 16], [0x22; 16]], &[]);
        let parsed = PsshBox::parse(&built.raw).unwrap();

        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.system_id, SystemId::Common);
        assert_eq!(parsed.key_ids, vec![[0x11; 16], [0x22; 16]]);
        assert!(parsed.data.is_empty());
        // first key id sits at the fixed offset 32
        assert_eq!(&built.raw[32..48], &[0x11; 16]);
    }

    #[test]
    fn test_rejects_other_boxes() {
        let mut raw = PsshBox::build(SystemId::Widevine, &[], b"abc").raw;
        raw[4..8].copy_from_slice(b"free");

        assert!(matches!(PsshBox::parse(&raw), Err(Error::NotPssh(x)) if x == "free"));
    }

    #[test]
    fn test_rejects_truncated() {
        let raw = PsshBox::build(SystemId::Widevine, &[], b"abcdef").raw;

        assert!(PsshBox::parse(&raw[..raw.len() - 2]).is_err());
        assert!(PsshBox::parse(&raw[..20]).is_err());
    }

    #[test]
    fn test_from_init() {
        let widevine = PsshBox::build(SystemId::Widevine, &[], b"wv");
        let common = PsshBox::build(SystemId::Common, &[[7; 16]], &[]);

        let mut moov_payload = vec![0, 0, 0, 8];
        moov_payload.extend_from_slice(b"mvhd");
        moov_payload.extend_from_slice(&widevine.raw);
        moov_payload.extend_from_slice(&common.raw);
        moov_payload.extend_from_slice(&widevine.raw);

        let mut init = ((moov_payload.len() + 8) as u32).to_be_bytes().to_vec();
        init.extend_from_slice(b"moov");
        init.extend(moov_payload);

        let boxes = PsshBox::from_init(&init).unwrap();
        assert_eq!(boxes, vec![widevine, common]);
    }

    #[test]
    fn test_from_init_huge_64_bit_size() {
        for name in [b"moov", b"mdat"] {
            let mut init = vec![0, 0, 0, 8];
            init.extend_from_slice(b"free");
            init.extend_from_slice(&[0, 0, 0, 1]);
            init.extend_from_slice(name);
            init.extend_from_slice(&u64::MAX.to_be_bytes());

            assert_eq!(PsshBox::from_init(&init).unwrap(), vec![]);
        }
    }
}
