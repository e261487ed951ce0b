/*
    REFERENCES
    ----------

    1. https://github.com/shaka-project/shaka-player/blob/7098f43f70119226bca2e5583833aaf27b498e33/lib/util/mp4_parser.js

*/

use crate::{Reader, Result};
use std::{collections::HashMap, rc::Rc};

/// `Result` type returned by box callbacks.
pub type HandlerResult = Result<()>;
/// Callback type for parsing a box.
pub type CallbackType = Rc<dyn Fn(ParsedBox) -> HandlerResult>;

/// Mp4 box walker.
#[derive(Clone, Default)]
pub struct Mp4Parser {
    headers: HashMap<u32, BoxType>,
    box_definitions: HashMap<u32, CallbackType>,
    done: bool,
}

impl Mp4Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a box type as a Basic Box.
    pub fn base_box(mut self, type_: &str, definition: CallbackType) -> Self {
        let type_code = type_from_string(type_);
        self.headers.insert(type_code, BoxType::BasicBox);
        self.box_definitions.insert(type_code, definition);
        self
    }

    /// Declare a box type as a Full Box.
    pub fn full_box(mut self, type_: &str, definition: CallbackType) -> Self {
        let type_code = type_from_string(type_);
        self.headers.insert(type_code, BoxType::FullBox);
        self.box_definitions.insert(type_code, definition);
        self
    }

    /// Stop parsing.
    pub fn stop(&mut self) {
        self.done = true;
    }

    /// Parse the given data using the added callbacks.
    ///
    /// When `partial_okay` is true a box that claims more bytes than available
    /// is truncated instead of failing, which is what range-requested init
    /// segments need.
    pub fn parse(&mut self, data: &[u8], partial_okay: bool) -> HandlerResult {
        let mut reader = Reader::new_big_endian(data);

        self.done = false;

        while reader.has_more_data() && !self.done {
            self.parse_next(0, &mut reader, partial_okay)?;
        }

        Ok(())
    }

    fn parse_next(&mut self, abs_start: u64, reader: &mut Reader, partial_okay: bool) -> HandlerResult {
        let start = reader.get_position();

        let mut size = reader.read_u32()? as u64;
        let type_ = reader.read_u32()?;
        let name = type_to_string(type_)?;
        let mut has_64_bit_size = false;

        match size {
            0 => size = reader.get_length() - start,
            1 => {
                size = reader.read_u64()?;
                has_64_bit_size = true;
            }
            _ => (),
        }

        let Some(box_definition) = self.box_definitions.get(&type_).cloned() else {
            // Unknown boxes are skipped, clamped to whatever data is left.
            let skip_length = start
                .saturating_add(size)
                .saturating_sub(reader.get_position())
                .min(reader.get_length() - reader.get_position());
            return reader.skip(skip_length);
        };

        let mut version = None;
        let mut flags = None;

        if self.headers.get(&type_) == Some(&BoxType::FullBox) {
            let version_and_flags = reader.read_u32()?;
            version = Some((version_and_flags >> 24) as u8);
            flags = Some(version_and_flags & 0xFFFFFF);
        }

        let mut end = start.saturating_add(size);

        if partial_okay && end > reader.get_length() {
            end = reader.get_length();
        }

        let payload_size = end.saturating_sub(reader.get_position());
        let payload = reader.read_bytes_u8(payload_size as usize)?;

        box_definition(ParsedBox {
            name,
            parser: self.clone(),
            partial_okay,
            start: start + abs_start,
            size,
            version,
            flags,
            data: reader.slice(start, end).to_vec(),
            reader: Reader::new_big_endian(payload),
            has_64_bit_size,
        })
    }
}

/// A callback that tells the parser to treat the body of a box as a series
/// of boxes.
pub fn children(mut box_: ParsedBox) -> HandlerResult {
    let header_size = box_.header_size();

    while box_.reader.has_more_data() && !box_.parser.done {
        box_.parser
            .parse_next(box_.start + header_size, &mut box_.reader, box_.partial_okay)?;
    }

    Ok(())
}

/// Convert an ascii string name to the integer type for a box.
pub fn type_from_string(name: &str) -> u32 {
    assert!(name.len() == 4, "MP4 box names must be 4 characters long");
    name.bytes().fold(0, |code, chr| (code << 8) | chr as u32)
}

/// Convert an integer type from a box into an ascii string name.
pub fn type_to_string(type_: u32) -> std::result::Result<String, std::string::FromUtf8Error> {
    String::from_utf8(type_.to_be_bytes().to_vec())
}

#[derive(Clone, Copy, PartialEq)]
enum BoxType {
    BasicBox,
    FullBox,
}

/// Parsed mp4 box.
pub struct ParsedBox {
    /// The box name, a 4-character string (fourcc).
    pub name: String,
    /// The parser that parsed this box, used to parse child boxes.
    pub parser: Mp4Parser,
    pub partial_okay: bool,
    /// Absolute start of this box (before the header) in the original buffer.
    pub start: u64,
    /// The size of this box (including the header).
    pub size: u64,
    /// The version for a full box, `None` for basic boxes.
    pub version: Option<u8>,
    /// The flags for a full box, `None` for basic boxes.
    pub flags: Option<u32>,
    /// The complete box, header included.
    pub data: Vec<u8>,
    /// Reader over the payload only.
    pub reader: Reader,
    pub has_64_bit_size: bool,
}

impl ParsedBox {
    /// Find the header size of the box.
    pub fn header_size(&self) -> u64 {
        let basic_header_size = 8;
        let _64_bit_field_size = if self.has_64_bit_size { 8 } else { 0 };
        let version_and_flags_size = if self.flags.is_some() { 4 } else { 0 };
        basic_header_size + _64_bit_field_size + version_and_flags_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn make_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        data.extend_from_slice(name);
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_walks_nested_boxes() {
        let inner = make_box(b"abcd", &[1, 2, 3]);
        let mut moov_payload = make_box(b"free", &[0; 4]);
        moov_payload.extend(inner);
        let data = make_box(b"moov", &moov_payload);

        let seen = Rc::new(RefCell::new(vec![]));
        let seen_c = seen.clone();

        Mp4Parser::new()
            .base_box("moov", Rc::new(children))
            .base_box(
                "abcd",
                Rc::new(move |box_: ParsedBox| {
                    seen_c.borrow_mut().push((box_.name.clone(), box_.data.clone()));
                    Ok(())
                }),
            )
            .parse(&data, false)
            .unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "abcd");
        assert_eq!(seen[0].1, make_box(b"abcd", &[1, 2, 3]));
    }

    #[test]
    fn test_type_string_round() {
        assert_eq!(type_to_string(type_from_string("pssh")).unwrap(), "pssh");
    }
}
