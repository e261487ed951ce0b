#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate contains the protection-system side of common encryption:
//! system ids, `PSSH` box parsing, content key id extraction from init data
//! and in-memory sample decryption.
//!
//! # Optional Features
//!
//! The following are a list of [Cargo features](https://doc.rust-lang.org/stable/cargo/reference/features.html#the-features-section) that can be
//! enabled or disabled:
//!
//! - **decrypt** (default): Enables AES-128 sample decryption for the `cenc` scheme.

#[cfg(feature = "decrypt")]
#[cfg_attr(docsrs, doc(cfg(feature = "decrypt")))]
pub mod decrypt;

pub mod keyid;
pub mod pssh;

mod error;
mod parser;
mod reader;
mod system_id;

pub use error::{Error, Result};
pub use keyid::{ContentKeyId, InitDataLayout, extract_content_metadata, extract_key_id};
pub use parser::{Mp4Parser, ParsedBox};
pub use reader::Reader;
pub use system_id::SystemId;
