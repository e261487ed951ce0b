//! `PSSH` box parsing.

mod pssh_box;

pub mod playready;
pub mod widevine;

pub use pssh_box::PsshBox;
