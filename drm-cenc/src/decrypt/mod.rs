//! In-memory decryption of `cenc` (AES-128-CTR) common encryption samples.
//!
//! Samples are decrypted in place, one at a time, with the IV and
//! subsample map the caller already pulled out of the media segment.
//!
//! ```
//! use drm_cenc::decrypt::{SampleDecrypter, SubsampleEntry};
//!
//! let decrypter = SampleDecrypter::new([0x11; 16]);
//! let mut sample = vec![0_u8; 32];
//!
//! decrypter
//!     .decrypt_sample(&[0; 8], &mut sample, &[SubsampleEntry::new(16, 16)])
//!     .unwrap();
//! // clear bytes are left untouched
//! assert_eq!(&sample[..16], &[0; 16]);
//! ```

mod decrypter;

pub use decrypter::SampleDecrypter;

/// Entry describing a subsample's cleartext and encrypted portions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubsampleEntry {
    /// Number of cleartext bytes at the start of the subsample.
    pub bytes_of_cleartext_data: u16,
    /// Number of encrypted bytes following the cleartext.
    pub bytes_of_encrypted_data: u32,
}

impl SubsampleEntry {
    pub fn new(clear: u16, encrypted: u32) -> Self {
        Self {
            bytes_of_cleartext_data: clear,
            bytes_of_encrypted_data: encrypted,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes_of_cleartext_data as usize + self.bytes_of_encrypted_data as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
