use crate::{Error, Result, decrypt::SubsampleEntry};
use aes::{
    Aes128,
    cipher::{KeyIvInit, StreamCipher, generic_array::GenericArray},
};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Decrypts `cenc` samples protected with one content key.
#[derive(Clone)]
pub struct SampleDecrypter {
    key: [u8; 16],
}

impl SampleDecrypter {
    pub fn new(key: [u8; 16]) -> Self {
        Self { key }
    }

    /// Decrypt `data` in place.
    ///
    /// An 8 byte `iv` is zero padded to 16 bytes. With an empty subsample map
    /// the whole sample is encrypted. The encrypted ranges of a sample share
    /// one keystream, and bytes past the end of the map are left as they are.
    pub fn decrypt_sample(
        &self,
        iv: &[u8],
        data: &mut [u8],
        subsamples: &[SubsampleEntry],
    ) -> Result<()> {
        let iv = Self::expand_iv(iv)?;
        let covered = subsamples.iter().map(SubsampleEntry::len).sum::<usize>();

        if covered > data.len() {
            return Err(Error::SubsampleOverflow {
                covered,
                available: data.len(),
            });
        }

        let mut cipher = Aes128Ctr::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&iv),
        );

        if subsamples.is_empty() {
            cipher.apply_keystream(data);
            return Ok(());
        }

        let mut offset = 0;

        for subsample in subsamples {
            offset += subsample.bytes_of_cleartext_data as usize;
            let encrypted = subsample.bytes_of_encrypted_data as usize;
            cipher.apply_keystream(&mut data[offset..offset + encrypted]);
            offset += encrypted;
        }

        Ok(())
    }

    fn expand_iv(iv: &[u8]) -> Result<[u8; 16]> {
        let mut expanded = [0; 16];

        match iv.len() {
            8 | 16 => expanded[..iv.len()].copy_from_slice(iv),
            x => return Err(Error::InvalidIvSize(x)),
        }

        Ok(expanded)
    }
}
