use crate::{Error, Result};

#[derive(Clone, Copy, Default)]
enum Endianness {
    #[default]
    Big,
    Little,
}

/// Reader for parsing binary box data.
#[derive(Clone, Default)]
pub struct Reader {
    endian: Endianness,
    data: Vec<u8>,
    position: u64,
}

impl Reader {
    pub fn new_big_endian(data: impl Into<Vec<u8>>) -> Self {
        Self {
            endian: Endianness::Big,
            data: data.into(),
            position: 0,
        }
    }

    pub fn new_little_endian(data: impl Into<Vec<u8>>) -> Self {
        Self {
            endian: Endianness::Little,
            data: data.into(),
            position: 0,
        }
    }

    pub fn has_more_data(&self) -> bool {
        self.position < self.get_length()
    }

    pub fn get_length(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn get_position(&self) -> u64 {
        self.position
    }

    /// Bytes between two absolute positions, clamped to the data length.
    pub fn slice(&self, start: u64, end: u64) -> &[u8] {
        let end = end.min(self.get_length()) as usize;
        let start = (start as usize).min(end);
        &self.data[start..end]
    }

    pub fn skip(&mut self, bytes: u64) -> Result<()> {
        self.take(bytes).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let buf = self.array::<2>()?;

        Ok(match self.endian {
            Endianness::Big => u16::from_be_bytes(buf),
            Endianness::Little => u16::from_le_bytes(buf),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let buf = self.array::<4>()?;

        Ok(match self.endian {
            Endianness::Big => u32::from_be_bytes(buf),
            Endianness::Little => u32::from_le_bytes(buf),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let buf = self.array::<8>()?;

        Ok(match self.endian {
            Endianness::Big => u64::from_be_bytes(buf),
            Endianness::Little => u64::from_le_bytes(buf),
        })
    }

    pub fn read_bytes_u8(&mut self, bytes: usize) -> Result<Vec<u8>> {
        Ok(self.take(bytes as u64)?.to_vec())
    }

    pub fn read_bytes_u16(&mut self, bytes: usize) -> Result<Vec<u16>> {
        let endian = self.endian;

        Ok(self
            .take(bytes as u64)?
            .chunks_exact(2)
            .map(|x| match endian {
                Endianness::Big => u16::from_be_bytes([x[0], x[1]]),
                Endianness::Little => u16::from_le_bytes([x[0], x[1]]),
            })
            .collect())
    }

    pub fn read_array_16(&mut self) -> Result<[u8; 16]> {
        self.array::<16>()
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0; N];
        buf.copy_from_slice(self.take(N as u64)?);
        Ok(buf)
    }

    fn take(&mut self, bytes: u64) -> Result<&[u8]> {
        let end = self.position.checked_add(bytes).unwrap_or(u64::MAX);

        if end > self.get_length() {
            return Err(Error::UnexpectedEof {
                offset: self.position,
                wanted: bytes,
            });
        }

        let start = self.position as usize;
        self.position = end;
        Ok(&self.data[start..end as usize])
    }
}
