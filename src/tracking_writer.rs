#![forbid(unsafe_code)]

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

use crate::error::DecodeError;

////////////////////////////////////////////////////////////////////////////////

static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Output side of a decode: a fixed-capacity destination that counts and
/// checksums everything written to it.
pub struct TrackingWriter<'a> {
    digest: Digest<'static, u32>,
    inner: &'a mut [u8],
    byte_n: usize,
}

impl<'a> TrackingWriter<'a> {
    pub fn new(inner: &'a mut [u8]) -> Self {
        Self {
            digest: CRC.digest(),
            inner,
            byte_n: 0,
        }
    }

    fn reserve(&self, len: usize) -> Result<(), DecodeError> {
        if self.inner.len() - self.byte_n < len {
            return Err(DecodeError::OutputOverflow);
        }
        Ok(())
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<(), DecodeError> {
        self.write_slice(&[byte])
    }

    pub fn write_slice(&mut self, buf: &[u8]) -> Result<(), DecodeError> {
        self.reserve(buf.len())?;
        let end = self.byte_n + buf.len();
        self.inner[self.byte_n..end].copy_from_slice(buf);
        self.digest.update(buf);
        self.byte_n = end;
        Ok(())
    }

    /// Write a sequence of `len` bytes written `dist` bytes ago and return
    /// the bytes written.
    ///
    /// Bytes are copied one at a time so that `dist < len` repeats the
    /// freshly written bytes.
    pub fn write_previous(&mut self, dist: usize, len: usize) -> Result<&[u8], DecodeError> {
        if dist == 0 || dist > self.byte_n {
            return Err(DecodeError::InvalidDistance);
        }
        self.reserve(len)?;

        let start = self.byte_n;
        for i in start..start + len {
            self.inner[i] = self.inner[i - dist];
        }
        self.byte_n += len;

        let written = &self.inner[start..self.byte_n];
        self.digest.update(written);
        Ok(written)
    }

    pub fn byte_count(&self) -> usize {
        self.byte_n
    }

    pub fn written(&self) -> &[u8] {
        &self.inner[..self.byte_n]
    }

    /// The written prefix of the destination and its CRC-32.
    pub fn finish(self) -> (&'a [u8], u32) {
        let crc32 = self.digest.finalize();
        let inner: &'a [u8] = self.inner;
        (&inner[..self.byte_n], crc32)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write() -> Result<(), DecodeError> {
        let mut buf = [0u8; 10];
        let mut writer = TrackingWriter::new(&mut buf);

        writer.write_slice(&[1, 2, 3, 4])?;
        assert_eq!(writer.byte_count(), 4);

        writer.write_slice(&[4, 8, 15, 16, 23])?;
        assert_eq!(writer.byte_count(), 9);

        assert_eq!(
            writer.write_slice(&[0, 0, 123]),
            Err(DecodeError::OutputOverflow)
        );
        assert_eq!(writer.byte_count(), 9);

        writer.write_u8(42)?;
        assert_eq!(writer.write_u8(0), Err(DecodeError::OutputOverflow));

        let (written, crc32) = writer.finish();
        assert_eq!(written, &[1, 2, 3, 4, 4, 8, 15, 16, 23, 42]);
        assert_eq!(crc32, CRC.checksum(written));
        Ok(())
    }

    #[test]
    fn write_previous() -> Result<(), DecodeError> {
        let mut buf = [0u8; 512];
        let mut writer = TrackingWriter::new(&mut buf);

        for i in 0..=255 {
            writer.write_u8(i)?;
        }

        let copied = writer.write_previous(192, 128)?;
        assert_eq!(copied, (64..192).map(|i| i as u8).collect::<Vec<_>>().as_slice());
        assert_eq!(writer.byte_count(), 384);

        assert_eq!(
            writer.write_previous(10000, 20),
            Err(DecodeError::InvalidDistance)
        );
        assert_eq!(writer.write_previous(0, 20), Err(DecodeError::InvalidDistance));
        assert_eq!(writer.byte_count(), 384);

        assert_eq!(
            writer.write_previous(256, 256),
            Err(DecodeError::OutputOverflow)
        );
        assert_eq!(writer.byte_count(), 384);
        Ok(())
    }

    #[test]
    fn overlapping_copy() -> Result<(), DecodeError> {
        let mut buf = [0u8; 64];
        let mut writer = TrackingWriter::new(&mut buf);

        writer.write_slice(b"abX")?;
        assert_eq!(writer.write_previous(1, 5)?, b"XXXXX");

        writer.write_slice(b"Aboba or Bebra")?;
        writer.write_previous(2, 8)?;
        assert_eq!(writer.written(), b"abXXXXXXAboba or Bebrarararara");
        Ok(())
    }
}
