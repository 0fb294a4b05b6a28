//! Byte-string primitives: an immutable read cursor and a length-prefixed
//! write builder, the CBS/CBB-equivalent every other layer parses and
//! serializes through.

use crate::error::{proto_err, ErrorKind, Result, TlsError};

/// An immutable, cursor-advancing view over a byte slice.
///
/// Mirrors the `CircleReader` found in the corpus's embedded I/O layer, but
/// over a flat slice rather than a hardware ring buffer, since the record
/// layer here reassembles into an ordinary growable [`crate::buffer::RecvBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(TlsError::new(
                ErrorKind::DecodeError,
                "unexpected end of handshake message",
            ));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a vector with a 1-byte length prefix (`opaque<0..255>`).
    pub fn read_vec_u8(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u8()? as usize;
        self.take(len)
    }

    /// Reads a vector with a 2-byte length prefix (`opaque<0..65535>`).
    pub fn read_vec_u16(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u16()? as usize;
        self.take(len)
    }

    /// Reads a vector with a 3-byte length prefix (`opaque<0..2^24-1>`).
    pub fn read_vec_u24(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u24()? as usize;
        self.take(len)
    }

    /// Splits a 2-byte-length-prefixed sublist out as its own reader, the
    /// common shape for an extensions block or a list of fixed-size entries.
    pub fn read_reader_u16(&mut self) -> Result<ByteReader<'a>> {
        Ok(ByteReader::new(self.read_vec_u16()?))
    }

    pub fn read_reader_u8(&mut self) -> Result<ByteReader<'a>> {
        Ok(ByteReader::new(self.read_vec_u8()?))
    }

    pub fn read_reader_u24(&mut self) -> Result<ByteReader<'a>> {
        Ok(ByteReader::new(self.read_vec_u24()?))
    }

    /// Fails unless every byte of the underlying slice has been consumed.
    pub fn expect_exhausted(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(proto_err!(ErrorKind::TrailingData, "{} trailing byte(s) after message", self.remaining()))
        }
    }
}

/// An appendable byte buffer with stacked length-prefix placeholders.
///
/// `begin_u8`/`begin_u16`/`begin_u24` reserve space for a length prefix;
/// the matching [`LengthPrefix::finish`] backpatches it once the body has
/// been written, mirroring `serialize_varlen_vector` in the corpus's TLS
/// parsing helpers.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn push_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_u24(&mut self, v: u32) {
        debug_assert!(v < (1 << 24));
        self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn push_vec_u8(&mut self, data: &[u8]) {
        self.push_u8(data.len() as u8);
        self.push_bytes(data);
    }

    pub fn push_vec_u16(&mut self, data: &[u8]) {
        self.push_u16(data.len() as u16);
        self.push_bytes(data);
    }

    pub fn push_vec_u24(&mut self, data: &[u8]) {
        self.push_u24(data.len() as u32);
        self.push_bytes(data);
    }

    /// Reserves a 1-byte length prefix to be backpatched by [`LengthPrefix::finish`].
    pub fn begin_u8(&mut self) -> LengthPrefix {
        let at = self.buf.len();
        self.buf.push(0);
        LengthPrefix { at, width: 1 }
    }

    pub fn begin_u16(&mut self) -> LengthPrefix {
        let at = self.buf.len();
        self.buf.extend_from_slice(&[0, 0]);
        LengthPrefix { at, width: 2 }
    }

    pub fn begin_u24(&mut self) -> LengthPrefix {
        let at = self.buf.len();
        self.buf.extend_from_slice(&[0, 0, 0]);
        LengthPrefix { at, width: 3 }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// A reserved, not-yet-backpatched length prefix.
#[must_use = "a length prefix must be finished or the serialized length stays zero"]
pub struct LengthPrefix {
    at: usize,
    width: usize,
}

impl LengthPrefix {
    pub fn finish(self, out: &mut ByteWriter) {
        let body_len = out.buf.len() - self.at - self.width;
        match self.width {
            1 => {
                debug_assert!(body_len <= u8::MAX as usize);
                out.buf[self.at] = body_len as u8;
            }
            2 => {
                debug_assert!(body_len <= u16::MAX as usize);
                out.buf[self.at..self.at + 2].copy_from_slice(&(body_len as u16).to_be_bytes());
            }
            3 => {
                debug_assert!(body_len < (1 << 24));
                out.buf[self.at..self.at + 3]
                    .copy_from_slice(&(body_len as u32).to_be_bytes()[1..]);
            }
            _ => unreachable!("length prefix width is always 1, 2 or 3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_length_prefixed_vector() {
        let mut w = ByteWriter::new();
        let prefix = w.begin_u16();
        w.push_bytes(b"hello");
        prefix.finish(&mut w);

        let bytes = w.finish();
        assert_eq!(bytes, [0, 5, b'h', b'e', b'l', b'l', b'o']);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_vec_u16().unwrap(), b"hello");
        r.expect_exhausted().unwrap();
    }

    #[test]
    fn u24_round_trip() {
        let mut w = ByteWriter::new();
        w.push_u24(0x01_02_03);
        let bytes = w.finish();
        assert_eq!(bytes, [0x01, 0x02, 0x03]);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u24().unwrap(), 0x01_02_03);
    }

    #[test]
    fn trailing_data_is_rejected() {
        let bytes = [1u8, 2, 3];
        let r = ByteReader::new(&bytes);
        assert!(r.expect_exhausted().is_err());
    }

    #[test]
    fn short_read_fails() {
        let bytes = [1u8];
        let mut r = ByteReader::new(&bytes);
        assert!(r.read_u16().is_err());
    }
}
