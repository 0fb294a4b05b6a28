//! TLS record framing: the outermost `TLSPlaintext`/`TLSCiphertext` header.

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{ErrorKind, Result, TlsError};

/// `enum { ... } ContentType;`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl TryFrom<u8> for ContentType {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        Ok(match value {
            20 => Self::ChangeCipherSpec,
            21 => Self::Alert,
            22 => Self::Handshake,
            23 => Self::ApplicationData,
            _ => return Err(value),
        })
    }
}

/// The record-layer version field. Always `0x0303` ("TLS 1.2") on the wire
/// for TLS 1.3 records, per the compatibility requirement in RFC 8446
/// section 5.1; the real version lives in the `supported_versions`
/// extension instead.
pub const LEGACY_RECORD_VERSION: u16 = 0x0303;

pub const RECORD_HEADER_LEN: usize = 5;
pub const MAX_PLAINTEXT_LEN: usize = 16384;
/// Plaintext length plus the inner content-type byte plus the AEAD tag.
pub const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + 1 + 255;

/// The five-byte header prefixing every record on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub length: u16,
}

impl RecordHeader {
    pub fn serialize(&self, out: &mut ByteWriter) {
        out.push_u8(self.content_type as u8);
        out.push_u16(LEGACY_RECORD_VERSION);
        out.push_u16(self.length);
    }

    pub fn parse(input: &mut ByteReader) -> Result<Self> {
        let content_type_raw = input.read_u8()?;
        let content_type = ContentType::try_from(content_type_raw)
            .map_err(|_| TlsError::new(ErrorKind::UnexpectedMessage, "unknown record content type"))?;
        let _version = input.read_u16()?;
        let length = input.read_u16()?;
        if length as usize > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::new(ErrorKind::RecordOverflow, "record length exceeds maximum"));
        }
        Ok(Self { content_type, length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header() {
        let header = RecordHeader {
            content_type: ContentType::ApplicationData,
            length: 42,
        };
        let mut out = ByteWriter::new();
        header.serialize(&mut out);
        let bytes = out.finish();
        assert_eq!(bytes, [23, 0x03, 0x03, 0, 42]);

        let mut reader = ByteReader::new(&bytes);
        let parsed = RecordHeader::parse(&mut reader).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut out = ByteWriter::new();
        out.push_u8(ContentType::ApplicationData as u8);
        out.push_u16(LEGACY_RECORD_VERSION);
        out.push_u16(0xffff);
        let bytes = out.finish();
        let mut reader = ByteReader::new(&bytes);
        assert!(RecordHeader::parse(&mut reader).is_err());
    }
}
