//! AEAD record protection: sealing and opening `TLSCiphertext` records once
//! traffic keys are established.
//!
//! # References
//!
//! * [RFC 8446 Section 5](https://datatracker.ietf.org/doc/html/rfc8446#section-5)

use crate::bytes::{ByteReader, ByteWriter};
use crate::crypto::aead::{AeadAlgorithm, NONCE_LEN, TAG_LEN};
use crate::error::{ErrorKind, Result, TlsError};
use crate::record::{ContentType, RecordHeader, MAX_CIPHERTEXT_LEN, MAX_PLAINTEXT_LEN};

/// A 64-bit record sequence number, reset to zero every time a fresh set of
/// traffic keys is installed (initial handshake keys, application keys, or
/// a post-handshake `KeyUpdate`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Returns the current value and increments, per RFC 8446 section 5.3's
    /// requirement that it never wrap within one set of traffic keys --
    /// the engine must rekey (or close the connection) before 2^64 records.
    pub fn next(&mut self) -> Result<u64> {
        let current = self.0;
        self.0 = self
            .0
            .checked_add(1)
            .ok_or_else(|| TlsError::new(ErrorKind::InternalError, "record sequence number exhausted"))?;
        Ok(current)
    }

    /// The nonce for record `seq`: the static IV with the big-endian
    /// sequence number XORed into its low-order bytes.
    pub fn nonce(iv: &[u8; NONCE_LEN], seq: u64) -> [u8; NONCE_LEN] {
        let mut nonce = *iv;
        let seq_bytes = seq.to_be_bytes();
        for (n, s) in nonce[NONCE_LEN - 8..].iter_mut().zip(seq_bytes.iter()) {
            *n ^= s;
        }
        nonce
    }
}

/// One direction's (read or write) AEAD state: algorithm, key, static IV,
/// and the running sequence number.
pub struct DirectionState {
    pub algorithm: AeadAlgorithm,
    pub key: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
    pub sequence: SequenceNumber,
}

impl DirectionState {
    pub fn new(algorithm: AeadAlgorithm, key: Vec<u8>, iv: [u8; NONCE_LEN]) -> Self {
        Self {
            algorithm,
            key,
            iv,
            sequence: SequenceNumber::default(),
        }
    }
}

/// Seals and opens application-layer records once handshake or application
/// traffic keys are installed. Before that, records are sent and received
/// in plaintext and this type is simply absent from the context.
pub struct RecordLayer {
    pub write: DirectionState,
    pub read: DirectionState,
}

impl RecordLayer {
    pub fn new(write: DirectionState, read: DirectionState) -> Self {
        Self { write, read }
    }

    /// Frames and encrypts `payload` (of content type `inner_type`) into
    /// one or more `TLSCiphertext` records, appending them to `out`.
    ///
    /// Splits `payload` into chunks no larger than [`MAX_PLAINTEXT_LEN`];
    /// callers sending a single handshake flight typically fit in one
    /// record, but application data writes may not.
    pub fn seal_into(&mut self, inner_type: ContentType, payload: &[u8], out: &mut ByteWriter) -> Result<()> {
        for chunk in payload.chunks(MAX_PLAINTEXT_LEN) {
            self.seal_one(inner_type, chunk, out)?;
        }
        if payload.is_empty() {
            self.seal_one(inner_type, &[], out)?;
        }
        Ok(())
    }

    fn seal_one(&mut self, inner_type: ContentType, chunk: &[u8], out: &mut ByteWriter) -> Result<()> {
        let mut plaintext = Vec::with_capacity(chunk.len() + 1);
        plaintext.extend_from_slice(chunk);
        plaintext.push(inner_type as u8);

        let seq = self.write.sequence.next()?;
        let nonce = SequenceNumber::nonce(&self.write.iv, seq);

        let ciphertext_len = plaintext.len() + TAG_LEN;
        if ciphertext_len > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::new(ErrorKind::RecordOverflow, "sealed record exceeds maximum length"));
        }

        let header = RecordHeader {
            content_type: ContentType::ApplicationData,
            length: ciphertext_len as u16,
        };
        let mut aad = ByteWriter::new();
        header.serialize(&mut aad);
        let aad = aad.finish();

        let ciphertext = self.write.algorithm.seal(&self.write.key, &nonce, &aad, &plaintext)?;
        out.push_bytes(&aad);
        out.push_bytes(&ciphertext);
        Ok(())
    }

    /// Opens one `TLSCiphertext` record (header already parsed) and strips
    /// the trailing content-type byte, returning the inner content type and
    /// the plaintext.
    pub fn open_record(&mut self, header: &RecordHeader, ciphertext: &[u8]) -> Result<(ContentType, Vec<u8>)> {
        let seq = self.read.sequence.next()?;
        let nonce = SequenceNumber::nonce(&self.read.iv, seq);

        let mut aad = ByteWriter::new();
        header.serialize(&mut aad);
        let aad = aad.finish();

        let mut plaintext = self.read.algorithm.open(&self.read.key, &nonce, &aad, ciphertext)?;

        // Strip zero padding and find the trailing inner content-type byte.
        while matches!(plaintext.last(), Some(0)) {
            plaintext.pop();
        }
        let inner_type_raw = plaintext
            .pop()
            .ok_or_else(|| TlsError::new(ErrorKind::UnexpectedMessage, "record plaintext has no content type"))?;
        let inner_type = ContentType::try_from(inner_type_raw)
            .map_err(|_| TlsError::new(ErrorKind::UnexpectedMessage, "unknown inner record content type"))?;

        Ok((inner_type, plaintext))
    }
}

/// Serializes an unprotected (plaintext) handshake or alert record, used
/// before any traffic keys are installed.
pub fn write_plaintext_record(content_type: ContentType, payload: &[u8], out: &mut ByteWriter) {
    for chunk in payload.chunks(MAX_PLAINTEXT_LEN) {
        let header = RecordHeader {
            content_type,
            length: chunk.len() as u16,
        };
        header.serialize(out);
        out.push_bytes(chunk);
    }
}

/// Parses a plaintext record header and body from `input`, given the
/// header has already been validated to fit within `input`.
pub fn read_plaintext_record<'a>(input: &mut ByteReader<'a>) -> Result<(ContentType, &'a [u8])> {
    let header = RecordHeader::parse(input)?;
    let body = input.read_bytes(header.length as usize)?;
    Ok((header.content_type, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(key_len: usize, algorithm: AeadAlgorithm) -> (RecordLayer, RecordLayer) {
        let write_key = vec![0x11u8; key_len];
        let read_key = vec![0x22u8; key_len];
        let write_iv = [0x33u8; NONCE_LEN];
        let read_iv = [0x44u8; NONCE_LEN];

        let client = RecordLayer::new(
            DirectionState::new(algorithm, write_key.clone(), write_iv),
            DirectionState::new(algorithm, read_key.clone(), read_iv),
        );
        let server = RecordLayer::new(
            DirectionState::new(algorithm, read_key, read_iv),
            DirectionState::new(algorithm, write_key, write_iv),
        );
        (client, server)
    }

    #[test]
    fn seals_and_opens_application_data_round_trip() {
        let (mut client, mut server) = layer(16, AeadAlgorithm::Aes128Gcm);

        let mut wire = ByteWriter::new();
        client
            .seal_into(ContentType::ApplicationData, b"hello server", &mut wire)
            .unwrap();
        let wire = wire.finish();

        let mut reader = ByteReader::new(&wire);
        let header = RecordHeader::parse(&mut reader).unwrap();
        let ciphertext = reader.read_bytes(header.length as usize).unwrap();

        let (content_type, plaintext) = server.open_record(&header, ciphertext).unwrap();
        assert_eq!(content_type, ContentType::ApplicationData);
        assert_eq!(plaintext, b"hello server");
    }

    #[test]
    fn sequence_numbers_advance_independently_per_direction() {
        let (mut client, mut server) = layer(32, AeadAlgorithm::Chacha20Poly1305);

        for i in 0..3u8 {
            let mut wire = ByteWriter::new();
            client
                .seal_into(ContentType::ApplicationData, &[i], &mut wire)
                .unwrap();
            let wire = wire.finish();
            let mut reader = ByteReader::new(&wire);
            let header = RecordHeader::parse(&mut reader).unwrap();
            let ciphertext = reader.read_bytes(header.length as usize).unwrap();
            let (_, plaintext) = server.open_record(&header, ciphertext).unwrap();
            assert_eq!(plaintext, vec![i]);
        }
        assert_eq!(client.write.sequence.0, 3);
        assert_eq!(server.read.sequence.0, 3);
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let (mut client, mut server) = layer(16, AeadAlgorithm::Aes128Gcm);
        let mut wire = ByteWriter::new();
        client.seal_into(ContentType::ApplicationData, b"data", &mut wire).unwrap();
        let mut wire = wire.finish();
        let last = wire.len() - 1;
        wire[last] ^= 0xff;

        let mut reader = ByteReader::new(&wire);
        let header = RecordHeader::parse(&mut reader).unwrap();
        let ciphertext = reader.read_bytes(header.length as usize).unwrap();
        assert!(server.open_record(&header, ciphertext).is_err());
    }
}
