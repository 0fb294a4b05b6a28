//! Handshake message bodies.
//!
//! Extension blocks are kept as opaque, already-validated-length byte
//! ranges rather than parsed into a structured list up front; the state
//! machine walks them with [`crate::extensions::ExtensionReader`] only for
//! the handful of extension types it actually interprets, the same
//! lazy-parse boundary the corpus draws around `CertificateRequest`'s
//! extension block.

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{ErrorKind, Result, TlsError};

/// The ServerHello.random value that signals a HelloRetryRequest rather
/// than an ordinary ServerHello (RFC 8446 section 4.1.3).
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91, 0xC2, 0xA2, 0x11,
    0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

/// The last 8 bytes of ServerHello.random a TLS 1.3 server sets when
/// negotiating down from a higher version it actually supports, so a
/// client that only speaks 1.3 can detect an active downgrade attack.
pub const DOWNGRADE_SENTINEL_TLS12: [u8; 8] = [0x44, 0x4F, 0x57, 0x4E, 0x47, 0x52, 0x44, 0x01];

/// The same downgrade-protection sentinel, but set by a server negotiating
/// down to TLS 1.1 or below instead of TLS 1.2.
pub const DOWNGRADE_SENTINEL_TLS11_OR_BELOW: [u8; 8] = [0x44, 0x4F, 0x57, 0x4E, 0x47, 0x52, 0x44, 0x00];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EndOfEarlyData = 5,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateRequest = 13,
    CertificateVerify = 15,
    Finished = 20,
    KeyUpdate = 24,
    MessageHash = 254,
}

impl TryFrom<u8> for HandshakeType {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        Ok(match value {
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            4 => Self::NewSessionTicket,
            5 => Self::EndOfEarlyData,
            8 => Self::EncryptedExtensions,
            11 => Self::Certificate,
            13 => Self::CertificateRequest,
            15 => Self::CertificateVerify,
            20 => Self::Finished,
            24 => Self::KeyUpdate,
            254 => Self::MessageHash,
            _ => return Err(value),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientHello {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<[u8; 2]>,
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ServerHello {
    pub random: [u8; 32],
    pub legacy_session_id_echo: Vec<u8>,
    pub cipher_suite: [u8; 2],
    pub extensions: Vec<u8>,
}

impl ServerHello {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }
}

#[derive(Debug, Clone)]
pub struct EncryptedExtensions {
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub certificate_request_context: Vec<u8>,
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CertificateEntry {
    pub cert_data: Vec<u8>,
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Certificate {
    pub certificate_request_context: Vec<u8>,
    pub entries: Vec<CertificateEntry>,
}

#[derive(Debug, Clone)]
pub struct CertificateVerify {
    pub algorithm: u16,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewSessionTicket {
    pub ticket_lifetime: u32,
    pub ticket_age_add: u32,
    pub ticket_nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: Vec<u8>,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdateRequest {
    NotRequested = 0,
    Requested = 1,
}

impl TryFrom<u8> for KeyUpdateRequest {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        match value {
            0 => Ok(Self::NotRequested),
            1 => Ok(Self::Requested),
            _ => Err(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyUpdate {
    pub request_update: KeyUpdateRequest,
}

/// The union of every handshake message body this engine parses and
/// serializes, tagged by its `msg_type` on the wire.
#[derive(Debug, Clone)]
pub enum Handshake {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    EncryptedExtensions(EncryptedExtensions),
    CertificateRequest(CertificateRequest),
    Certificate(Certificate),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
    NewSessionTicket(NewSessionTicket),
    KeyUpdate(KeyUpdate),
}

impl Handshake {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            Self::ClientHello(_) => HandshakeType::ClientHello,
            Self::ServerHello(_) => HandshakeType::ServerHello,
            Self::EncryptedExtensions(_) => HandshakeType::EncryptedExtensions,
            Self::CertificateRequest(_) => HandshakeType::CertificateRequest,
            Self::Certificate(_) => HandshakeType::Certificate,
            Self::CertificateVerify(_) => HandshakeType::CertificateVerify,
            Self::Finished(_) => HandshakeType::Finished,
            Self::NewSessionTicket(_) => HandshakeType::NewSessionTicket,
            Self::KeyUpdate(_) => HandshakeType::KeyUpdate,
        }
    }

    /// Serializes the message body only, without the 4-byte handshake
    /// header; [`crate::handshake_codec`] adds that.
    pub fn serialize_body(&self, out: &mut ByteWriter) {
        match self {
            Self::ClientHello(m) => {
                out.push_u16(0x0303);
                out.push_bytes(&m.random);
                out.push_vec_u8(&m.legacy_session_id);
                let suites = out.begin_u16();
                for suite in &m.cipher_suites {
                    out.push_bytes(suite);
                }
                suites.finish(out);
                out.push_vec_u8(&[0]); // legacy_compression_methods: null only
                out.push_vec_u16(&m.extensions);
            }
            Self::ServerHello(m) => {
                out.push_u16(0x0303);
                out.push_bytes(&m.random);
                out.push_vec_u8(&m.legacy_session_id_echo);
                out.push_bytes(&m.cipher_suite);
                out.push_u8(0); // legacy_compression_method
                out.push_vec_u16(&m.extensions);
            }
            Self::EncryptedExtensions(m) => {
                out.push_vec_u16(&m.extensions);
            }
            Self::CertificateRequest(m) => {
                out.push_vec_u8(&m.certificate_request_context);
                out.push_vec_u16(&m.extensions);
            }
            Self::Certificate(m) => {
                out.push_vec_u8(&m.certificate_request_context);
                let list = out.begin_u24();
                for entry in &m.entries {
                    out.push_vec_u24(&entry.cert_data);
                    out.push_vec_u16(&entry.extensions);
                }
                list.finish(out);
            }
            Self::CertificateVerify(m) => {
                out.push_u16(m.algorithm);
                out.push_vec_u16(&m.signature);
            }
            Self::Finished(m) => {
                out.push_bytes(&m.verify_data);
            }
            Self::NewSessionTicket(m) => {
                out.push_u32(m.ticket_lifetime);
                out.push_u32(m.ticket_age_add);
                out.push_vec_u8(&m.ticket_nonce);
                out.push_vec_u16(&m.ticket);
                out.push_vec_u16(&m.extensions);
            }
            Self::KeyUpdate(m) => {
                out.push_u8(m.request_update as u8);
            }
        }
    }

    /// `verify_data` has no self-describing length (it's exactly the hash
    /// algorithm's output length), so `Finished` bodies can't be parsed
    /// generically -- the caller supplies the expected length up front.
    pub fn parse_body(msg_type: HandshakeType, body: &[u8], finished_len: usize) -> Result<Self> {
        let mut r = ByteReader::new(body);
        let msg = match msg_type {
            HandshakeType::ClientHello => {
                let _legacy_version = r.read_u16()?;
                let mut random = [0u8; 32];
                random.copy_from_slice(r.read_bytes(32)?);
                let legacy_session_id = r.read_vec_u8()?.to_vec();
                let mut cipher_suites = Vec::new();
                let mut suites_reader = r.read_reader_u16()?;
                while !suites_reader.is_empty() {
                    let mut suite = [0u8; 2];
                    suite.copy_from_slice(suites_reader.read_bytes(2)?);
                    cipher_suites.push(suite);
                }
                let _compression = r.read_vec_u8()?;
                let extensions = r.read_vec_u16()?.to_vec();
                Self::ClientHello(ClientHello {
                    random,
                    legacy_session_id,
                    cipher_suites,
                    extensions,
                })
            }
            HandshakeType::ServerHello => {
                let _legacy_version = r.read_u16()?;
                let mut random = [0u8; 32];
                random.copy_from_slice(r.read_bytes(32)?);
                let legacy_session_id_echo = r.read_vec_u8()?.to_vec();
                let mut cipher_suite = [0u8; 2];
                cipher_suite.copy_from_slice(r.read_bytes(2)?);
                let _compression = r.read_u8()?;
                let extensions = r.read_vec_u16()?.to_vec();
                Self::ServerHello(ServerHello {
                    random,
                    legacy_session_id_echo,
                    cipher_suite,
                    extensions,
                })
            }
            HandshakeType::EncryptedExtensions => Self::EncryptedExtensions(EncryptedExtensions {
                extensions: r.read_vec_u16()?.to_vec(),
            }),
            HandshakeType::CertificateRequest => Self::CertificateRequest(CertificateRequest {
                certificate_request_context: r.read_vec_u8()?.to_vec(),
                extensions: r.read_vec_u16()?.to_vec(),
            }),
            HandshakeType::Certificate => {
                let certificate_request_context = r.read_vec_u8()?.to_vec();
                let mut entries = Vec::new();
                let mut list = r.read_reader_u24()?;
                while !list.is_empty() {
                    let cert_data = list.read_vec_u24()?.to_vec();
                    let extensions = list.read_vec_u16()?.to_vec();
                    entries.push(CertificateEntry { cert_data, extensions });
                }
                Self::Certificate(Certificate {
                    certificate_request_context,
                    entries,
                })
            }
            HandshakeType::CertificateVerify => Self::CertificateVerify(CertificateVerify {
                algorithm: r.read_u16()?,
                signature: r.read_vec_u16()?.to_vec(),
            }),
            HandshakeType::Finished => Self::Finished(Finished {
                verify_data: r.read_bytes(finished_len)?.to_vec(),
            }),
            HandshakeType::NewSessionTicket => Self::NewSessionTicket(NewSessionTicket {
                ticket_lifetime: r.read_u32()?,
                ticket_age_add: r.read_u32()?,
                ticket_nonce: r.read_vec_u8()?.to_vec(),
                ticket: r.read_vec_u16()?.to_vec(),
                extensions: r.read_vec_u16()?.to_vec(),
            }),
            HandshakeType::KeyUpdate => {
                let raw = r.read_u8()?;
                let request_update = KeyUpdateRequest::try_from(raw)
                    .map_err(|_| TlsError::new(ErrorKind::IllegalParameter, "invalid KeyUpdate request value"))?;
                Self::KeyUpdate(KeyUpdate { request_update })
            }
            HandshakeType::EndOfEarlyData | HandshakeType::MessageHash => {
                return Err(TlsError::new(ErrorKind::UnexpectedMessage, "message type not handled by parser"));
            }
        };
        r.expect_exhausted()?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_round_trips() {
        let hello = ClientHello {
            random: [7u8; 32],
            legacy_session_id: vec![1, 2, 3],
            cipher_suites: vec![[0x13, 0x01], [0x13, 0x03]],
            extensions: vec![0, 0], // a single extension with type 0, empty body... adjusted below
        };
        let msg = Handshake::ClientHello(hello);
        let mut out = ByteWriter::new();
        msg.serialize_body(&mut out);
        let bytes = out.finish();

        let parsed = Handshake::parse_body(HandshakeType::ClientHello, &bytes, 0).unwrap();
        match parsed {
            Handshake::ClientHello(ch) => {
                assert_eq!(ch.random, [7u8; 32]);
                assert_eq!(ch.legacy_session_id, vec![1, 2, 3]);
                assert_eq!(ch.cipher_suites, vec![[0x13, 0x01], [0x13, 0x03]]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn finished_round_trips_with_explicit_length() {
        let msg = Handshake::Finished(Finished {
            verify_data: vec![9u8; 32],
        });
        let mut out = ByteWriter::new();
        msg.serialize_body(&mut out);
        let bytes = out.finish();

        let parsed = Handshake::parse_body(HandshakeType::Finished, &bytes, 32).unwrap();
        match parsed {
            Handshake::Finished(f) => assert_eq!(f.verify_data, vec![9u8; 32]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn hello_retry_request_is_detected_by_random() {
        let hello = ServerHello {
            random: HELLO_RETRY_REQUEST_RANDOM,
            legacy_session_id_echo: vec![],
            cipher_suite: [0x13, 0x01],
            extensions: vec![],
        };
        assert!(hello.is_hello_retry_request());
    }
}
