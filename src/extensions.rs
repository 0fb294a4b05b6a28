//! Hello-message extensions: the `(type, data)` pairs carried in
//! ClientHello, ServerHello, EncryptedExtensions, and CertificateRequest.

use crate::bytes::{ByteReader, ByteWriter};
use crate::crypto::kex::NamedGroup;
use crate::crypto::sig::SignatureScheme;
use crate::error::{ErrorKind, Result, TlsError};

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtensionType {
    ServerName = 0,
    SupportedGroups = 10,
    SignatureAlgorithms = 13,
    ApplicationLayerProtocolNegotiation = 16,
    PreSharedKey = 41,
    EarlyData = 42,
    SupportedVersions = 43,
    Cookie = 44,
    PskKeyExchangeModes = 45,
    KeyShare = 51,
}

/// Writes one extension's TLV: a 2-byte type, a 2-byte length, then `body`.
pub fn write_extension(out: &mut ByteWriter, ext_type: ExtensionType, body: &[u8]) {
    out.push_u16(ext_type as u16);
    out.push_vec_u16(body);
}

/// An iterator-like reader over an `Extension extensions<0..2^16-1>` list,
/// handing back `(type, body reader)` pairs in wire order.
pub struct ExtensionReader<'a> {
    reader: ByteReader<'a>,
}

impl<'a> ExtensionReader<'a> {
    pub fn new(reader: ByteReader<'a>) -> Self {
        Self { reader }
    }

    pub fn next_extension(&mut self) -> Result<Option<(u16, ByteReader<'a>)>> {
        if self.reader.is_empty() {
            return Ok(None);
        }
        let ext_type = self.reader.read_u16()?;
        let body = self.reader.read_reader_u16()?;
        Ok(Some((ext_type, body)))
    }
}

/// `KeyShareEntry { NamedGroup group; opaque key_exchange<1..2^16-1>; }`
#[derive(Debug, Clone)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

impl KeyShareEntry {
    pub fn serialize(&self, out: &mut ByteWriter) {
        out.push_u16(self.group.value());
        out.push_vec_u16(&self.key_exchange);
    }

    pub fn parse(input: &mut ByteReader) -> Result<Self> {
        let group_raw = input.read_u16()?;
        let key_exchange = input.read_vec_u16()?.to_vec();
        let group = NamedGroup::from_value(group_raw)
            .ok_or_else(|| TlsError::new(ErrorKind::IllegalParameter, "unsupported named group in key share"))?;
        Ok(Self { group, key_exchange })
    }

    /// Parses one entry from a raw (possibly unsupported) group codepoint,
    /// returning `Ok(None)` instead of failing when the group isn't one
    /// this engine implements -- used when scanning a peer's offered list
    /// for the first mutually supported entry.
    pub fn parse_lenient(input: &mut ByteReader) -> Result<Option<Self>> {
        let group_raw = input.read_u16()?;
        let key_exchange = input.read_vec_u16()?.to_vec();
        Ok(NamedGroup::from_value(group_raw).map(|group| Self { group, key_exchange }))
    }
}

/// Builds the `key_share` extension body carrying one client share.
pub fn client_key_share_body(entries: &[KeyShareEntry]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    let list = out.begin_u16();
    for entry in entries {
        entry.serialize(&mut out);
    }
    list.finish(&mut out);
    out.finish()
}

/// Builds the `key_share` extension body carrying the server's single
/// selected share.
pub fn server_key_share_body(entry: &KeyShareEntry) -> Vec<u8> {
    let mut out = ByteWriter::new();
    entry.serialize(&mut out);
    out.finish()
}

/// Builds the `supported_groups` extension body.
pub fn supported_groups_body(groups: &[NamedGroup]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    let list = out.begin_u16();
    for group in groups {
        out.push_u16(group.value());
    }
    list.finish(&mut out);
    out.finish()
}

/// Builds the `signature_algorithms` extension body.
pub fn signature_algorithms_body(schemes: &[SignatureScheme]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    let list = out.begin_u16();
    for scheme in schemes {
        out.push_u16(scheme.value());
    }
    list.finish(&mut out);
    out.finish()
}

/// Builds the `supported_versions` extension body for a ClientHello (a
/// length-prefixed list) or a ServerHello (the bare selected version).
pub fn supported_versions_client_body() -> Vec<u8> {
    let mut out = ByteWriter::new();
    let list = out.begin_u8();
    out.push_u16(crate::TLS_1_3_VERSION);
    list.finish(&mut out);
    out.finish()
}

pub fn supported_versions_server_body() -> Vec<u8> {
    crate::TLS_1_3_VERSION.to_be_bytes().to_vec()
}

/// Builds the `server_name` extension body for a single DNS hostname.
pub fn server_name_body(hostname: &str) -> Vec<u8> {
    let mut out = ByteWriter::new();
    let list = out.begin_u16();
    out.push_u8(0); // name_type: host_name
    out.push_vec_u16(hostname.as_bytes());
    list.finish(&mut out);
    out.finish()
}

/// `PskKeyExchangeMode` values this engine offers: only the (EC)DHE-bound
/// mode, never the PSK-only mode that would skip the key exchange.
pub const PSK_DHE_KE: u8 = 1;

/// Builds the `psk_key_exchange_modes` extension body.
pub fn psk_key_exchange_modes_body(modes: &[u8]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    let list = out.begin_u8();
    for &mode in modes {
        out.push_u8(mode);
    }
    list.finish(&mut out);
    out.finish()
}

/// `PskIdentity { opaque identity<1..2^16-1>; uint32 obfuscated_ticket_age; }`
#[derive(Debug, Clone)]
pub struct PskIdentity {
    pub identity: Vec<u8>,
    pub obfuscated_ticket_age: u32,
}

/// Builds a ClientHello `pre_shared_key` extension body carrying a single
/// identity and a binder of `binder.len()` bytes (all-zero as a
/// placeholder before the binder is computed, or the real HMAC value).
pub fn client_pre_shared_key_body(identity: &PskIdentity, binder: &[u8]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    let identities = out.begin_u16();
    out.push_vec_u16(&identity.identity);
    out.push_u32(identity.obfuscated_ticket_age);
    identities.finish(&mut out);

    let binders = out.begin_u16();
    out.push_vec_u8(binder);
    binders.finish(&mut out);
    out.finish()
}

/// Builds a ServerHello `pre_shared_key` extension body naming which of
/// the ClientHello's offered identities was selected.
pub fn server_pre_shared_key_body(selected_identity: u16) -> Vec<u8> {
    selected_identity.to_be_bytes().to_vec()
}

/// Parses a ClientHello `pre_shared_key` extension body. Only a single
/// offered identity/binder pair is supported; a client offering more than
/// one is rejected rather than silently picking the first.
pub fn parse_client_pre_shared_key(body: &mut ByteReader) -> Result<(PskIdentity, Vec<u8>)> {
    let mut identities = body.read_reader_u16()?;
    let identity = identities.read_vec_u16()?.to_vec();
    let obfuscated_ticket_age = identities.read_u32()?;
    if !identities.is_empty() {
        return Err(TlsError::new(ErrorKind::IllegalParameter, "only a single PSK identity is supported"));
    }

    let mut binders = body.read_reader_u16()?;
    let binder = binders.read_vec_u8()?.to_vec();
    if !binders.is_empty() {
        return Err(TlsError::new(ErrorKind::IllegalParameter, "only a single PSK binder is supported"));
    }

    Ok((PskIdentity { identity, obfuscated_ticket_age }, binder))
}

pub fn parse_server_pre_shared_key(body: &mut ByteReader) -> Result<u16> {
    body.read_u16()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_share_round_trips() {
        let entry = KeyShareEntry {
            group: NamedGroup::X25519,
            key_exchange: vec![0x42; 32],
        };
        let mut out = ByteWriter::new();
        entry.serialize(&mut out);
        let bytes = out.finish();

        let mut reader = ByteReader::new(&bytes);
        let parsed = KeyShareEntry::parse(&mut reader).unwrap();
        assert_eq!(parsed.group, NamedGroup::X25519);
        assert_eq!(parsed.key_exchange, vec![0x42; 32]);
    }

    #[test]
    fn unsupported_group_parses_leniently_as_none() {
        let mut out = ByteWriter::new();
        out.push_u16(0x0019); // secp521r1, unsupported
        out.push_vec_u16(&[0u8; 4]);
        let bytes = out.finish();

        let mut reader = ByteReader::new(&bytes);
        assert!(KeyShareEntry::parse_lenient(&mut reader).unwrap().is_none());
    }

    #[test]
    fn extension_reader_walks_list_in_order() {
        let mut out = ByteWriter::new();
        write_extension(&mut out, ExtensionType::ServerName, b"a");
        write_extension(&mut out, ExtensionType::Cookie, b"bc");
        let bytes = out.finish();

        let mut reader = ExtensionReader::new(ByteReader::new(&bytes));
        let (ty, body) = reader.next_extension().unwrap().unwrap();
        assert_eq!(ty, ExtensionType::ServerName as u16);
        assert_eq!(body.remaining_bytes(), b"a");

        let (ty, body) = reader.next_extension().unwrap().unwrap();
        assert_eq!(ty, ExtensionType::Cookie as u16);
        assert_eq!(body.remaining_bytes(), b"bc");

        assert!(reader.next_extension().unwrap().is_none());
    }

    #[test]
    fn pre_shared_key_round_trips_identity_and_binder() {
        let identity = PskIdentity {
            identity: b"ticket-1".to_vec(),
            obfuscated_ticket_age: 0x1234_5678,
        };
        let binder = vec![0xAB; 32];
        let body = client_pre_shared_key_body(&identity, &binder);

        let mut reader = ByteReader::new(&body);
        let (parsed_identity, parsed_binder) = parse_client_pre_shared_key(&mut reader).unwrap();
        assert_eq!(parsed_identity.identity, identity.identity);
        assert_eq!(parsed_identity.obfuscated_ticket_age, identity.obfuscated_ticket_age);
        assert_eq!(parsed_binder, binder);
    }

    #[test]
    fn server_pre_shared_key_round_trips_selected_index() {
        let body = server_pre_shared_key_body(0);
        let mut reader = ByteReader::new(&body);
        assert_eq!(parse_server_pre_shared_key(&mut reader).unwrap(), 0);
    }
}
