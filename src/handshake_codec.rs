//! Handshake message framing: the 4-byte `msg_type`/length header, and
//! reassembly of a message that arrives split across more than one record.

use crate::bytes::ByteWriter;
use crate::error::{ErrorKind, Result, TlsError};
use crate::handshake::{Handshake, HandshakeType};

pub const HEADER_LEN: usize = 4;

/// Serializes a complete handshake message: the 4-byte header followed by
/// the body.
pub fn encode(message: &Handshake) -> Vec<u8> {
    let mut body = ByteWriter::new();
    message.serialize_body(&mut body);
    let body = body.finish();

    let mut out = ByteWriter::new();
    out.push_u8(message.handshake_type() as u8);
    out.push_u24(body.len() as u32);
    out.push_bytes(&body);
    out.finish()
}

/// The result of attempting to pull one handshake message out of a
/// reassembly buffer.
pub enum Parsed {
    /// A complete message was parsed, consuming `consumed` bytes.
    Message { message: Handshake, consumed: usize },
    /// Not enough bytes are buffered yet to parse the next message.
    Incomplete,
}

/// Attempts to parse one handshake message from the front of `buf`.
///
/// `finished_len` is the hash algorithm's output length, needed to parse a
/// `Finished` body since it has no inner length field of its own; callers
/// that haven't negotiated a cipher suite yet (i.e. while still expecting a
/// ClientHello or ServerHello) may pass any value, since neither message
/// type reaches the `Finished` arm.
pub fn try_parse_one(buf: &[u8], finished_len: usize) -> Result<Parsed> {
    if buf.len() < HEADER_LEN {
        return Ok(Parsed::Incomplete);
    }
    let msg_type_raw = buf[0];
    let body_len = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < HEADER_LEN + body_len {
        return Ok(Parsed::Incomplete);
    }

    let msg_type = HandshakeType::try_from(msg_type_raw)
        .map_err(|_| TlsError::new(ErrorKind::UnexpectedMessage, "unknown handshake message type"))?;
    let body = &buf[HEADER_LEN..HEADER_LEN + body_len];
    let message = Handshake::parse_body(msg_type, body, finished_len)?;

    Ok(Parsed::Message {
        message,
        consumed: HEADER_LEN + body_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{Finished, KeyUpdate, KeyUpdateRequest};

    #[test]
    fn incomplete_header_yields_incomplete() {
        let buf = [24u8, 0, 0]; // header truncated
        match try_parse_one(&buf, 32).unwrap() {
            Parsed::Incomplete => {}
            _ => panic!("expected incomplete"),
        }
    }

    #[test]
    fn incomplete_body_yields_incomplete() {
        let encoded = encode(&Handshake::Finished(Finished {
            verify_data: vec![1u8; 32],
        }));
        match try_parse_one(&encoded[..encoded.len() - 1], 32).unwrap() {
            Parsed::Incomplete => {}
            _ => panic!("expected incomplete"),
        }
    }

    #[test]
    fn parses_exactly_one_message_and_reports_consumed_length() {
        let key_update = encode(&Handshake::KeyUpdate(KeyUpdate {
            request_update: KeyUpdateRequest::Requested,
        }));
        let finished = encode(&Handshake::Finished(Finished {
            verify_data: vec![2u8; 32],
        }));
        let mut buf = key_update.clone();
        buf.extend_from_slice(&finished);

        match try_parse_one(&buf, 32).unwrap() {
            Parsed::Message { message, consumed } => {
                assert_eq!(consumed, key_update.len());
                match message {
                    Handshake::KeyUpdate(ku) => assert_eq!(ku.request_update, KeyUpdateRequest::Requested),
                    _ => panic!("wrong variant"),
                }
            }
            Parsed::Incomplete => panic!("expected a parsed message"),
        }
    }
}
